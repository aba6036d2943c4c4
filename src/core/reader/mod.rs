//! # Reader Module
//!
//! Reads raw bytes for cache misses.
//!
//! Files of 1 MiB and more are memory-mapped, which avoids copying the
//! content from the kernel; smaller files are read into a `Vec`. Either
//! way the content is moved, never cloned, into the hash workers.

use crate::core::scanner::{FileIdentity, FileIdentityBatch};
use crate::core::queue::Queue;
use crate::core::stage::Transform;
use crate::error::HashError;
use crate::events::{Event, EventSender, ReadEvent};
use memmap2::Mmap;
use std::fs::File;
use std::ops::ControlFlow;
use std::path::Path;
use tracing::debug;

/// Minimum file size to use memory-mapped I/O (1MB)
pub const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Raw file content, either owned or memory-mapped
pub enum FileContent {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl FileContent {
    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_ref().is_empty()
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, FileContent::Mapped(_))
    }
}

impl AsRef<[u8]> for FileContent {
    fn as_ref(&self) -> &[u8] {
        match self {
            FileContent::Owned(v) => v,
            FileContent::Mapped(m) => m,
        }
    }
}

impl std::ops::Deref for FileContent {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

impl std::fmt::Debug for FileContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContent")
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

/// Read a whole file, memory-mapping it when it is large.
pub fn read_file_content(path: &Path) -> Result<FileContent, HashError> {
    let io_error = |source| HashError::IoError {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_error)?;
    let len = file.metadata().map_err(io_error)?.len();

    if len >= MMAP_THRESHOLD {
        // SAFETY: the mapping is read-only and only lives as long as the
        // content is being hashed. A concurrent truncation by another
        // process is the one hazard, the same as for any mmap reader.
        let mmap = unsafe { Mmap::map(&file) }.map_err(io_error)?;
        Ok(FileContent::Mapped(mmap))
    } else {
        std::fs::read(path).map(FileContent::Owned).map_err(io_error)
    }
}

/// An identity plus its content, owned by whichever stage holds it
#[derive(Debug)]
pub struct DiskReadResult {
    pub identity: FileIdentity,
    pub content: FileContent,
}

/// Transform stage: identity batches in, file contents out.
///
/// Unreadable files are skipped; duplicate detection degrades by omission.
pub struct DiskReader {
    events: EventSender,
    progress_interval: usize,
    read: usize,
    skipped: usize,
}

impl DiskReader {
    pub fn new(events: EventSender, progress_interval: usize) -> Self {
        Self {
            events,
            progress_interval: progress_interval.max(1),
            read: 0,
            skipped: 0,
        }
    }

    pub fn files_read(&self) -> usize {
        self.read
    }

    pub fn files_skipped(&self) -> usize {
        self.skipped
    }
}

impl Transform for DiskReader {
    type Input = FileIdentityBatch;
    type Output = DiskReadResult;

    fn name(&self) -> &str {
        "DiskReader"
    }

    fn transform(&mut self, batch: FileIdentityBatch, output: &Queue<DiskReadResult>) -> ControlFlow<()> {
        let total = batch.len();

        for (index, identity) in batch.iter().enumerate() {
            let path = identity.path();
            match read_file_content(&path) {
                Ok(content) => {
                    self.read += 1;
                    let result = DiskReadResult {
                        identity: identity.clone(),
                        content,
                    };
                    if output.push(result).is_err() {
                        return ControlFlow::Break(());
                    }
                }
                Err(error) => {
                    self.skipped += 1;
                    debug!(%error, "skipping unreadable file");
                }
            }

            let current = index + 1;
            if current % self.progress_interval == 0 || current == total {
                self.events
                    .send(Event::Read(ReadEvent::Progress { current, total }));
            }
        }

        ControlFlow::Continue(())
    }

    fn finish(&mut self, _output: &Queue<DiskReadResult>) {
        debug!(read = self.read, skipped = self.skipped, "disk reader drained");
    }
}
