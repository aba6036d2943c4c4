//! Directory walking implementation using walkdir.

use super::{filter::ImageFilter, FileIdentity, FileIdentityBatch, ScanRequest};
use crate::core::queue::{CancellationToken, Queue};
use crate::core::stage::Source;
use crate::error::ScanError;
use crate::events::{Event, EventSender, ScanEvent};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Configuration for the directory scanner
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Identities per batch pushed downstream
    pub batch_size: usize,
    /// Files between status messages
    pub status_interval: usize,
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
    /// Custom extensions to include (None = use defaults)
    pub extensions: Option<Vec<String>>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            status_interval: 1024,
            follow_symlinks: false,
            include_hidden: false,
            extensions: None,
        }
    }
}

/// How a walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub files: usize,
    pub cancelled: bool,
}

/// Source stage that turns a [`ScanRequest`] into identity batches
pub struct DirectoryScanner {
    request: ScanRequest,
    config: ScanConfig,
    filter: ImageFilter,
    token: CancellationToken,
    events: EventSender,
}

impl DirectoryScanner {
    pub fn new(
        request: ScanRequest,
        config: ScanConfig,
        token: CancellationToken,
        events: EventSender,
    ) -> Self {
        let mut filter = ImageFilter::new().with_hidden(config.include_hidden);
        if let Some(ref extensions) = config.extensions {
            filter = filter.with_extensions(extensions);
        }

        let request = request.resolved();

        Self {
            request,
            config,
            filter,
            token,
            events,
        }
    }

    /// Walk the tree, handing each full batch to `emit`.
    ///
    /// `emit` returns false when downstream is gone, which ends the walk.
    /// The last partial batch is flushed even when the walk is cancelled.
    pub fn walk(&self, mut emit: impl FnMut(FileIdentityBatch) -> bool) -> ScanOutcome {
        let root = &self.request.root;
        let batch_size = self.config.batch_size.max(1);
        let status_interval = self.config.status_interval.max(1);

        self.events.send(Event::Scan(ScanEvent::Started {
            root: root.clone(),
            recursive: self.request.recursive,
        }));
        self.events.status("Scanner: starting");

        if !root.is_dir() {
            let error = if root.exists() {
                ScanError::NotADirectory { path: root.clone() }
            } else {
                ScanError::DirectoryNotFound { path: root.clone() }
            };
            info!(%error, "nothing to scan");
            self.events.status(format!("Scanner: {}", error));
            let outcome = ScanOutcome {
                files: 0,
                cancelled: false,
            };
            self.finish(outcome);
            return outcome;
        }

        let max_depth = if self.request.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || self.filter.should_descend(entry.path())
            });

        let mut batch = Vec::with_capacity(batch_size);
        let mut files = 0;
        let mut cancelled = false;
        let mut downstream_open = true;

        for entry_result in walker {
            if self.token.is_cancelled() {
                cancelled = true;
                break;
            }

            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.filter.should_include(entry.path()) {
                continue;
            }

            let identity = match FileIdentity::from_path(entry.path()) {
                Ok(identity) => identity,
                Err(source) => {
                    let error = ScanError::ReadEntry {
                        path: entry.path().to_path_buf(),
                        source,
                    };
                    debug!(%error, "skipping file");
                    continue;
                }
            };

            batch.push(identity);
            files += 1;

            if batch.len() >= batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                if !emit(Arc::new(full)) {
                    downstream_open = false;
                    break;
                }
            }

            if files % status_interval == 0 {
                self.events.status(format!("Scanner: scanned {} files", files));
                self.events.send(Event::Scan(ScanEvent::Progress {
                    files_scanned: files,
                    current_path: entry.path().to_path_buf(),
                }));
            }
        }

        if downstream_open && !batch.is_empty() {
            emit(Arc::new(batch));
        }

        let outcome = ScanOutcome { files, cancelled };
        self.finish(outcome);
        outcome
    }

    fn finish(&self, outcome: ScanOutcome) {
        if outcome.cancelled {
            self.events
                .status(format!("Scanner: cancelled after {} files", outcome.files));
        } else {
            self.events
                .status(format!("Scanner: finished. Total {} files", outcome.files));
        }
        self.events.send(Event::Scan(ScanEvent::Completed {
            total_files: outcome.files,
            cancelled: outcome.cancelled,
        }));
        info!(
            root = %self.request.root.display(),
            files = outcome.files,
            cancelled = outcome.cancelled,
            "scan finished"
        );
    }
}

impl Source for DirectoryScanner {
    type Output = FileIdentityBatch;

    fn name(&self) -> &str {
        "DirectoryScanner"
    }

    fn produce(&mut self, output: &Queue<FileIdentityBatch>) {
        self.walk(|batch| output.push(batch).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{null_sender, EventChannel, PipelineEvent};
    use std::fs;
    use tempfile::TempDir;

    fn create_test_files(dir: &TempDir) {
        fs::write(dir.path().join("photo1.jpg"), b"fake jpeg").unwrap();
        fs::write(dir.path().join("photo2.PNG"), b"fake png").unwrap();
        fs::write(dir.path().join("document.pdf"), b"fake pdf").unwrap();

        let subdir = dir.path().join("vacation");
        fs::create_dir(&subdir).unwrap();
        fs::write(subdir.join("beach.jpg"), b"fake jpeg").unwrap();

        let hidden = dir.path().join(".thumbnails");
        fs::create_dir(&hidden).unwrap();
        fs::write(hidden.join("thumb.jpg"), b"fake jpeg").unwrap();
    }

    fn scanner(root: &std::path::Path, recursive: bool, config: ScanConfig) -> DirectoryScanner {
        DirectoryScanner::new(
            ScanRequest::new(root, recursive),
            config,
            CancellationToken::new(),
            null_sender(),
        )
    }

    fn collect(scanner: &DirectoryScanner) -> (Vec<FileIdentityBatch>, ScanOutcome) {
        let mut batches = Vec::new();
        let outcome = scanner.walk(|batch| {
            batches.push(batch);
            true
        });
        (batches, outcome)
    }

    #[test]
    fn recursive_scan_finds_images_and_skips_hidden_dirs() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(&temp_dir);

        let (batches, outcome) = collect(&scanner(temp_dir.path(), true, ScanConfig::default()));

        let mut names: Vec<String> = batches
            .iter()
            .flat_map(|b| b.iter().map(|f| f.name().to_string()))
            .collect();
        names.sort();
        assert_eq!(names, vec!["beach.jpg", "photo1.jpg", "photo2.PNG"]);
        assert_eq!(outcome.files, 3);
        assert!(!outcome.cancelled);
    }

    #[test]
    fn non_recursive_scan_stays_at_top_level() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(&temp_dir);

        let (_, outcome) = collect(&scanner(temp_dir.path(), false, ScanConfig::default()));
        assert_eq!(outcome.files, 2);
    }

    #[test]
    fn batches_are_capped_and_final_partial_is_flushed() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..7 {
            fs::write(temp_dir.path().join(format!("{i}.jpg")), b"x").unwrap();
        }

        let config = ScanConfig {
            batch_size: 3,
            ..Default::default()
        };
        let (batches, _) = collect(&scanner(temp_dir.path(), false, config));

        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn missing_root_reports_status_and_emits_nothing() {
        let (sender, receiver) = EventChannel::new();
        let scanner = DirectoryScanner::new(
            ScanRequest::new("/nonexistent/photos", true),
            ScanConfig::default(),
            CancellationToken::new(),
            sender,
        );

        let (batches, outcome) = collect(&scanner);
        assert!(batches.is_empty());
        assert_eq!(outcome.files, 0);

        let messages: Vec<String> = std::iter::from_fn(|| receiver.try_recv())
            .filter_map(|event| match event {
                Event::Pipeline(PipelineEvent::Status { message }) => Some(message),
                _ => None,
            })
            .collect();
        assert!(messages.iter().any(|m| m.contains("Directory not found")));
    }

    #[test]
    fn cancelled_scan_reports_cancellation() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(&temp_dir);

        let token = CancellationToken::new();
        token.cancel();
        let scanner = DirectoryScanner::new(
            ScanRequest::new(temp_dir.path(), true),
            ScanConfig::default(),
            token,
            null_sender(),
        );

        let (batches, outcome) = collect(&scanner);
        assert!(outcome.cancelled);
        assert!(batches.is_empty());
    }

    #[test]
    fn closed_output_stops_the_walk() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..10 {
            fs::write(temp_dir.path().join(format!("{i}.png")), b"x").unwrap();
        }
        let config = ScanConfig {
            batch_size: 2,
            ..Default::default()
        };
        let scanner = scanner(temp_dir.path(), false, config);

        let mut calls = 0;
        let outcome = scanner.walk(|_| {
            calls += 1;
            false
        });
        assert_eq!(calls, 1);
        assert_eq!(outcome.files, 2);
    }
}
