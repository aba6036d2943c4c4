//! Explicit registry of the hash methods a pipeline may run.

use super::algorithms::{AspectRatioHash, AverageHash, DifferenceHash, PerceptualHash, Sha256Hash};
use super::traits::{HashInput, HashMethod, MethodVersions};
use crate::error::PipelineError;
use std::collections::BTreeSet;
use std::fmt;

type Factory = fn() -> Box<dyn HashMethod>;

#[derive(Clone)]
struct Entry {
    key: &'static str,
    version: u32,
    input: HashInput,
    factory: Factory,
}

/// Catalog of available hash methods plus the subset that is enabled.
///
/// Built once and handed to the controller; every hash worker calls
/// [`HashCatalog::instantiate`] to get its own method instances.
#[derive(Clone)]
pub struct HashCatalog {
    entries: Vec<Entry>,
    enabled: BTreeSet<&'static str>,
}

impl HashCatalog {
    /// Every built-in method, all enabled
    pub fn new() -> Self {
        let mut catalog = Self {
            entries: Vec::new(),
            enabled: BTreeSet::new(),
        };
        catalog.register(|| Box::new(Sha256Hash::new()));
        catalog.register(|| Box::new(PerceptualHash::new()));
        catalog.register(|| Box::new(DifferenceHash::new()));
        catalog.register(|| Box::new(AverageHash::new()));
        catalog.register(|| Box::new(AspectRatioHash::new()));
        catalog
    }

    /// Add a method and enable it. A method with the same key is replaced.
    pub fn register(&mut self, factory: Factory) {
        let sample = factory();
        let entry = Entry {
            key: sample.key(),
            version: sample.version(),
            input: sample.input_kind(),
            factory,
        };
        self.entries.retain(|existing| existing.key != entry.key);
        self.enabled.insert(entry.key);
        self.entries.push(entry);
    }

    /// Every registered key, in registration order
    pub fn keys(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.key).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn input_kind(&self, key: &str) -> Option<HashInput> {
        self.entry(key).map(|e| e.input)
    }

    pub fn version(&self, key: &str) -> Option<u32> {
        self.entry(key).map(|e| e.version)
    }

    /// Restrict the enabled set to `keys`.
    ///
    /// Fails if a key is unknown or the set is empty; the catalog is left
    /// unchanged on failure.
    pub fn set_enabled<I, S>(&mut self, keys: I) -> Result<(), PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut enabled = BTreeSet::new();
        for key in keys {
            let key = key.as_ref();
            let entry = self.entry(key).ok_or_else(|| PipelineError::UnknownMethod {
                key: key.to_string(),
            })?;
            enabled.insert(entry.key);
        }
        if enabled.is_empty() {
            return Err(PipelineError::NoActiveMethods);
        }
        self.enabled = enabled;
        Ok(())
    }

    pub fn with_enabled<I, S>(mut self, keys: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_enabled(keys)?;
        Ok(self)
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.enabled.contains(key)
    }

    /// Enabled keys in registration order
    pub fn enabled_keys(&self) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|e| self.enabled.contains(e.key))
            .map(|e| e.key)
            .collect()
    }

    /// Versions of the enabled methods, as stored in the cache
    pub fn versions(&self) -> MethodVersions {
        self.entries
            .iter()
            .filter(|e| self.enabled.contains(e.key))
            .map(|e| (e.key.to_string(), e.version))
            .collect()
    }

    /// Fresh instances of the enabled methods, byte methods first.
    pub fn instantiate(&self) -> Result<Vec<Box<dyn HashMethod>>, PipelineError> {
        let mut methods: Vec<Box<dyn HashMethod>> = self
            .entries
            .iter()
            .filter(|e| self.enabled.contains(e.key))
            .map(|e| (e.factory)())
            .collect();
        if methods.is_empty() {
            return Err(PipelineError::NoActiveMethods);
        }
        methods.sort_by_key(|m| m.input_kind() != HashInput::Bytes);
        Ok(methods)
    }

    /// Instance used by the similarity engine to compare stored values
    pub fn comparator(&self, key: &str) -> Option<Box<dyn HashMethod>> {
        self.entry(key).map(|e| (e.factory)())
    }

    fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }
}

impl Default for HashCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HashCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashCatalog")
            .field("keys", &self.keys())
            .field("enabled", &self.enabled)
            .finish()
    }
}
