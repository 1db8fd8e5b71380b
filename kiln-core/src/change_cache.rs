//! Incremental change cache deciding whether an action's outputs are stale.
//!
//! Records are keyed by action name and hold the signal of every input as it
//! was observed right before the action's last successful run.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::UNIX_EPOCH;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::options::SignalMode;

const CHANGE_CACHE_VERSION: u32 = 1;

/// Last-known modification signal of a single input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Modified { secs: u64, nanos: u32, len: u64 },
    /// BLAKE3 digest of the contents, hex encoded.
    Content(String),
}

impl Signal {
    /// Reads the current signal of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read.
    pub fn capture(path: &Path, mode: SignalMode) -> Result<Self> {
        match mode {
            SignalMode::Mtime => {
                let metadata = fs::metadata(path)?;
                let modified = metadata
                    .modified()?
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                Ok(Signal::Modified {
                    secs: modified.as_secs(),
                    nanos: modified.subsec_nanos(),
                    len: metadata.len(),
                })
            }
            SignalMode::Hash => hash_file_fast(path).map(Signal::Content),
        }
    }
}

/// Signals for a set of inputs, captured at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals(BTreeMap<PathBuf, Signal>);

impl Signals {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&Signal> {
        self.0.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.0.keys().map(PathBuf::as_path)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChangeCacheFile {
    version: u32,
    mode: SignalMode,
    records: FxHashMap<String, Signals>,
}

/// Change records for the process lifetime, optionally persisted to disk.
///
/// Reads are concurrent; each commit replaces one scope's record in a single
/// write-locked update.
#[derive(Debug)]
pub struct ChangeCache {
    mode: SignalMode,
    path: Option<PathBuf>,
    records: RwLock<FxHashMap<String, Signals>>,
    persist_lock: Mutex<()>,
}

impl ChangeCache {
    /// Creates a cache that is never written to disk.
    pub fn in_memory(mode: SignalMode) -> Self {
        Self {
            mode,
            path: None,
            records: RwLock::new(FxHashMap::default()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Loads the cache persisted at `path`.
    ///
    /// A missing file, an undecodable file, or one written with a different
    /// format version or signal mode all load as an empty cache.
    pub fn load(path: impl Into<PathBuf>, mode: SignalMode) -> Result<Self> {
        let path = path.into();
        let records = match read_cache_file(&path) {
            Ok(Some(file)) if file.version == CHANGE_CACHE_VERSION && file.mode == mode => {
                debug!(path = %path.display(), scopes = file.records.len(), "loaded change cache");
                file.records
            }
            Ok(Some(_)) => {
                debug!(path = %path.display(), "change cache version or mode mismatch, starting empty");
                FxHashMap::default()
            }
            Ok(None) => FxHashMap::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable change cache");
                FxHashMap::default()
            }
        };

        Ok(Self {
            mode,
            path: Some(path),
            records: RwLock::new(records),
            persist_lock: Mutex::new(()),
        })
    }

    pub fn mode(&self) -> SignalMode {
        self.mode
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Captures the current signal of every input.
    pub fn snapshot(&self, inputs: &[PathBuf]) -> Result<Signals> {
        inputs
            .iter()
            .map(|path| Signal::capture(path, self.mode).map(|signal| (path.clone(), signal)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Signals)
    }

    /// Returns true if the action owning `scope` must run.
    ///
    /// Stale when any declared output is missing, when no record exists for
    /// the scope, when the set of inputs changed, or when any input's signal
    /// differs from the recorded one.
    pub fn is_stale(&self, scope: &str, current: &Signals, outputs: &[PathBuf]) -> Result<bool> {
        if let Some(missing) = outputs.iter().find(|p| !p.exists()) {
            debug!(scope, output = %missing.display(), "stale: output missing");
            return Ok(true);
        }

        let records = self
            .records
            .read()
            .map_err(|e| Error::MutexLock(format!("change cache read lock poisoned: {}", e)))?;

        let Some(recorded) = records.get(scope) else {
            debug!(scope, "stale: no record");
            return Ok(true);
        };

        if recorded.len() != current.len() {
            debug!(scope, "stale: input set changed");
            return Ok(true);
        }

        for (path, signal) in &current.0 {
            match recorded.get(path) {
                Some(previous) if previous == signal => {}
                Some(_) => {
                    debug!(scope, input = %path.display(), "stale: input changed");
                    return Ok(true);
                }
                None => {
                    debug!(scope, input = %path.display(), "stale: input has no record");
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Captures signals for `inputs` and checks them against the record.
    pub fn is_stale_paths(&self, scope: &str, inputs: &[PathBuf], outputs: &[PathBuf]) -> Result<bool> {
        let current = self.snapshot(inputs)?;
        self.is_stale(scope, &current, outputs)
    }

    /// Replaces the record for `scope` and persists the cache.
    ///
    /// `signals` must be the snapshot taken before the action ran, so a
    /// modification made while it ran still reads as stale next time.
    pub fn commit(&self, scope: &str, signals: Signals) -> Result<()> {
        {
            let mut records = self
                .records
                .write()
                .map_err(|e| Error::MutexLock(format!("change cache write lock poisoned: {}", e)))?;
            records.insert(scope.to_string(), signals);
        }
        self.persist()
    }

    /// Recorded signals for `scope`, if any.
    pub fn record(&self, scope: &str) -> Option<Signals> {
        self.records
            .read()
            .ok()
            .and_then(|records| records.get(scope).cloned())
    }

    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self
            .records
            .read()
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default();
        scopes.sort();
        scopes
    }

    /// Drops every record and deletes the persisted file.
    pub fn clear(&self) -> Result<()> {
        let _guard = self
            .persist_lock
            .lock()
            .map_err(|e| Error::MutexLock(format!("change cache persist lock poisoned: {}", e)))?;
        self.records
            .write()
            .map_err(|e| Error::MutexLock(format!("change cache write lock poisoned: {}", e)))?
            .clear();
        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        // Serialize under the persist lock so the last writer always holds
        // every committed record.
        let _guard = self
            .persist_lock
            .lock()
            .map_err(|e| Error::MutexLock(format!("change cache persist lock poisoned: {}", e)))?;

        let file = {
            let records = self
                .records
                .read()
                .map_err(|e| Error::MutexLock(format!("change cache read lock poisoned: {}", e)))?;
            ChangeCacheFile {
                version: CHANGE_CACHE_VERSION,
                mode: self.mode,
                records: records.clone(),
            }
        };

        let content = bincode::serialize(&file)
            .map_err(|e| Error::Cache(format!("Failed to serialize change cache: {}", e)))?;

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(&content)?;
        temp.persist(path)
            .map_err(|e| Error::Cache(format!("Failed to write {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "persisted change cache");
        Ok(())
    }
}

fn read_cache_file(path: &Path) -> Result<Option<ChangeCacheFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read(path)?;
    if content.is_empty() {
        return Ok(None);
    }
    bincode::deserialize(&content)
        .map(Some)
        .map_err(|e| Error::Cache(format!("Failed to parse change cache: {}", e)))
}

/// BLAKE3 digest of a file, read in 64 KiB chunks.
pub fn hash_file_fast(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}
