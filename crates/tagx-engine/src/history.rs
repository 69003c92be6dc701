//! Shared, append-only log of accepted keys per tag type.
//!
//! LATE-phase derivation reads it; successful attempts append to it. There is
//! no update or delete. Readers take an immutable [`HistorySnapshot`] at the
//! start of an attempt, so a concurrent append never changes the keys an
//! in-flight attempt derives.
//!
//! When backed by a file, the log is JSON lines opened in append mode. Each
//! record is written and flushed under the write lock before it becomes
//! visible in memory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tagx_core::KeyMaterial;

/// One accepted layer key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub tag_type: u16,
    /// Offset of the tag whose decryption produced this key
    pub offset: u64,
    /// Position of the layer in the accepted recipe
    #[serde(default)]
    pub layer_index: usize,
    pub accepted_key: KeyMaterial,
    /// Unix timestamp (seconds) of acceptance
    pub timestamp: u64,
}

impl HistoryRecord {
    pub fn new(tag_type: u16, offset: u64, layer_index: usize, accepted_key: KeyMaterial) -> Self {
        Self {
            tag_type,
            offset,
            layer_index,
            accepted_key,
            timestamp: now_secs(),
        }
    }
}

type Records = BTreeMap<u16, Vec<HistoryRecord>>;

struct Inner {
    records: Arc<Records>,
    log: Option<File>,
}

pub struct KeyHistory {
    path: Option<PathBuf>,
    inner: RwLock<Inner>,
}

impl KeyHistory {
    /// History that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: RwLock::new(Inner {
                records: Arc::new(Records::new()),
                log: None,
            }),
        }
    }

    /// Open (or create) a JSON-lines history file and load its records.
    ///
    /// A final line that does not parse is a torn append: it is dropped and
    /// the file is truncated back to the last complete record so later
    /// appends start on a clean line. An unparseable interior line is an
    /// error.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating history dir: {}", parent.display()))?;
        }

        let loaded = read_log(path)?;
        if let Some(valid_len) = loaded.torn_at {
            let file = OpenOptions::new()
                .write(true)
                .open(path)
                .with_context(|| format!("opening key history: {}", path.display()))?;
            file.set_len(valid_len)
                .with_context(|| format!("truncating key history: {}", path.display()))?;
        }

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening key history for append: {}", path.display()))?;

        tracing::debug!(path = %path.display(), records = loaded.count, "key history loaded");

        Ok(Self {
            path: Some(path.to_path_buf()),
            inner: RwLock::new(Inner {
                records: Arc::new(loaded.records),
                log: Some(log),
            }),
        })
    }

    /// Load a history file without creating or modifying it. Appends only
    /// reach memory. A missing file loads as empty.
    pub fn load(path: &Path) -> Result<Self> {
        let loaded = read_log(path)?;
        tracing::debug!(path = %path.display(), records = loaded.count, "key history loaded");
        Ok(Self {
            path: Some(path.to_path_buf()),
            inner: RwLock::new(Inner {
                records: Arc::new(loaded.records),
                log: None,
            }),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append records as one publish. Readers see all of them or none.
    pub fn append_all(&self, new: Vec<HistoryRecord>) -> Result<()> {
        if new.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(log) = inner.log.as_mut() {
            let mut buf = Vec::new();
            for record in &new {
                serde_json::to_writer(&mut buf, record).context("serializing history record")?;
                buf.push(b'\n');
            }
            log.write_all(&buf).context("appending to key history")?;
            log.flush().context("flushing key history")?;
        }

        let mut records = (*inner.records).clone();
        for record in new {
            tracing::debug!(
                tag_type = record.tag_type,
                offset = record.offset,
                layer_index = record.layer_index,
                "accepted key recorded"
            );
            records.entry(record.tag_type).or_default().push(record);
        }
        inner.records = Arc::new(records);
        Ok(())
    }

    pub fn append(&self, record: HistoryRecord) -> Result<()> {
        self.append_all(vec![record])
    }

    /// Immutable view of every record appended so far.
    pub fn snapshot(&self) -> HistorySnapshot {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        HistorySnapshot {
            records: Arc::clone(&inner.records),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyHistory {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Point-in-time view of the key history. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    records: Arc<Records>,
}

impl HistorySnapshot {
    pub fn records(&self, tag_type: u16) -> &[HistoryRecord] {
        self.records
            .get(&tag_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Tag types with at least one record, ascending.
    pub fn tag_types(&self) -> Vec<u16> {
        self.records.keys().copied().collect()
    }

    /// Accepted keys for `tag_type` in log order, as LATE derivation wants them.
    pub fn accepted_keys(&self, tag_type: u16) -> Vec<KeyMaterial> {
        self.records(tag_type)
            .iter()
            .map(|r| r.accepted_key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct LoadedLog {
    records: Records,
    count: usize,
    /// Byte length of the complete records when the last line was torn
    torn_at: Option<u64>,
}

fn read_log(path: &Path) -> Result<LoadedLog> {
    let mut loaded = LoadedLog {
        records: Records::new(),
        count: 0,
        torn_at: None,
    };
    if !path.exists() {
        return Ok(loaded);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading key history: {}", path.display()))?;

    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    let mut consumed = 0u64;
    for (lineno, line) in lines.iter().enumerate() {
        if !line.trim().is_empty() {
            match serde_json::from_str::<HistoryRecord>(line.trim_end()) {
                Ok(record) => {
                    loaded.records.entry(record.tag_type).or_default().push(record);
                    loaded.count += 1;
                }
                Err(e) if Some(lineno) == last => {
                    tracing::warn!(
                        path = %path.display(),
                        line = lineno + 1,
                        "dropping incomplete final key history record: {e}"
                    );
                    loaded.torn_at = Some(consumed);
                    break;
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e).context(format!(
                        "parsing key history {}:{}",
                        path.display(),
                        lineno + 1
                    )));
                }
            }
        }
        consumed += line.len() as u64;
    }
    Ok(loaded)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
