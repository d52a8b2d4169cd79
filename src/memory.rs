//! Bounded conversation memory and session snapshots

use crate::error::{Result, RouterError};
use crate::types::{unix_now, ContextMap, Exchange, SessionSnapshot};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_CAPACITY: usize = 20;

/// Most recent exchanges, oldest first. Length never exceeds `capacity`.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    exchanges: VecDeque<Exchange>,
    capacity: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ConversationMemory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            exchanges: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append, evicting the oldest entries beyond capacity
    pub fn append(&mut self, exchange: Exchange) {
        self.exchanges.push_back(exchange);
        while self.exchanges.len() > self.capacity {
            self.exchanges.pop_front();
        }
    }

    /// Last `n` exchanges in chronological order
    pub fn recent(&self, n: usize) -> Vec<&Exchange> {
        let skip = self.exchanges.len().saturating_sub(n);
        self.exchanges.iter().skip(skip).collect()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    pub fn snapshot(&self, context: &ContextMap) -> SessionSnapshot {
        SessionSnapshot {
            conversation_memory: self.exchanges.iter().cloned().collect(),
            context: context.clone(),
            timestamp: unix_now(),
        }
    }

    /// Rebuild memory (clamped to `capacity`) and context from a snapshot
    pub fn from_snapshot(snapshot: SessionSnapshot, capacity: usize) -> (Self, ContextMap) {
        let mut memory = Self::new(capacity);
        for exchange in snapshot.conversation_memory {
            memory.append(exchange);
        }
        (memory, snapshot.context)
    }

    /// Load a snapshot file written by `SnapshotStore::save`
    pub fn restore(path: &Path, capacity: usize) -> Result<(Self, ContextMap)> {
        let snapshot = SnapshotStore::load(path)?;
        Ok(Self::from_snapshot(snapshot, capacity))
    }
}

/// One snapshot file per session, overwritten in place
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `session_<start-seconds>.json` inside `dir`
    pub fn for_session(dir: &Path, started_at: f64) -> Self {
        Self::new(dir.join(format!("session_{}.json", started_at as u64)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pretty-printed write via a temp file and rename
    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let body = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| RouterError::SnapshotIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&tmp, body).map_err(|source| RouterError::SnapshotIo {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| RouterError::SnapshotIo {
            path: self.path.clone(),
            source,
        })?;

        info!(
            "Saved session snapshot ({} exchanges) to {}",
            snapshot.conversation_memory.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<SessionSnapshot> {
        let body = fs::read_to_string(path).map_err(|source| RouterError::SnapshotIo {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: SessionSnapshot = serde_json::from_str(&body)?;
        debug!(
            "Loaded snapshot with {} exchanges from {}",
            snapshot.conversation_memory.len(),
            path.display()
        );
        Ok(snapshot)
    }
}
