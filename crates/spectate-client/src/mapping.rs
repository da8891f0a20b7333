//! Bidirectional broadcast ↔ dolphin table.
//!
//! The store is the source of truth for what is currently being spectated.
//! Both directions are updated together by every mutation, so a broadcast
//! maps to at most one dolphin and a dolphin shows at most one broadcast.

use std::collections::{HashMap, HashSet};

use spectate_core::{Result, SpectateError, SpectatingBroadcast};

/// In-memory `broadcastId` ↔ `dolphinId` table.
#[derive(Clone, Debug, Default)]
pub struct MappingStore {
    by_broadcast: HashMap<String, String>,
    by_dolphin: HashMap<String, String>,
}

impl MappingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table with a server snapshot.
    ///
    /// Every entry is validated first; if any is invalid or an id repeats,
    /// the store is left untouched.
    pub fn snapshot_replace(&mut self, entries: Vec<SpectatingBroadcast>) -> Result<()> {
        let mut broadcasts = HashSet::with_capacity(entries.len());
        let mut dolphins = HashSet::with_capacity(entries.len());
        for entry in &entries {
            entry.validate()?;
            if !broadcasts.insert(entry.broadcast_id.as_str()) {
                return Err(SpectateError::ProtocolError(format!(
                    "broadcast {} appears twice in snapshot",
                    entry.broadcast_id
                )));
            }
            if !dolphins.insert(entry.dolphin_id.as_str()) {
                return Err(SpectateError::ProtocolError(format!(
                    "dolphin {} appears twice in snapshot",
                    entry.dolphin_id
                )));
            }
        }

        self.clear_all();
        for entry in entries {
            let _ = self
                .by_dolphin
                .insert(entry.dolphin_id.clone(), entry.broadcast_id.clone());
            let _ = self.by_broadcast.insert(entry.broadcast_id, entry.dolphin_id);
        }
        Ok(())
    }

    /// Map `broadcast_id` to `dolphin_id`, evicting whatever either side
    /// pointed at before.
    pub fn upsert(&mut self, broadcast_id: &str, dolphin_id: &str) {
        if let Some(old_dolphin) = self.by_broadcast.remove(broadcast_id) {
            let _ = self.by_dolphin.remove(&old_dolphin);
        }
        if let Some(old_broadcast) = self.by_dolphin.remove(dolphin_id) {
            let _ = self.by_broadcast.remove(&old_broadcast);
        }
        let _ = self
            .by_broadcast
            .insert(broadcast_id.to_string(), dolphin_id.to_string());
        let _ = self
            .by_dolphin
            .insert(dolphin_id.to_string(), broadcast_id.to_string());
    }

    /// Forget the entry for `dolphin_id`, returning the broadcast it showed.
    pub fn remove_by_dolphin_id(&mut self, dolphin_id: &str) -> Option<String> {
        let broadcast_id = self.by_dolphin.remove(dolphin_id)?;
        let _ = self.by_broadcast.remove(&broadcast_id);
        Some(broadcast_id)
    }

    /// Dolphin currently showing `broadcast_id`.
    pub fn lookup_dolphin_id(&self, broadcast_id: &str) -> Option<&str> {
        self.by_broadcast.get(broadcast_id).map(String::as_str)
    }

    /// Broadcast currently shown by `dolphin_id`.
    pub fn lookup_broadcast_id(&self, dolphin_id: &str) -> Option<&str> {
        self.by_dolphin.get(dolphin_id).map(String::as_str)
    }

    /// Drop every entry.
    pub fn clear_all(&mut self) {
        self.by_broadcast.clear();
        self.by_dolphin.clear();
    }

    /// All entries, ordered by broadcast id.
    pub fn entries(&self) -> Vec<SpectatingBroadcast> {
        let mut entries: Vec<_> = self
            .by_broadcast
            .iter()
            .map(|(broadcast_id, dolphin_id)| SpectatingBroadcast::new(broadcast_id, dolphin_id))
            .collect();
        entries.sort_by(|a, b| a.broadcast_id.cmp(&b.broadcast_id));
        entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.by_broadcast.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.by_broadcast.is_empty()
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        self.by_broadcast.len() == self.by_dolphin.len()
            && self
                .by_broadcast
                .iter()
                .all(|(b, d)| self.by_dolphin.get(d) == Some(b))
    }
}
