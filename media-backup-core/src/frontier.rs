//! Detection of the early-stop frontier: content already captured by a previous run.
//!
//! The remote data gives no reliable "already seen" marker, so the comparison
//! is a pluggable predicate chosen by configuration.

use std::collections::HashSet;

use crate::config::{FrontierStrategy, ModuleConfig};
use crate::model::{IdentityKey, ItemKey, MediaItem};

pub trait BackupFrontier: Send + Sync {
    /// `true` when `item` is at or behind the frontier of backed-up content.
    fn is_backed_up(&self, item: &MediaItem) -> bool;
}

/// Items no newer than the newest time in the previous snapshot are backed up.
/// An untimed item is backed up when the snapshot holds an identical record.
pub struct TimeFrontier {
    field: String,
    newest: Option<i64>,
    untimed: HashSet<ItemKey>,
}

impl TimeFrontier {
    pub fn from_snapshot(field: impl Into<String>, previous: &[MediaItem]) -> Self {
        let field = field.into();
        let newest = previous.iter().filter_map(|i| i.timestamp(&field)).max();
        let untimed = previous
            .iter()
            .filter(|i| i.timestamp(&field).is_none())
            .filter_map(MediaItem::record_key)
            .collect();
        Self {
            field,
            newest,
            untimed,
        }
    }

    pub fn newest(&self) -> Option<i64> {
        self.newest
    }
}

impl BackupFrontier for TimeFrontier {
    fn is_backed_up(&self, item: &MediaItem) -> bool {
        match (self.newest, item.timestamp(&self.field)) {
            (Some(newest), Some(t)) => t <= newest,
            (_, None) => item
                .record_key()
                .is_some_and(|record| self.untimed.contains(&record)),
            (None, Some(_)) => false,
        }
    }
}

/// Items whose identity key exists in the previous snapshot are backed up.
/// Keyless items match on their record fingerprint.
pub struct KeyFrontier {
    identity: IdentityKey,
    keys: HashSet<ItemKey>,
}

impl KeyFrontier {
    pub fn from_snapshot(identity: IdentityKey, previous: &[MediaItem]) -> Self {
        let keys = previous.iter().filter_map(|i| i.dedup_key(&identity)).collect();
        Self { identity, keys }
    }
}

impl BackupFrontier for KeyFrontier {
    fn is_backed_up(&self, item: &MediaItem) -> bool {
        item.dedup_key(&self.identity)
            .map(|k| self.keys.contains(&k))
            .unwrap_or(false)
    }
}

/// Full backups never stop early.
pub struct NoFrontier;

impl BackupFrontier for NoFrontier {
    fn is_backed_up(&self, _item: &MediaItem) -> bool {
        false
    }
}

/// Frontier configured for `config` over the previous snapshot.
pub fn frontier_for(config: &ModuleConfig, previous: &[MediaItem]) -> Box<dyn BackupFrontier> {
    if !config.is_incremental() || previous.is_empty() {
        return Box::new(NoFrontier);
    }
    match config.pre_backup.strategy {
        FrontierStrategy::Time => Box::new(TimeFrontier::from_snapshot(
            config.pre_backup.field.clone(),
            previous,
        )),
        FrontierStrategy::Key => Box::new(KeyFrontier::from_snapshot(
            config.identity.clone(),
            previous,
        )),
    }
}
