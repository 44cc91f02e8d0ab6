//! De-duplicating merge of freshly fetched items with the previous snapshot.

use std::collections::HashMap;

use tracing::debug;

use crate::model::{Collection, IdentityKey, ItemKey, MediaItem};

/// Merges collections by identity key and orders them newest first.
#[derive(Debug, Clone)]
pub struct DedupMerger {
    identity: IdentityKey,
    time_field: String,
}

impl DedupMerger {
    pub fn new(identity: IdentityKey, time_field: impl Into<String>) -> Self {
        Self {
            identity,
            time_field: time_field.into(),
        }
    }

    /// Add `items` to an accumulation in arrival order. An item whose key is
    /// already present replaces the earlier one in place. Items without an
    /// identity key are keyed by their record fingerprint.
    pub fn union_into(&self, acc: &mut Accumulator, items: Vec<MediaItem>) {
        for item in items {
            acc.upsert(item.dedup_key(&self.identity), item);
        }
    }

    /// Merge `fresh` over `previous`. Fresh items win on equal keys; previous
    /// items survive unless superseded and are flagged as backed up. Keyless
    /// items only collapse into an identical record.
    pub fn merge(&self, previous: Collection, fresh: Collection) -> Collection {
        let mut acc = Accumulator::with_capacity(previous.len() + fresh.len());
        self.union_into(&mut acc, fresh);

        let mut superseded = 0usize;
        for mut item in previous {
            let key = item.dedup_key(&self.identity);
            if key.as_ref().is_some_and(|k| acc.contains(k)) {
                superseded += 1;
                continue;
            }
            item.backed_up = true;
            acc.upsert(key, item);
        }
        debug!(superseded, "Merged fresh items over previous snapshot");

        let mut merged = acc.into_items();
        self.sort(&mut merged);
        merged
    }

    /// Stable sort, newest first by the configured time field; untimed items last.
    pub fn sort(&self, items: &mut [MediaItem]) {
        let field = self.time_field.as_str();
        items.sort_by(|a, b| b.timestamp(field).cmp(&a.timestamp(field)));
    }
}

/// Working collection of one run, keyed by identity.
#[derive(Debug, Default)]
pub struct Accumulator {
    items: Vec<MediaItem>,
    index: HashMap<ItemKey, usize>,
}

impl Accumulator {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    fn upsert(&mut self, key: Option<ItemKey>, item: MediaItem) {
        match key {
            Some(key) => match self.index.get(&key) {
                Some(&pos) => self.items[pos] = item,
                None => {
                    self.index.insert(key, self.items.len());
                    self.items.push(item);
                }
            },
            None => self.items.push(item),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Collection {
        self.items
    }
}
