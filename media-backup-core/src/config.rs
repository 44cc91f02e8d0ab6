use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::IdentityKey;

/// Per-module backup settings. Every field has a default so a config file only
/// needs to name what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Module name; also the folder name under the output root.
    pub name: String,
    pub page_size: u32,
    /// Hard cap on page requests in one run, whatever the remote reports.
    pub max_pages: u32,
    /// Pagination ends after this many failed pages in a row.
    pub max_consecutive_failures: u32,
    /// `HTML`, `MarkDown`, `Link` or `JSON`.
    pub export_type: String,
    pub increment: IncrementMode,
    pub pre_backup: PreBackupConfig,
    pub identity: IdentityKey,
    /// Zone used for year/month grouping and generated descriptions.
    pub display_utc_offset_hours: i32,
    /// The backup is rendered from within the web page itself; nothing is downloaded.
    pub web_page_local: bool,
    pub payload: PayloadShape,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: "Videos".to_string(),
            page_size: 20,
            max_pages: 1000,
            max_consecutive_failures: 5,
            export_type: "HTML".to_string(),
            increment: IncrementMode::default(),
            pre_backup: PreBackupConfig::default(),
            identity: IdentityKey::default(),
            display_utc_offset_hours: 8,
            web_page_local: false,
            payload: PayloadShape::default(),
        }
    }
}

impl ModuleConfig {
    pub fn trace_loaded(&self) {
        info!(
            module = %self.name,
            page_size = self.page_size,
            export_type = %self.export_type,
            increment = ?self.increment,
            "Loaded ModuleConfig"
        );
        debug!(?self, "ModuleConfig loaded (full debug)");
    }

    /// Display zone; an out-of-range offset falls back to UTC.
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.display_utc_offset_hours.saturating_mul(3600)).unwrap_or_else(
            || {
                warn!(
                    offset_hours = self.display_utc_offset_hours,
                    "Invalid display offset, using UTC"
                );
                Utc.fix()
            },
        )
    }

    pub fn is_incremental(&self) -> bool {
        self.increment == IncrementMode::Incremental
    }
}

/// Whether a run continues from the previous snapshot or starts over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncrementMode {
    #[default]
    Incremental,
    Full,
}

/// How "already backed up" is detected on a freshly fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreBackupConfig {
    pub strategy: FrontierStrategy,
    /// Time field compared by [`FrontierStrategy::Time`].
    pub field: String,
}

impl Default for PreBackupConfig {
    fn default() -> Self {
        Self {
            strategy: FrontierStrategy::Time,
            field: "uploadTime".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontierStrategy {
    /// Item time `<=` the newest time in the previous snapshot.
    #[default]
    Time,
    /// Item identity key already present in the previous snapshot.
    Key,
}

/// Where the list lives inside the unwrapped payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadShape {
    /// Name of the callback wrapping the JSON body, e.g. `shine0_Callback(...)`.
    pub callback: String,
    pub data_key: String,
    pub items_key: String,
    pub total_key: String,
}

impl Default for PayloadShape {
    fn default() -> Self {
        Self {
            callback: "shine0_Callback".to_string(),
            data_key: "data".to_string(),
            items_key: "Videos".to_string(),
            total_key: "total".to_string(),
        }
    }
}
