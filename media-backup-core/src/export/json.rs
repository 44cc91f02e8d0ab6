use tracing::error;

use super::{ExportDispatcher, ExportOutcome};
use crate::model::MediaItem;

impl ExportDispatcher<'_> {
    pub(super) async fn export_json(&self, collection: &[MediaItem], outcome: &mut ExportOutcome) {
        let path = self.module_root().join(format!("{}.json", self.file_stem()));
        match serde_json::to_string(collection) {
            Ok(content) => self.write_text(&content, path, outcome).await,
            Err(e) => {
                error!(error = %e, "[EXPORT][ERROR] Failed to serialise collection");
                outcome.failed.push((path, e.to_string()));
            }
        }
    }
}
