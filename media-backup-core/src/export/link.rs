use tracing::warn;

use super::{ExportDispatcher, ExportOutcome};
use crate::model::MediaItem;

impl ExportDispatcher<'_> {
    /// `<stem>.downlist`: one download URL per line, in collection order.
    pub(super) async fn export_links(&self, collection: &[MediaItem], outcome: &mut ExportOutcome) {
        let lines: Vec<&str> = collection
            .iter()
            .filter_map(|item| {
                let url = item
                    .custom_url
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .or_else(|| item.asset_url());
                if url.is_none() {
                    warn!(vid = ?item.vid, "[EXPORT] Item has no asset URL, left out of link list");
                }
                url
            })
            .collect();

        let path = self.module_root().join(format!("{}.downlist", self.file_stem()));
        self.write_text(&lines.join("\n"), path, outcome).await;
    }
}
