use futures::future::join_all;
use serde_json::json;
use tracing::error;

use super::{group_by_year, ExportDispatcher, ExportOutcome};
use crate::model::MediaItem;

pub(super) const INDEX_TEMPLATE: &str = "videos";
pub(super) const YEAR_TEMPLATE: &str = "videos_static";

impl ExportDispatcher<'_> {
    /// `json/<stem>.js` data asset, `index.html`, and `<year>.html` per year.
    pub(super) async fn export_html(&self, collection: &[MediaItem], outcome: &mut ExportOutcome) {
        let data_dir = self.root().join("json");
        if let Err(e) = self.targets.folders.ensure(&data_dir).await {
            error!(error = %e, "[EXPORT][ERROR] Failed to create data folder");
        }

        let data_path = data_dir.join(format!("{}.js", self.file_stem()));
        match serde_json::to_string(collection) {
            Ok(data) => {
                let script = format!("const dataList = {data};\n");
                self.write_text(&script, data_path, outcome).await;
            }
            Err(e) => {
                error!(error = %e, "[EXPORT][ERROR] Failed to serialise collection");
                outcome.failed.push((data_path, e.to_string()));
            }
        }

        let module_root = self.module_root();
        let index = json!({
            "title": self.config.name,
            "data_script": format!("../json/{}.js", self.file_stem()),
        });
        self.render(INDEX_TEMPLATE, &index, module_root.join("index.html"), outcome)
            .await;

        // Year pages are rendered concurrently.
        let time_field = self.config.pre_backup.field.as_str();
        let mut pages = Vec::new();
        for (year, items) in group_by_year(collection, time_field, self.offset()) {
            let path = module_root.join(format!("{year}.html"));
            match serde_json::to_value(&items) {
                Ok(videos) => pages.push((path, json!({ "year": year, "videos": videos }))),
                Err(e) => {
                    error!(year, error = %e, "[EXPORT][ERROR] Failed to serialise year page data");
                    outcome.failed.push((path, e.to_string()));
                }
            }
        }
        let rendered = join_all(
            pages
                .iter()
                .map(|(path, data)| self.targets.templates.render(YEAR_TEMPLATE, data, path)),
        )
        .await;
        for ((path, _), result) in pages.into_iter().zip(rendered) {
            outcome.record(path, result);
        }
    }
}
