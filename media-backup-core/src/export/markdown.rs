use chrono::FixedOffset;

use super::{group_by_year_month, ExportDispatcher, ExportOutcome};
use crate::assets::{player_url, HeuristicHostClassifier};
use crate::model::MediaItem;

impl ExportDispatcher<'_> {
    /// `<year>.md` per year, plus `<Module>.md` holding every year in order.
    pub(super) async fn export_markdown(&self, collection: &[MediaItem], outcome: &mut ExportOutcome) {
        let module_root = self.module_root();
        let offset = self.offset();
        let time_field = self.config.pre_backup.field.as_str();

        let mut all_years = Vec::new();
        for (year, months) in group_by_year_month(collection, time_field, offset) {
            let mut lines = vec![format!("# {year}")];
            for (month, items) in months {
                lines.push(format!("## {year}-{month:02}"));
                lines.extend(items.iter().map(|item| markdown_item(item, offset)));
                lines.push("---".to_string());
            }
            let content = lines.join("\n");
            self.write_text(&content, module_root.join(format!("{year}.md")), outcome)
                .await;
            all_years.push(content);
        }

        let path = module_root.join(format!("{}.md", self.config.name));
        self.write_text(&all_years.join("\n"), path, outcome).await;
    }
}

/// Block for one item: quoted description, the player, then a rule.
pub fn markdown_item(item: &MediaItem, offset: FixedOffset) -> String {
    let quoted = item
        .description(offset)
        .lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>();
    let quote = if quoted.is_empty() {
        ">".to_string()
    } else {
        quoted.join("\n")
    };

    let local = item.custom_filepath.as_deref().filter(|p| !p.is_empty());
    let player = match local {
        Some(path) => video_tag(path),
        None if HeuristicHostClassifier::is_third_party_player(item) => match player_url(item) {
            Some(url) => format!("<iframe src=\"{url}\" allowFullScreen=\"true\"></iframe>"),
            None => String::new(),
        },
        None => item
            .custom_url
            .as_deref()
            .or_else(|| item.asset_url())
            .map(video_tag)
            .unwrap_or_default(),
    };

    format!("{quote}\n\n{player}\n\n---\n")
}

fn video_tag(src: &str) -> String {
    format!("<video src=\"{src}\" controls=\"controls\"></video>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_block_prefers_local_copy() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let item = MediaItem {
            desc: Some("line one\nline two".into()),
            url: Some("https://v.example.com/a.mp4".into()),
            custom_filepath: Some("a.mp4".into()),
            ..Default::default()
        };

        let block = markdown_item(&item, utc);
        assert_eq!(
            block,
            "> line one\n> line two\n\n<video src=\"a.mp4\" controls=\"controls\"></video>\n\n---\n"
        );
    }

    #[test]
    fn item_block_links_remote_asset_without_local_copy() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let item = MediaItem {
            url: Some("https://v.example.com/a.mp4".into()),
            upload_time: Some(0),
            ..Default::default()
        };

        let block = markdown_item(&item, utc);
        assert!(block.starts_with("> 1970-01-01 00:00:00\n"));
        assert!(block.contains("src=\"https://v.example.com/a.mp4\""));
    }
}
