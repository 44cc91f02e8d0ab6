//! Rendering of a finished collection to files.
//!
//! [`ExportDispatcher`] picks one renderer from the configured export type.
//! Nothing here fails the caller: an unknown format is logged and produces no
//! files, and each file that cannot be written is logged and recorded in the
//! [`ExportOutcome`] while its siblings are still attempted.

mod html;
mod json;
mod link;
mod markdown;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Datelike, FixedOffset};
use tracing::{error, info, warn};

use crate::config::ModuleConfig;
use crate::contract::{TemplateWriter, TextWriter, TreeFolder};
use crate::error::BackupError;
use crate::model::{local_time, MediaItem};

pub use markdown::markdown_item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ExportFormat {
    /// Embedded data asset, index page and one page per year.
    Html,
    /// One document per year with month sections, plus one for all years.
    Markdown,
    /// Newline-delimited download URLs.
    Link,
    /// The collection serialised as-is.
    Json,
}

impl FromStr for ExportFormat {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(ExportFormat::Html),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "link" | "links" => Ok(ExportFormat::Link),
            "json" => Ok(ExportFormat::Json),
            _ => Err(BackupError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Html => "HTML",
            ExportFormat::Markdown => "MarkDown",
            ExportFormat::Link => "Link",
            ExportFormat::Json => "JSON",
        };
        f.write_str(name)
    }
}

/// Writers used by the renderers.
#[derive(Clone, Copy)]
pub struct ExportTargets<'a> {
    pub text: &'a dyn TextWriter,
    pub templates: &'a dyn TemplateWriter,
    pub folders: &'a dyn TreeFolder,
}

/// What an export produced.
#[derive(Debug, Clone, Default)]
pub struct ExportOutcome {
    /// `None` when the requested format was not recognised.
    pub format: Option<ExportFormat>,
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl ExportOutcome {
    fn for_format(format: ExportFormat) -> Self {
        Self {
            format: Some(format),
            ..Default::default()
        }
    }

    /// A format was recognised and every file was written.
    pub fn is_complete(&self) -> bool {
        self.format.is_some() && self.failed.is_empty()
    }

    fn record(&mut self, path: PathBuf, result: Result<PathBuf, BackupError>) {
        match result {
            Ok(written) => {
                info!(path = %written.display(), "[EXPORT] Wrote file");
                self.written.push(written);
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "[EXPORT][ERROR] Failed to write file");
                self.failed.push((path, e.to_string()));
            }
        }
    }
}

pub struct ExportDispatcher<'a> {
    config: &'a ModuleConfig,
    targets: ExportTargets<'a>,
    root: PathBuf,
}

impl<'a> ExportDispatcher<'a> {
    /// `root` is the output root; module files go to `root/<module name>`.
    pub fn new(config: &'a ModuleConfig, targets: ExportTargets<'a>, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            targets,
            root: root.into(),
        }
    }

    pub fn module_root(&self) -> PathBuf {
        self.root.join(&self.config.name)
    }

    /// Lower-cased module name used for data file names (`videos.json`, ...).
    fn file_stem(&self) -> String {
        self.config.name.to_lowercase()
    }

    /// Render `collection` in `format`. Never fails; see [`ExportOutcome`].
    pub async fn export(&self, collection: &[MediaItem], format: &str) -> ExportOutcome {
        let format = match format.parse::<ExportFormat>() {
            Ok(format) => format,
            Err(e) => {
                warn!(module = %self.config.name, error = %e, "[EXPORT] Skipping export");
                return ExportOutcome::default();
            }
        };

        info!(module = %self.config.name, %format, items = collection.len(), "[EXPORT] Starting export");
        let mut outcome = ExportOutcome::for_format(format);
        if let Err(e) = self.targets.folders.ensure(&self.module_root()).await {
            error!(error = %e, "[EXPORT][ERROR] Failed to create module folder");
        }

        match format {
            ExportFormat::Html => self.export_html(collection, &mut outcome).await,
            ExportFormat::Markdown => self.export_markdown(collection, &mut outcome).await,
            ExportFormat::Link => self.export_links(collection, &mut outcome).await,
            ExportFormat::Json => self.export_json(collection, &mut outcome).await,
        }

        info!(
            module = %self.config.name,
            written = outcome.written.len(),
            failed = outcome.failed.len(),
            "[EXPORT] Export finished"
        );
        outcome
    }

    async fn write_text(&self, content: &str, path: PathBuf, outcome: &mut ExportOutcome) {
        let result = self.targets.text.write(content, &path).await;
        outcome.record(path, result);
    }

    async fn render(
        &self,
        template: &str,
        data: &serde_json::Value,
        path: PathBuf,
        outcome: &mut ExportOutcome,
    ) {
        let result = self.targets.templates.render(template, data, &path).await;
        outcome.record(path, result);
    }

    fn offset(&self) -> FixedOffset {
        self.config.display_offset()
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Items grouped by calendar year of `time_field` in `offset`, in order of
/// first appearance. Items without a usable time are logged and left out.
pub fn group_by_year<'c>(
    items: &'c [MediaItem],
    time_field: &str,
    offset: FixedOffset,
) -> Vec<(i32, Vec<&'c MediaItem>)> {
    let mut groups: Vec<(i32, Vec<&MediaItem>)> = Vec::new();
    for item in items {
        let Some(time) = item.timestamp(time_field).and_then(|t| local_time(t, offset)) else {
            warn!(item = ?item.asset_url(), "[EXPORT] Item has no usable time, left out of dated pages");
            continue;
        };
        let year = time.year();
        match groups.iter_mut().find(|(y, _)| *y == year) {
            Some((_, bucket)) => bucket.push(item),
            None => groups.push((year, vec![item])),
        }
    }
    groups
}

/// Year, then month (1-12), in order of first appearance.
pub fn group_by_year_month<'c>(
    items: &'c [MediaItem],
    time_field: &str,
    offset: FixedOffset,
) -> Vec<(i32, Vec<(u32, Vec<&'c MediaItem>)>)> {
    group_by_year(items, time_field, offset)
        .into_iter()
        .map(|(year, year_items)| {
            let mut months: Vec<(u32, Vec<&MediaItem>)> = Vec::new();
            for item in year_items {
                let Some(month) = item
                    .timestamp(time_field)
                    .and_then(|t| local_time(t, offset))
                    .map(|t| t.month())
                else {
                    continue;
                };
                match months.iter_mut().find(|(m, _)| *m == month) {
                    Some((_, bucket)) => bucket.push(item),
                    None => months.push((month, vec![item])),
                }
            }
            (year, months)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(t: i64) -> MediaItem {
        MediaItem {
            upload_time: Some(t),
            ..Default::default()
        }
    }

    #[test]
    fn parses_formats_case_insensitively() {
        assert_eq!("HTML".parse::<ExportFormat>().unwrap(), ExportFormat::Html);
        assert_eq!("MarkDown".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert_eq!("link".parse::<ExportFormat>().unwrap(), ExportFormat::Link);
        assert_eq!("Json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!(matches!(
            "pdf".parse::<ExportFormat>(),
            Err(BackupError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn year_grouping_uses_display_zone() {
        // 2020-12-31 20:00:00 UTC is already 2021 at UTC+8
        let items = vec![at(1_609_444_800), at(1_577_836_800), MediaItem::default()];
        let utc8 = FixedOffset::east_opt(8 * 3600).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();

        let local: Vec<i32> = group_by_year(&items, "uploadTime", utc8).iter().map(|g| g.0).collect();
        assert_eq!(local, vec![2021, 2020]);

        let plain: Vec<i32> = group_by_year(&items, "uploadTime", utc).iter().map(|g| g.0).collect();
        assert_eq!(plain, vec![2020]);
    }

    #[test]
    fn month_grouping_nests_under_years() {
        // 2020-03-01 and 2020-01-15 and 2020-03-20, all UTC noon
        let items = vec![at(1_583_064_000), at(1_579_089_600), at(1_584_705_600)];
        let utc = FixedOffset::east_opt(0).unwrap();

        let groups = group_by_year_month(&items, "uploadTime", utc);
        assert_eq!(groups.len(), 1);
        let (year, months) = &groups[0];
        assert_eq!(*year, 2020);
        let shape: Vec<(u32, usize)> = months.iter().map(|(m, v)| (*m, v.len())).collect();
        assert_eq!(shape, vec![(3, 2), (1, 1)]);
    }
}
