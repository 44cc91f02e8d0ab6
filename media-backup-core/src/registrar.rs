//! Scheduling of asset downloads for a collection.
//!
//! For every item the registrar attaches the derived `custom_*` fields and
//! hands download tasks to a [`DownloadQueue`]:
//!
//! - the preview image is always scheduled when a preview URL exists, under a
//!   synthetic `<uuid>.jpeg` name;
//! - the main asset is scheduled once per URL. The first encounter picks a
//!   filename and records it in the shared [`UrlFilenameMap`]; later encounters
//!   (other pages, other modules sharing the map) reuse it without enqueueing.
//!
//! Synthetic names use random v4 UUIDs: practically unique within one run, not
//! cryptographically unique.

use std::collections::{HashMap, HashSet};

use reqwest::Url;
use tracing::{debug, info};
use uuid::Uuid;

use crate::assets::HostClassifier;
use crate::config::ModuleConfig;
use crate::contract::{DownloadQueue, DownloadTask};
use crate::model::MediaItem;

const PREVIEW_EXTENSION: &str = "jpeg";
const DEFAULT_ASSET_EXTENSION: &str = "mp4";
const MAX_FILENAME_LEN: usize = 120;

/// Asset URL → local filename, for one export run.
///
/// Pass the same instance to several registrations to share filenames across
/// pages or modules.
#[derive(Debug, Default, Clone)]
pub struct UrlFilenameMap {
    by_url: HashMap<String, String>,
    used: HashSet<String>,
}

impl UrlFilenameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.by_url.get(url).map(String::as_str)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.by_url.contains_key(url)
    }

    pub fn insert(&mut self, url: impl Into<String>, filename: impl Into<String>) {
        let filename = filename.into();
        self.used.insert(filename.clone());
        self.by_url.insert(url.into(), filename);
    }

    fn is_used(&self, filename: &str) -> bool {
        self.used.contains(filename)
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}

/// Where a registration is happening.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterContext<'a> {
    /// Set when registering on behalf of a secondary aggregation directory.
    /// Assets then land in that directory and every item is registered,
    /// previously backed up or not.
    pub module_dir: Option<&'a str>,
    /// Reference recorded on each task instead of the item's own.
    pub source_ref: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterSummary {
    pub previews: usize,
    pub assets: usize,
    pub reused: usize,
    pub skipped_backed_up: usize,
    pub skipped_external: usize,
}

pub struct DownloadTaskRegistrar<'a> {
    config: &'a ModuleConfig,
    queue: &'a dyn DownloadQueue,
    classifier: &'a dyn HostClassifier,
}

impl<'a> DownloadTaskRegistrar<'a> {
    pub fn new(
        config: &'a ModuleConfig,
        queue: &'a dyn DownloadQueue,
        classifier: &'a dyn HostClassifier,
    ) -> Self {
        Self {
            config,
            queue,
            classifier,
        }
    }

    /// Annotate `items` in place and enqueue their downloads.
    pub fn register(
        &self,
        items: &mut [MediaItem],
        ctx: RegisterContext<'_>,
        urls: &mut UrlFilenameMap,
    ) -> RegisterSummary {
        let mut summary = RegisterSummary::default();
        if self.config.web_page_local {
            info!(module = %self.config.name, "[REGISTER] Web-page-local backup, no downloads");
            return summary;
        }

        let is_other = ctx.module_dir.is_some();
        let preview_dir = ctx
            .module_dir
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}/Images", self.config.name));
        let asset_dir = ctx
            .module_dir
            .map(str::to_string)
            .unwrap_or_else(|| self.config.name.clone());

        if !is_other {
            seed_backed_up(items, urls);
        }

        for item in items.iter_mut() {
            if !is_other && item.backed_up {
                summary.skipped_backed_up += 1;
                continue;
            }
            let source_ref = ctx
                .source_ref
                .map(str::to_string)
                .unwrap_or_else(|| self.item_ref(item));

            if let Some(preview) = item.preview_url().map(str::to_string) {
                let filename = format!("{}.{}", Uuid::new_v4().simple(), PREVIEW_EXTENSION);
                item.custom_pre_filepath = Some(format!("Images/{filename}"));
                item.custom_pre_filename = Some(filename.clone());
                item.custom_pre_url = Some(preview.clone());
                self.queue.enqueue(DownloadTask {
                    url: preview,
                    target_dir: preview_dir.clone(),
                    filename,
                    source_ref: source_ref.clone(),
                });
                summary.previews += 1;
            }

            if item.play_url.as_deref().is_some_and(|u| !u.is_empty()) {
                summary.skipped_external += 1;
                continue;
            }
            let Some(url) = item.asset_url().map(str::to_string) else {
                continue;
            };
            if self.classifier.is_external(item) {
                debug!(url = %url, "[REGISTER] Externally hosted asset, linking only");
                summary.skipped_external += 1;
                continue;
            }

            let filename = match urls.get(&url) {
                Some(known) => known.to_string(),
                None => derive_filename(&url, urls),
            };
            item.custom_filepath = Some(if is_other {
                format!("Images/{filename}")
            } else {
                filename.clone()
            });
            item.custom_filename = Some(filename.clone());
            item.custom_url = Some(url.clone());

            if urls.contains(&url) {
                summary.reused += 1;
                continue;
            }
            urls.insert(url.clone(), filename.clone());
            self.queue.enqueue(DownloadTask {
                url,
                target_dir: asset_dir.clone(),
                filename,
                source_ref,
            });
            summary.assets += 1;
        }

        info!(module = %self.config.name, ?summary, "[REGISTER] Download tasks registered");
        summary
    }

    fn item_ref(&self, item: &MediaItem) -> String {
        item.key(&self.config.identity)
            .or_else(|| item.vid.clone())
            .unwrap_or_else(|| format!("{}:unidentified", self.config.name))
    }
}

// Names taken by earlier runs stay taken, so a new URL never lands on an old file.
fn seed_backed_up(items: &[MediaItem], urls: &mut UrlFilenameMap) {
    for item in items.iter().filter(|i| i.backed_up) {
        if let (Some(url), Some(filename)) = (&item.custom_url, &item.custom_filename) {
            if !urls.contains(url) {
                urls.insert(url.clone(), filename.clone());
            }
        }
    }
}

/// Filename for an asset URL: its last path segment when that is a safe,
/// not yet used name; a synthetic `<uuid>.<ext>` otherwise.
pub fn derive_filename(url: &str, urls: &UrlFilenameMap) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments()?.last().map(str::to_string))
        .filter(|s| !s.is_empty());

    if let Some(name) = segment.as_deref() {
        if is_safe_filename(name) && !urls.is_used(name) {
            return name.to_string();
        }
    }
    let ext = segment
        .as_deref()
        .and_then(extension_of)
        .unwrap_or(DEFAULT_ASSET_EXTENSION);
    format!("{}.{}", Uuid::new_v4().simple(), ext)
}

fn is_safe_filename(name: &str) -> bool {
    name.len() <= MAX_FILENAME_LEN
        && !name.starts_with('.')
        && extension_of(name).is_some()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn extension_of(name: &str) -> Option<&str> {
    let (_, ext) = name.rsplit_once('.')?;
    (1..=5)
        .contains(&ext.len())
        .then_some(ext)
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
}
