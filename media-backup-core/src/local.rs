//! Local-disk implementations of the collaborator traits.
//!
//! - [`LocalFs`]: text files, folders and the built-in page templates.
//! - [`JsonSnapshotStore`]: the merged collection of the last run.
//! - [`JsonBackupMarker`]: `backup_info.json`, one entry per module.
//! - [`TaskListQueue`]: download tasks gathered in memory for an external downloader.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ModuleConfig;
use crate::contract::{
    BackupMarker, DownloadQueue, DownloadTask, SnapshotStore, TemplateWriter, TextWriter,
    TreeFolder,
};
use crate::error::{BackupError, Result};
use crate::model::{Collection, MediaItem};

/// Writes under real paths with `tokio::fs`. Parent folders are created on write.
#[derive(Debug, Clone)]
pub struct LocalFs {
    display_offset: FixedOffset,
}

impl Default for LocalFs {
    fn default() -> Self {
        Self {
            display_offset: Utc.fix(),
        }
    }
}

impl LocalFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zone used for descriptions that fall back to the upload time.
    pub fn with_offset(display_offset: FixedOffset) -> Self {
        Self { display_offset }
    }

    fn render_template(&self, name: &str, data: &Value) -> std::result::Result<String, String> {
        match name {
            "videos" => Ok(index_page(data)),
            "videos_static" => year_page(data, self.display_offset),
            other => Err(format!("unknown template '{other}'")),
        }
    }
}

#[async_trait]
impl TextWriter for LocalFs {
    async fn write(&self, content: &str, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BackupError::write(path, e))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| BackupError::write(path, e))?;
        debug!(path = %path.display(), bytes = content.len(), "Wrote file");
        Ok(path.to_path_buf())
    }
}

#[async_trait]
impl TreeFolder for LocalFs {
    async fn ensure(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| BackupError::write(path, e))
    }
}

#[async_trait]
impl TemplateWriter for LocalFs {
    async fn render(&self, template_name: &str, data: &Value, path: &Path) -> Result<PathBuf> {
        let html = self
            .render_template(template_name, data)
            .map_err(|e| BackupError::write(path, e))?;
        self.write(&html, path).await
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn index_page(data: &Value) -> String {
    let title = escape_html(data["title"].as_str().unwrap_or("Videos"));
    let script = escape_html(data["data_script"].as_str().unwrap_or("../json/videos.js"));
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<script src="{script}"></script>
</head>
<body>
<h1>{title}</h1>
<ul id="videos"></ul>
<script>
const list = document.getElementById("videos");
for (const item of dataList) {{
  const li = document.createElement("li");
  const text = document.createElement("p");
  text.textContent = item.desc || item.name || "";
  const video = document.createElement("video");
  video.src = item.custom_filepath || item.custom_url || item.url || item.video_url || item.url3 || "";
  video.controls = true;
  li.append(text, video);
  list.append(li);
}}
</script>
</body>
</html>
"#
    )
}

fn year_page(data: &Value, offset: FixedOffset) -> std::result::Result<String, String> {
    let items: Vec<MediaItem> = serde_json::from_value(data["videos"].clone())
        .map_err(|e| format!("invalid year page data: {e}"))?;
    let year = data["year"]
        .as_i64()
        .map(|y| y.to_string())
        .unwrap_or_default();

    let mut entries = String::new();
    for item in &items {
        let src = item
            .custom_filepath
            .as_deref()
            .or(item.custom_url.as_deref())
            .or_else(|| item.asset_url())
            .unwrap_or_default();
        entries.push_str(&format!(
            "<li>\n<p>{}</p>\n<video src=\"{}\" controls=\"controls\"></video>\n</li>\n",
            escape_html(&item.description(offset)),
            escape_html(src),
        ));
    }

    Ok(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{year}</title>\n</head>\n<body>\n<h1>{year}</h1>\n<ul>\n{entries}</ul>\n</body>\n</html>\n"
    ))
}

/// Snapshot files live at `<root>/json/<module>.snapshot.json`.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    root: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, module: &ModuleConfig) -> PathBuf {
        self.root
            .join("json")
            .join(format!("{}.snapshot.json", module.name.to_lowercase()))
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self, module: &ModuleConfig) -> Collection {
        let path = self.path_for(module);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(module = %module.name, "[SNAPSHOT] No previous snapshot, starting fresh");
                return Vec::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "[SNAPSHOT] Cannot read snapshot, starting fresh");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Collection>(&raw) {
            Ok(items) => {
                info!(module = %module.name, items = items.len(), "[SNAPSHOT] Loaded previous snapshot");
                items
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "[SNAPSHOT] Snapshot is corrupt, starting fresh");
                Vec::new()
            }
        }
    }

    async fn save(&self, module: &ModuleConfig, collection: &[MediaItem]) -> Result<()> {
        let path = self.path_for(module);
        let json = serde_json::to_string_pretty(collection)?;
        LocalFs::new().write(&json, &path).await?;
        info!(module = %module.name, items = collection.len(), "[SNAPSHOT] Saved snapshot");
        Ok(())
    }
}

/// One module's entry in `backup_info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub module: String,
    pub backed_up_at: chrono::DateTime<Utc>,
    /// Newest value of the frontier field in the recorded collection.
    pub newest_time: Option<i64>,
    pub items: usize,
}

#[derive(Debug, Clone)]
pub struct JsonBackupMarker {
    path: PathBuf,
}

impl JsonBackupMarker {
    pub const FILE_NAME: &'static str = "backup_info.json";

    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(Self::FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All recorded entries keyed by module name; empty when nothing was recorded yet.
    pub async fn read_all(&self) -> Result<BTreeMap<String, BackupInfo>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BackupMarker for JsonBackupMarker {
    async fn record(&self, module: &ModuleConfig, collection: &[MediaItem]) -> Result<()> {
        let mut all = self.read_all().await.unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "[MARKER] Replacing unreadable backup info");
            BTreeMap::new()
        });
        let field = module.pre_backup.field.as_str();
        let info = BackupInfo {
            module: module.name.clone(),
            backed_up_at: Utc::now(),
            newest_time: collection.iter().filter_map(|i| i.timestamp(field)).max(),
            items: collection.len(),
        };
        all.insert(module.name.clone(), info);

        let json = serde_json::to_string_pretty(&all)?;
        LocalFs::new().write(&json, &self.path).await?;
        info!(module = %module.name, path = %self.path.display(), "[MARKER] Recorded backup");
        Ok(())
    }
}

/// Download queue that only collects tasks.
#[derive(Debug, Default)]
pub struct TaskListQueue {
    tasks: Mutex<Vec<DownloadTask>>,
}

impl TaskListQueue {
    pub const MANIFEST_NAME: &'static str = "downloads.json";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<DownloadTask> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write all tasks as a JSON array to `path`.
    pub async fn write_manifest(&self, path: &Path) -> Result<PathBuf> {
        let tasks = self.tasks();
        let json = serde_json::to_string_pretty(&tasks)?;
        let written = LocalFs::new().write(&json, path).await?;
        info!(tasks = tasks.len(), path = %written.display(), "[QUEUE] Wrote download manifest");
        Ok(written)
    }
}

impl DownloadQueue for TaskListQueue {
    fn enqueue(&self, task: DownloadTask) {
        debug!(url = %task.url, filename = %task.filename, "[QUEUE] Task queued");
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn unknown_template_is_a_write_error() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new();
        let err = fs
            .render("slideshow", &Value::Null, &dir.path().join("x.html"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Write { .. }));
    }

    #[tokio::test]
    async fn year_page_escapes_descriptions() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new();
        let data = json!({
            "year": 2020,
            "videos": [{ "desc": "<b>hi</b>", "url": "https://v.example.com/a.mp4" }]
        });
        let path = fs
            .render("videos_static", &data, &dir.path().join("Videos/2020.html"))
            .await
            .unwrap();

        let html = std::fs::read_to_string(path).unwrap();
        assert!(html.contains("&lt;b&gt;hi&lt;/b&gt;"));
        assert!(html.contains("src=\"https://v.example.com/a.mp4\""));
    }

    #[tokio::test]
    async fn snapshot_round_trips_and_tolerates_garbage() {
        let dir = tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path());
        let config = ModuleConfig::default();
        assert!(store.load(&config).await.is_empty());

        let items = vec![MediaItem {
            url: Some("https://v.example.com/a.mp4".into()),
            upload_time: Some(10),
            ..Default::default()
        }];
        store.save(&config, &items).await.unwrap();
        assert_eq!(store.load(&config).await, items);

        std::fs::write(store.path_for(&config), "not json").unwrap();
        assert!(store.load(&config).await.is_empty());
    }

    #[tokio::test]
    async fn marker_keeps_one_entry_per_module() {
        let dir = tempdir().unwrap();
        let marker = JsonBackupMarker::new(dir.path());
        let videos = ModuleConfig::default();
        let clips = ModuleConfig {
            name: "Clips".into(),
            ..Default::default()
        };
        let items = vec![
            MediaItem {
                upload_time: Some(7),
                ..Default::default()
            },
            MediaItem {
                upload_time: Some(9),
                ..Default::default()
            },
        ];

        marker.record(&videos, &items).await.unwrap();
        marker.record(&clips, &[]).await.unwrap();
        marker.record(&videos, &items[..1]).await.unwrap();

        let all = marker.read_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["Videos"].newest_time, Some(7));
        assert_eq!(all["Videos"].items, 1);
        assert_eq!(all["Clips"].newest_time, None);
    }

    #[tokio::test]
    async fn task_list_writes_manifest() {
        let dir = tempdir().unwrap();
        let queue = TaskListQueue::new();
        queue.enqueue(DownloadTask {
            url: "https://v.example.com/a.mp4".into(),
            target_dir: "Videos".into(),
            filename: "a.mp4".into(),
            source_ref: "v1".into(),
        });

        let path = queue
            .write_manifest(&dir.path().join(TaskListQueue::MANIFEST_NAME))
            .await
            .unwrap();
        let written: Vec<DownloadTask> =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written, queue.tasks());
    }
}
