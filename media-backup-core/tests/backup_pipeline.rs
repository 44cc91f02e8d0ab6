use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use media_backup_core::assets::HeuristicHostClassifier;
use media_backup_core::backup::{run_module_backup, Collaborators};
use media_backup_core::collector::StopReason;
use media_backup_core::config::{IncrementMode, ModuleConfig};
use media_backup_core::contract::{MockBackupMarker, MockPageSource, PageSource, SnapshotStore};
use media_backup_core::error::BackupError;
use media_backup_core::export::ExportTargets;
use media_backup_core::fetcher::HttpPageSource;
use media_backup_core::local::{JsonBackupMarker, JsonSnapshotStore, LocalFs, TaskListQueue};
use media_backup_core::progress::LogProgressSink;
use media_backup_core::registrar::UrlFilenameMap;

fn envelope(videos: serde_json::Value, total: u64) -> String {
    let payload = json!({ "code": 0, "data": { "total": total, "Videos": videos } });
    format!("shine0_Callback({payload});")
}

#[tokio::test]
async fn http_source_builds_page_urls_and_maps_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("shine0_Callback({});"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("start", "10"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let template = format!("{}/list?start={{start}}&count={{count}}", server.uri());
    let source = HttpPageSource::new(template, 10, "media-backup-test", Duration::from_secs(5)).unwrap();
    assert!(source.page_url(2).ends_with("/list?start=20&count=10"));

    let body = source.fetch_page(0).await.unwrap();
    assert_eq!(body, "shine0_Callback({});");

    let err = source.fetch_page(1).await.unwrap_err();
    assert!(matches!(err, BackupError::Network { page_index: 1, .. }));
}

#[tokio::test]
async fn incremental_runs_over_http_export_and_mark_once_each() {
    let server = MockServer::start().await;
    let first_page = envelope(
        json!([
            { "vid": "1", "url": format!("{}/media/a.mp4", server.uri()), "pre": format!("{}/media/a.jpg", server.uri()), "uploadTime": 1_600_000_200, "desc": "newest" },
            { "vid": "2", "url": format!("{}/media/b.mp4", server.uri()), "uploadTime": 1_600_000_100, "desc": "older" }
        ]),
        2,
    );
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(first_page))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let root = dir.path();
    let config = ModuleConfig {
        page_size: 10,
        export_type: "JSON".into(),
        ..Default::default()
    };
    let source = HttpPageSource::new(
        format!("{}/list?start={{start}}&count={{count}}", server.uri()),
        config.page_size,
        "media-backup-test",
        Duration::from_secs(5),
    )
    .unwrap();
    let fs = LocalFs::with_offset(config.display_offset());
    let snapshots = JsonSnapshotStore::new(root);
    let marker = JsonBackupMarker::new(root);
    let progress = LogProgressSink::new(config.name.clone());
    let classifier = HeuristicHostClassifier;

    let queue = TaskListQueue::new();
    let collaborators = Collaborators {
        source: &source,
        progress: &progress,
        queue: &queue,
        classifier: &classifier,
        export: ExportTargets {
            text: &fs,
            templates: &fs,
            folders: &fs,
        },
        snapshots: &snapshots,
        marker: &marker,
    };

    let first = run_module_backup(&config, root, collaborators, &mut UrlFilenameMap::new()).await;
    assert!(first.is_success(), "{first:?}");
    assert_eq!(first.stop, Some(StopReason::StoppedExhausted));
    assert_eq!(first.total_items, 2);
    // one preview and two assets
    assert_eq!(queue.len(), 3);
    let exported: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(root.join("Videos/videos.json")).unwrap()).unwrap();
    assert_eq!(exported[0]["custom_filename"], json!("a.mp4"));
    assert_eq!(snapshots.load(&config).await.len(), 2);

    let second_queue = TaskListQueue::new();
    let second = run_module_backup(
        &config,
        root,
        Collaborators {
            queue: &second_queue,
            ..collaborators
        },
        &mut UrlFilenameMap::new(),
    )
    .await;
    assert!(second.is_success());
    assert_eq!(second.stop, Some(StopReason::StoppedEarly));
    assert_eq!(second.fresh_items, 0);
    assert_eq!(second.total_items, 2);
    assert!(second_queue.is_empty());

    let info = marker.read_all().await.unwrap();
    assert_eq!(info["Videos"].items, 2);
    assert_eq!(info["Videos"].newest_time, Some(1_600_000_200));
}

#[tokio::test]
async fn incomplete_export_leaves_marker_and_snapshot_untouched() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let config = ModuleConfig {
        export_type: "Slides".into(),
        ..Default::default()
    };

    let mut source = MockPageSource::new();
    source
        .expect_fetch_page()
        .returning(|_| Ok(envelope(json!([{ "url": "https://v.example.com/a.mp4", "uploadTime": 5 }]), 1)));
    let mut marker = MockBackupMarker::new();
    marker.expect_record().times(0);

    let fs = LocalFs::new();
    let snapshots = JsonSnapshotStore::new(root);
    let progress = LogProgressSink::new("Videos");
    let queue = TaskListQueue::new();
    let report = run_module_backup(
        &config,
        root,
        Collaborators {
            source: &source,
            progress: &progress,
            queue: &queue,
            classifier: &HeuristicHostClassifier,
            export: ExportTargets {
                text: &fs,
                templates: &fs,
                folders: &fs,
            },
            snapshots: &snapshots,
            marker: &marker,
        },
        &mut UrlFilenameMap::new(),
    )
    .await;

    assert!(!report.marked);
    assert!(report.export_format.is_none());
    assert_eq!(report.total_items, 1);
    assert!(!snapshots.path_for(&config).exists());
}

#[tokio::test]
async fn full_mode_ignores_previous_snapshot() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let config = ModuleConfig {
        export_type: "Link".into(),
        increment: IncrementMode::Full,
        ..Default::default()
    };
    let snapshots = JsonSnapshotStore::new(root);
    let stale = vec![media_backup_core::model::MediaItem {
        url: Some("https://v.example.com/gone.mp4".into()),
        upload_time: Some(1),
        ..Default::default()
    }];
    snapshots.save(&config, &stale).await.unwrap();

    let mut source = MockPageSource::new();
    source
        .expect_fetch_page()
        .times(1)
        .returning(|_| Ok(envelope(json!([{ "url": "https://v.example.com/a.mp4", "uploadTime": 5 }]), 1)));
    let mut marker = MockBackupMarker::new();
    marker.expect_record().times(1).returning(|_, _| Ok(()));

    let fs = LocalFs::new();
    let progress = LogProgressSink::new("Videos");
    let queue = TaskListQueue::new();
    let report = run_module_backup(
        &config,
        root,
        Collaborators {
            source: &source,
            progress: &progress,
            queue: &queue,
            classifier: &HeuristicHostClassifier,
            export: ExportTargets {
                text: &fs,
                templates: &fs,
                folders: &fs,
            },
            snapshots: &snapshots,
            marker: &marker,
        },
        &mut UrlFilenameMap::new(),
    )
    .await;

    assert!(report.is_success());
    let links = std::fs::read_to_string(root.join("Videos/videos.downlist")).unwrap();
    assert_eq!(links.trim(), "https://v.example.com/a.mp4");
    assert_eq!(snapshots.load(&config).await.len(), 1);
}

#[tokio::test]
async fn failed_pages_keep_the_previous_snapshot_and_marker() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let config = ModuleConfig {
        page_size: 1,
        export_type: "JSON".into(),
        ..Default::default()
    };
    let snapshots = JsonSnapshotStore::new(root);
    let previous = vec![media_backup_core::model::MediaItem {
        url: Some("https://v.example.com/p.mp4".into()),
        upload_time: Some(5),
        ..Default::default()
    }];
    snapshots.save(&config, &previous).await.unwrap();

    let mut source = MockPageSource::new();
    source.expect_fetch_page().times(2).returning(|page_index| match page_index {
        0 => Err(BackupError::Network {
            page_index,
            message: "connection reset".into(),
        }),
        _ => Ok(envelope(json!([{ "url": "https://v.example.com/c.mp4", "uploadTime": 6 }]), 2)),
    });
    let mut marker = MockBackupMarker::new();
    marker.expect_record().times(0);

    let fs = LocalFs::new();
    let progress = LogProgressSink::new("Videos");
    let queue = TaskListQueue::new();
    let report = run_module_backup(
        &config,
        root,
        Collaborators {
            source: &source,
            progress: &progress,
            queue: &queue,
            classifier: &HeuristicHostClassifier,
            export: ExportTargets {
                text: &fs,
                templates: &fs,
                folders: &fs,
            },
            snapshots: &snapshots,
            marker: &marker,
        },
        &mut UrlFilenameMap::new(),
    )
    .await;

    assert!(report.frontier_held);
    assert!(!report.marked);
    assert!(!report.is_success());
    assert_eq!(report.progress.failed_pages.len(), 1);
    assert_eq!(report.total_items, 2);

    let exported: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(root.join("Videos/videos.json")).unwrap()).unwrap();
    assert_eq!(exported.len(), 2);
    let kept = snapshots.load(&config).await;
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].asset_url(), Some("https://v.example.com/p.mp4"));
}
