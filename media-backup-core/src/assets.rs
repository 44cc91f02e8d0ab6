//! Where an item's bytes live, and how to link to them when they cannot be downloaded.
//!
//! The remote records carry no reliable origin flag. [`HeuristicHostClassifier`]
//! sniffs URL fields for known markers; treat its answer as a best guess, and
//! swap in another [`HostClassifier`] when better information is available.

use reqwest::Url;

use crate::model::MediaItem;

/// Decides whether an item's main asset is hosted by a third party.
pub trait HostClassifier: Send + Sync {
    /// Externally hosted assets are linked, never downloaded.
    fn is_external(&self, item: &MediaItem) -> bool;
}

const THIRD_PARTY_PLAYER_MARKER: &str = "tencentvideo";
const FLASH_MARKER: &str = ".swf";
const NATIVE_VIDEO_MARKER: &str = ".mp4";
const PLAYER_BASE: &str = "https://v.qq.com/txp/iframe/player.html";

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicHostClassifier;

impl HeuristicHostClassifier {
    /// Played through the third-party iframe player.
    ///
    /// No secondary URL, or a native `.mp4` address, means the origin serves
    /// it; otherwise the player marker decides.
    pub fn is_third_party_player(item: &MediaItem) -> bool {
        let url2 = item.url2.as_deref().unwrap_or("");
        let url3 = item.url3.as_deref().unwrap_or("");
        if url2.is_empty() || url3.contains(NATIVE_VIDEO_MARKER) {
            return false;
        }
        url3.contains(THIRD_PARTY_PLAYER_MARKER)
    }
}

impl HostClassifier for HeuristicHostClassifier {
    fn is_external(&self, item: &MediaItem) -> bool {
        if Self::is_third_party_player(item) {
            return true;
        }
        item.url3
            .as_deref()
            .is_some_and(|url3| url3.contains(FLASH_MARKER))
    }
}

/// Address to watch an item online: shared items link to their origin,
/// third-party items to the embedded player, everything else to its own URL.
pub fn player_url(item: &MediaItem) -> Option<String> {
    if HeuristicHostClassifier::is_third_party_player(item) {
        if let Some(vid) = item.video_id.as_deref().filter(|v| !v.is_empty()) {
            return third_party_player_url(vid);
        }
    }
    if item.source_type.as_deref() == Some("share") {
        if let Some(rt) = item.rt_url.as_deref().filter(|u| !u.is_empty()) {
            return Some(rt.to_string());
        }
    }
    item.url3
        .as_deref()
        .or(item.url.as_deref())
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

fn third_party_player_url(vid: &str) -> Option<String> {
    Url::parse_with_params(
        PLAYER_BASE,
        &[
            ("origin", "https://user.qzone.qq.com"),
            ("vid", vid),
            ("autoplay", "true"),
            ("volume", "1"),
            ("disableplugin", "IframeBottomOpenClientBar"),
            ("additionplugin", "IframeUiSearch"),
            ("platId", "qzone_feed"),
            ("show1080p", "true"),
            ("isDebugIframe", "false"),
        ],
    )
    .ok()
    .map(String::from)
}
