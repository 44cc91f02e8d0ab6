//! Records of a remote media collection and the identity rules used to compare them.
//!
//! A [`MediaItem`] is deserialised straight from the remote list payload. Only
//! the fields the backup engine reads are typed; everything else is kept in
//! [`MediaItem::extra`] so an export round-trips what the remote sent.
//!
//! Derived fields (`custom_*`) are attached in place by the download registrar
//! and are serialised only once they are set.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Ordered sequence of items; page-arrival order until the merger sorts it.
pub type Collection = Vec<MediaItem>;

/// Identity of an item under the configured [`IdentityKey`].
pub type ItemKey = String;

/// One page of the remote list after the envelope has been unwrapped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
    pub items: Vec<MediaItem>,
    /// Running total reported by the remote, if this page carried one.
    pub total: Option<u64>,
}

/// Which field(s) identify an item for de-duplication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKey {
    /// The resolved main-asset URL (`url`, then `video_url`, then `url3`).
    #[default]
    AssetUrl,
    /// A named record field, typed or carried in `extra`.
    Field(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub vid: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub url1: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub url2: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub url3: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub pre: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub preview_img: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub play_url: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub rt_url: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Seconds since the Unix epoch.
    #[serde(
        rename = "uploadTime",
        default,
        deserialize_with = "de_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub upload_time: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_string", skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_filepath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_pre_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_pre_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_pre_filepath: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// Carried over unchanged from the previous snapshot during this run.
    #[serde(skip)]
    pub backed_up: bool,
}

fn first_non_empty<'a>(candidates: &[&'a Option<String>]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|s| !s.is_empty())
}

impl MediaItem {
    /// Main asset URL: `url`, then `video_url`, then `url3`.
    pub fn asset_url(&self) -> Option<&str> {
        first_non_empty(&[&self.url, &self.video_url, &self.url3])
    }

    /// Preview image URL: `pre`, then `url1`, then `preview_img`.
    pub fn preview_url(&self) -> Option<&str> {
        first_non_empty(&[&self.pre, &self.url1, &self.preview_img])
    }

    /// Description line: `desc`, then `name`, then the upload time rendered in `offset`.
    pub fn description(&self, offset: FixedOffset) -> String {
        if let Some(text) = first_non_empty(&[&self.desc, &self.name]) {
            return text.to_string();
        }
        self.upload_time
            .and_then(|secs| format_time(secs, offset))
            .unwrap_or_default()
    }

    /// String value of a typed or flattened field.
    pub fn field_str(&self, field: &str) -> Option<String> {
        let typed = match field {
            "vid" => &self.vid,
            "video_id" => &self.video_id,
            "url" => &self.url,
            "url1" => &self.url1,
            "url2" => &self.url2,
            "url3" => &self.url3,
            "video_url" => &self.video_url,
            "pre" => &self.pre,
            "preview_img" => &self.preview_img,
            "play_url" => &self.play_url,
            "rt_url" => &self.rt_url,
            "desc" => &self.desc,
            "name" => &self.name,
            "source_type" => &self.source_type,
            "uploadTime" => return self.upload_time.map(|t| t.to_string()),
            _ => {
                return match self.extra.get(field)? {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }
            }
        };
        typed.as_deref().filter(|s| !s.is_empty()).map(str::to_string)
    }

    /// Epoch seconds held in `field` (`uploadTime` or a flattened numeric field).
    pub fn timestamp(&self, field: &str) -> Option<i64> {
        if field == "uploadTime" {
            return self.upload_time;
        }
        self.extra.get(field).and_then(timestamp_from_value)
    }

    /// Identity key; `None` when the item carries nothing to identify it by.
    pub fn key(&self, identity: &IdentityKey) -> Option<ItemKey> {
        match identity {
            IdentityKey::AssetUrl => self.asset_url().map(str::to_string),
            IdentityKey::Field(field) => self.field_str(field),
        }
    }

    /// Fingerprint of the fields the remote sent, ignoring derived `custom_*` values.
    /// Two records compare equal here only when the remote sent the same data.
    pub fn record_key(&self) -> Option<ItemKey> {
        let remote = MediaItem {
            custom_url: None,
            custom_filename: None,
            custom_filepath: None,
            custom_pre_url: None,
            custom_pre_filename: None,
            custom_pre_filepath: None,
            backed_up: false,
            ..self.clone()
        };
        serde_json::to_string(&remote)
            .ok()
            .map(|record| format!("record:{record}"))
    }

    /// Identity key, or the record fingerprint when the item has no key.
    pub fn dedup_key(&self, identity: &IdentityKey) -> Option<ItemKey> {
        self.key(identity).or_else(|| self.record_key())
    }
}

/// Epoch seconds rendered as `YYYY-MM-DD HH:MM:SS` in the given zone.
pub fn format_time(secs: i64, offset: FixedOffset) -> Option<String> {
    local_time(secs, offset).map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

pub fn local_time(secs: i64, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::from_timestamp(secs, 0).map(|t| t.with_timezone(&offset))
}

const MILLIS_THRESHOLD: u64 = 1_000_000_000_000;

fn normalize_epoch(value: i64) -> i64 {
    if value.unsigned_abs() >= MILLIS_THRESHOLD {
        value / 1000
    } else {
        value
    }
}

fn timestamp_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(normalize_epoch),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                return Some(normalize_epoch(n));
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|t| t.and_utc().timestamp())
        }
        _ => None,
    }
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(timestamp_from_value))
}

// The remote is loose about scalar types: ids arrive as numbers or strings.
fn de_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc8() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn deserialises_loose_remote_record() {
        let item: MediaItem = serde_json::from_value(json!({
            "vid": 12345,
            "url": "",
            "video_url": "https://v.example.com/a.mp4",
            "uploadTime": "1600000000",
            "likes": 3
        }))
        .unwrap();

        assert_eq!(item.vid.as_deref(), Some("12345"));
        assert_eq!(item.asset_url(), Some("https://v.example.com/a.mp4"));
        assert_eq!(item.upload_time, Some(1_600_000_000));
        assert_eq!(item.extra.get("likes"), Some(&json!(3)));
        assert!(!item.backed_up);
    }

    #[test]
    fn upload_time_accepts_millis_and_datetime_strings() {
        let millis: MediaItem = serde_json::from_value(json!({ "uploadTime": 1_600_000_000_123i64 })).unwrap();
        assert_eq!(millis.upload_time, Some(1_600_000_000));

        let text: MediaItem =
            serde_json::from_value(json!({ "uploadTime": "2020-09-13 12:26:40" })).unwrap();
        assert_eq!(text.upload_time, Some(1_600_000_000));

        let junk: MediaItem = serde_json::from_value(json!({ "uploadTime": "yesterday" })).unwrap();
        assert_eq!(junk.upload_time, None);
    }

    #[test]
    fn upload_time_out_of_range_does_not_panic() {
        let huge_negative: MediaItem = serde_json::from_value(json!({ "uploadTime": -1e30 })).unwrap();
        assert_eq!(huge_negative.upload_time, Some(i64::MIN / 1000));

        let huge_positive: MediaItem = serde_json::from_value(json!({ "uploadTime": 1e30 })).unwrap();
        assert_eq!(huge_positive.upload_time, Some(i64::MAX / 1000));

        let min_text: MediaItem =
            serde_json::from_value(json!({ "uploadTime": i64::MIN.to_string() })).unwrap();
        assert_eq!(min_text.upload_time, Some(i64::MIN / 1000));
        assert_eq!(min_text.description(utc8()), "");
    }

    #[test]
    fn description_falls_back_to_formatted_upload_time() {
        let item = MediaItem {
            upload_time: Some(1_600_000_000),
            ..Default::default()
        };
        assert_eq!(item.description(utc8()), "2020-09-13 20:26:40");

        let named = MediaItem {
            name: Some("holiday".into()),
            ..item
        };
        assert_eq!(named.description(utc8()), "holiday");
    }

    #[test]
    fn key_by_field_reads_flattened_values() {
        let item: MediaItem = serde_json::from_value(json!({ "lloc": 77 })).unwrap();
        assert_eq!(item.key(&IdentityKey::Field("lloc".into())), Some("77".to_string()));
        assert_eq!(item.key(&IdentityKey::AssetUrl), None);
    }

    #[test]
    fn derived_fields_are_serialised_only_when_set() {
        let mut item = MediaItem {
            url: Some("https://v.example.com/a.mp4".into()),
            ..Default::default()
        };
        let plain = serde_json::to_value(&item).unwrap();
        assert!(plain.get("custom_filename").is_none());

        item.custom_filename = Some("a.mp4".into());
        item.backed_up = true;
        let derived = serde_json::to_value(&item).unwrap();
        assert_eq!(derived["custom_filename"], json!("a.mp4"));
        assert!(derived.get("backed_up").is_none());
    }

    #[test]
    fn record_key_ignores_derived_fields() {
        let remote: MediaItem = serde_json::from_value(json!({ "desc": "no asset", "uploadTime": 9 })).unwrap();
        let mut registered = remote.clone();
        registered.custom_pre_filename = Some("p.jpeg".into());
        registered.backed_up = true;

        assert!(remote.key(&IdentityKey::AssetUrl).is_none());
        assert_eq!(remote.record_key(), registered.record_key());
        assert_eq!(remote.dedup_key(&IdentityKey::AssetUrl), remote.record_key());

        let other = MediaItem {
            desc: Some("another".into()),
            ..remote.clone()
        };
        assert_ne!(remote.record_key(), other.record_key());
    }
}
