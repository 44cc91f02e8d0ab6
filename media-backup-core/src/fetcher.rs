//! Page fetching: transport over HTTP and unwrapping of the callback envelope.
//!
//! The remote list endpoint answers with JSON wrapped in a JavaScript call,
//! e.g. `shine0_Callback({"code":0,"data":{"total":2,"Videos":[...]}});`.
//! [`PageFetcher`] strips that wrapper, parses what is left and pulls out the
//! item array and the running total. A body that does not parse is treated as
//! an empty payload so the run moves on.

use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::PayloadShape;
use crate::contract::PageSource;
use crate::error::{BackupError, Result};
use crate::model::{MediaItem, PageResult};

/// Turns raw page bodies from a [`PageSource`] into [`PageResult`]s.
pub struct PageFetcher<'a> {
    source: &'a dyn PageSource,
    shape: PayloadShape,
    prefix: Regex,
    suffix: Regex,
}

impl<'a> PageFetcher<'a> {
    pub fn new(source: &'a dyn PageSource, shape: PayloadShape) -> Result<Self> {
        let prefix = Regex::new(&format!(r"^\s*{}\s*\(", regex::escape(&shape.callback)))
            .map_err(|e| BackupError::Config(format!("invalid callback name: {e}")))?;
        let suffix = Regex::new(r"\)\s*;?\s*$")
            .map_err(|e| BackupError::Config(format!("invalid envelope suffix: {e}")))?;
        Ok(Self {
            source,
            shape,
            prefix,
            suffix,
        })
    }

    /// Fetch and unwrap one page. Only transport failures are returned as errors.
    pub async fn fetch(&self, page_index: u32) -> Result<PageResult> {
        let body = self.source.fetch_page(page_index).await?;
        Ok(self.parse(&body))
    }

    /// Unwrap an envelope. Malformed bodies and items are logged and skipped.
    pub fn parse(&self, body: &str) -> PageResult {
        let payload = match serde_json::from_str::<Value>(&self.unwrap_envelope(body)) {
            Ok(value) => value,
            Err(e) => {
                let err = BackupError::Decode(e.to_string());
                warn!(error = %err, "Page payload is not valid JSON, treating as empty");
                Value::Object(Default::default())
            }
        };

        let data = payload.get(&self.shape.data_key);
        let total = data
            .and_then(|d| d.get(&self.shape.total_key))
            .and_then(|t| t.as_u64().or_else(|| t.as_str()?.trim().parse().ok()));

        let raw_items = data
            .and_then(|d| d.get(&self.shape.items_key))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut items = Vec::with_capacity(raw_items.len());
        for (position, raw) in raw_items.into_iter().enumerate() {
            match serde_json::from_value::<MediaItem>(raw) {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!(position, error = %e, "Skipping item that failed to decode");
                }
            }
        }

        debug!(items = items.len(), ?total, "Parsed page payload");
        PageResult { items, total }
    }

    fn unwrap_envelope<'b>(&self, body: &'b str) -> std::borrow::Cow<'b, str> {
        if !self.prefix.is_match(body) {
            return std::borrow::Cow::Borrowed(body.trim());
        }
        let stripped = self.prefix.replace(body, "");
        let stripped = self.suffix.replace(&stripped, "").into_owned();
        std::borrow::Cow::Owned(stripped)
    }
}

/// [`PageSource`] over HTTP.
///
/// The list URL is a template; `{start}`, `{count}` and `{page}` are replaced
/// with the first item offset, the page size and the zero-based page index.
pub struct HttpPageSource {
    client: Client,
    url_template: String,
    page_size: u32,
}

impl HttpPageSource {
    pub fn new(
        url_template: impl Into<String>,
        page_size: u32,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| BackupError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url_template: url_template.into(),
            page_size,
        })
    }

    pub fn page_url(&self, page_index: u32) -> String {
        let start = u64::from(page_index) * u64::from(self.page_size);
        self.url_template
            .replace("{start}", &start.to_string())
            .replace("{count}", &self.page_size.to_string())
            .replace("{page}", &page_index.to_string())
    }
}

#[async_trait::async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, page_index: u32) -> Result<String> {
        let url = self.page_url(page_index);
        let network = |message: String| BackupError::Network {
            page_index,
            message,
        };

        info!(url = %url, page = page_index + 1, "Fetching list page");
        let resp = self.client.get(&url).send().await.map_err(|e| {
            error!(error = ?e, url = %url, "Page request failed");
            network(e.to_string())
        })?;

        let status = resp.status();
        if !status.is_success() {
            error!(status = %status, url = %url, "Remote returned error for page");
            return Err(network(format!("HTTP {status}")));
        }

        resp.text().await.map_err(|e| {
            error!(error = ?e, url = %url, "Failed to read page body");
            network(e.to_string())
        })
    }
}
