//! SDK configuration and the script-tag embedding contract.

use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Default flush interval.
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(5000);

/// Substring identifying the script tag that loaded the SDK.
pub const LOADER_SCRIPT_MARKER: &str = "stk-analytics";

/// SDK configuration.
///
/// Set once by [`Analytics::init`](crate::Analytics::init) and only changed
/// afterwards through [`Analytics::update_config`](crate::Analytics::update_config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub(crate) api_url: String,
    pub(crate) api_key: String,
    pub(crate) batch_interval: Duration,
    pub(crate) debug: bool,
    pub(crate) auto_track_page_views: bool,
    pub(crate) auto_track_clicks: bool,
    pub(crate) auto_track_scroll: bool,
    pub(crate) auto_track_performance: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            batch_interval: DEFAULT_BATCH_INTERVAL,
            debug: false,
            auto_track_page_views: true,
            auto_track_clicks: true,
            auto_track_scroll: true,
            auto_track_performance: true,
        }
    }
}

impl Config {
    /// Get the ingest endpoint.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Get the tenant API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the flush interval.
    pub fn batch_interval(&self) -> Duration {
        self.batch_interval
    }

    /// Whether debug mode is on. Debug mode never touches the network.
    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn auto_track_page_views(&self) -> bool {
        self.auto_track_page_views
    }

    pub fn auto_track_clicks(&self) -> bool {
        self.auto_track_clicks
    }

    pub fn auto_track_scroll(&self) -> bool {
        self.auto_track_scroll
    }

    pub fn auto_track_performance(&self) -> bool {
        self.auto_track_performance
    }

    /// Apply every option that is set, leaving the rest untouched.
    pub(crate) fn merge(&mut self, options: &InitOptions) {
        if let Some(url) = &options.api_url {
            self.api_url = url.clone();
        }
        if let Some(key) = &options.api_key {
            self.api_key = key.clone();
        }
        if let Some(interval) = options.batch_interval {
            self.batch_interval = interval;
        }
        if let Some(debug) = options.debug {
            self.debug = debug;
        }
        if let Some(v) = options.auto_track_page_views {
            self.auto_track_page_views = v;
        }
        if let Some(v) = options.auto_track_clicks {
            self.auto_track_clicks = v;
        }
        if let Some(v) = options.auto_track_scroll {
            self.auto_track_scroll = v;
        }
        if let Some(v) = options.auto_track_performance {
            self.auto_track_performance = v;
        }
    }

    /// Validate the merged values and normalise the endpoint.
    pub(crate) fn validate(mut self) -> Result<Config, crate::Error> {
        if self.api_key.trim().is_empty() {
            return Err(crate::Error::Config(
                "API key is required and cannot be empty".into(),
            ));
        }
        if self.api_url.trim().is_empty() {
            return Err(crate::Error::Config(
                "API URL is required and cannot be empty".into(),
            ));
        }
        if self.batch_interval.is_zero() {
            return Err(crate::Error::Config(
                "batch interval must be greater than zero".into(),
            ));
        }

        self.api_url = endpoint_with_key(&self.api_url, &self.api_key)?;
        Ok(self)
    }
}

/// Append `apiKey` to the endpoint unless it already names a tenant through
/// `service` or `apiKey`.
fn endpoint_with_key(api_url: &str, api_key: &str) -> Result<String, crate::Error> {
    let mut url = Url::parse(api_url.trim())
        .map_err(|e| crate::Error::Config(format!("invalid API URL {api_url:?}: {e}")))?;

    let has_tenant = url
        .query_pairs()
        .any(|(name, _)| name == "service" || name == "apiKey");
    if !has_tenant {
        url.query_pairs_mut().append_pair("apiKey", api_key);
    }

    Ok(url.into())
}

/// Options passed to [`Analytics::init`](crate::Analytics::init).
///
/// Every field is optional; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    api_url: Option<String>,
    api_key: Option<String>,
    batch_interval: Option<Duration>,
    debug: Option<bool>,
    auto_track_page_views: Option<bool>,
    auto_track_clicks: Option<bool>,
    auto_track_scroll: Option<bool>,
    auto_track_performance: Option<bool>,
}

impl InitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ingest endpoint.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Set the tenant API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the flush interval.
    pub fn batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = Some(interval);
        self
    }

    /// Enable or disable debug mode.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn auto_track_page_views(mut self, enabled: bool) -> Self {
        self.auto_track_page_views = Some(enabled);
        self
    }

    pub fn auto_track_clicks(mut self, enabled: bool) -> Self {
        self.auto_track_clicks = Some(enabled);
        self
    }

    pub fn auto_track_scroll(mut self, enabled: bool) -> Self {
        self.auto_track_scroll = Some(enabled);
        self
    }

    pub fn auto_track_performance(mut self, enabled: bool) -> Self {
        self.auto_track_performance = Some(enabled);
        self
    }

    /// Read options from the `data-*` attributes of the loader script tag.
    ///
    /// Returns `None` when `data-api-key` is missing or blank, in which case
    /// the SDK must not initialize at all.
    pub fn from_script_attributes(attributes: &HashMap<String, String>) -> Option<Self> {
        let api_key = attributes.get("data-api-key")?;
        if api_key.trim().is_empty() {
            tracing::error!("data-api-key attribute is required and cannot be empty");
            return None;
        }

        let mut options = InitOptions::new().api_key(api_key.as_str());

        if let Some(url) = attributes.get("data-api-url").filter(|u| !u.is_empty()) {
            options = options.api_url(url.as_str());
        }

        if let Some(raw) = attributes.get("data-batch-interval") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => options = options.batch_interval(Duration::from_millis(ms)),
                _ => tracing::warn!(value = %raw, "ignoring invalid data-batch-interval"),
            }
        }

        if let Some(debug) = attributes.get("data-debug").filter(|d| !d.is_empty()) {
            options = options.debug(debug.eq_ignore_ascii_case("true"));
        }

        if attributes.contains_key("data-disable-page-views") {
            options = options.auto_track_page_views(false);
        }
        if attributes.contains_key("data-disable-clicks") {
            options = options.auto_track_clicks(false);
        }
        if attributes.contains_key("data-disable-scroll") {
            options = options.auto_track_scroll(false);
        }

        Some(options)
    }
}

/// A `<script>` element as seen by the host adapter.
#[derive(Debug, Clone, Default)]
pub struct ScriptTag {
    pub src: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl ScriptTag {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            attributes: HashMap::new(),
        }
    }

    /// Add an attribute.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Find the script tag that loaded the SDK: the first one whose `src`
/// mentions the SDK and that carries a `data-api-key` attribute.
pub fn find_loader_script(scripts: &[ScriptTag]) -> Option<&ScriptTag> {
    scripts.iter().find(|script| {
        script
            .src
            .as_deref()
            .is_some_and(|src| src.contains(LOADER_SCRIPT_MARKER))
            && script.attributes.contains_key("data-api-key")
    })
}
