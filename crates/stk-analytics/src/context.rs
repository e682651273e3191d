//! Page context: attribution and browser metadata.
//!
//! The SDK core never touches the DOM. The host adapter implements
//! [`PageContext`] over `window`, `document` and `navigator`; every method
//! may return `None` when the corresponding global is missing.

use serde::Serialize;
use std::sync::{Arc, RwLock};
use url::Url;

/// Read-only view of the current document.
pub trait PageContext: Send + Sync {
    /// Full URL of the current document (`window.location.href`).
    fn url(&self) -> Option<String>;

    /// `document.referrer`; empty strings are treated as absent.
    fn referrer(&self) -> Option<String>;

    /// `document.title`.
    fn title(&self) -> Option<String>;

    /// Browser metadata read from `navigator`, `screen` and `Intl`.
    fn browser(&self) -> Option<BrowserContext>;
}

/// Browser metadata flattened into every event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserContext {
    pub user_agent: String,
    pub language: String,
    pub platform: String,
    pub screen_resolution: String,
    pub timezone: String,
    pub cookie_enabled: bool,
    pub online: bool,
}

impl BrowserContext {
    /// Screen resolution in the `"{width}x{height}"` form.
    pub fn screen(width: u32, height: u32) -> String {
        format!("{width}x{height}")
    }
}

/// Campaign and referrer metadata for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attribution {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landing_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landing_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_domain: Option<String>,
}

impl Attribution {
    /// Field/value pairs of the set fields, used when attribution is spread
    /// into promo events.
    pub(crate) fn to_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// Snapshot campaign, referrer and landing metadata from the current page.
///
/// Recomputed on every call so single-page navigation is reflected.
pub fn capture_attribution(page: &dyn PageContext) -> Attribution {
    let Some(url) = page.url().and_then(|raw| Url::parse(&raw).ok()) else {
        return Attribution::default();
    };

    let param = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };

    let landing_page = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_owned(),
    };

    let referrer = page.referrer().filter(|r| !r.is_empty());
    let referrer_domain = referrer
        .as_deref()
        .and_then(|r| Url::parse(r).ok())
        .and_then(|r| r.host_str().map(str::to_owned));

    Attribution {
        utm_source: param("utm_source"),
        utm_medium: param("utm_medium"),
        utm_campaign: param("utm_campaign"),
        utm_term: param("utm_term"),
        utm_content: param("utm_content"),
        landing_page: Some(landing_page),
        landing_domain: Some(url.host_str().unwrap_or_default().to_owned()),
        referrer,
        referrer_domain,
    }
}

/// Browser metadata for the current page; `None` when the host exposes
/// no `navigator`, which serializes as no fields at all.
pub fn capture_browser_context(page: &dyn PageContext) -> Option<BrowserContext> {
    page.browser()
}

/// Path of the current page, empty when unknown.
pub(crate) fn current_path(page: &dyn PageContext) -> String {
    page.url()
        .and_then(|raw| Url::parse(&raw).ok())
        .map(|url| url.path().to_owned())
        .unwrap_or_default()
}

/// A [`PageContext`] backed by plain values.
///
/// Useful for hosts that push page state instead of exposing live globals,
/// and for tests. Clones share state, so [`navigate`](Self::navigate) on one
/// clone is seen by an [`Analytics`](crate::Analytics) holding another.
#[derive(Debug, Clone, Default)]
pub struct StaticPage {
    state: Arc<RwLock<PageState>>,
}

#[derive(Debug, Clone, Default)]
struct PageState {
    url: Option<String>,
    referrer: Option<String>,
    title: Option<String>,
    browser: Option<BrowserContext>,
}

impl StaticPage {
    pub fn new(url: impl Into<String>) -> Self {
        let page = Self::default();
        page.navigate(url);
        page
    }

    pub fn with_referrer(self, referrer: impl Into<String>) -> Self {
        self.write().referrer = Some(referrer.into());
        self
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.write().title = Some(title.into());
        self
    }

    pub fn with_browser(self, browser: BrowserContext) -> Self {
        self.write().browser = Some(browser);
        self
    }

    /// Change the current URL, as a client-side router would.
    pub fn navigate(&self, url: impl Into<String>) {
        self.write().url = Some(url.into());
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PageState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PageState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl PageContext for StaticPage {
    fn url(&self) -> Option<String> {
        self.read().url.clone()
    }

    fn referrer(&self) -> Option<String> {
        self.read().referrer.clone()
    }

    fn title(&self) -> Option<String> {
        self.read().title.clone()
    }

    fn browser(&self) -> Option<BrowserContext> {
        self.read().browser.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribution_from_campaign_url() {
        let page = StaticPage::new(
            "https://shop.example.com/pricing?utm_source=news&utm_medium=email&utm_campaign=spring&ref=1",
        )
        .with_referrer("https://www.google.com/search?q=shop");

        let attribution = capture_attribution(&page);

        assert_eq!(attribution.utm_source.as_deref(), Some("news"));
        assert_eq!(attribution.utm_medium.as_deref(), Some("email"));
        assert_eq!(attribution.utm_campaign.as_deref(), Some("spring"));
        assert_eq!(attribution.utm_term, None);
        assert_eq!(attribution.utm_content, None);
        assert_eq!(
            attribution.landing_page.as_deref(),
            Some("/pricing?utm_source=news&utm_medium=email&utm_campaign=spring&ref=1")
        );
        assert_eq!(attribution.landing_domain.as_deref(), Some("shop.example.com"));
        assert_eq!(attribution.referrer_domain.as_deref(), Some("www.google.com"));
    }

    #[test]
    fn test_attribution_without_referrer() {
        let page = StaticPage::new("https://example.com/").with_referrer("");
        let attribution = capture_attribution(&page);

        assert_eq!(attribution.referrer, None);
        assert_eq!(attribution.referrer_domain, None);
        assert_eq!(attribution.landing_page.as_deref(), Some("/"));
    }

    #[test]
    fn test_unparseable_referrer_keeps_raw_value() {
        let page = StaticPage::new("https://example.com/").with_referrer("android-app");
        let attribution = capture_attribution(&page);

        assert_eq!(attribution.referrer.as_deref(), Some("android-app"));
        assert_eq!(attribution.referrer_domain, None);
    }

    #[test]
    fn test_attribution_follows_navigation() {
        let page = StaticPage::new("https://example.com/a?utm_source=x");
        assert_eq!(capture_attribution(&page).utm_source.as_deref(), Some("x"));

        page.navigate("https://example.com/b");
        let attribution = capture_attribution(&page);
        assert_eq!(attribution.utm_source, None);
        assert_eq!(attribution.landing_page.as_deref(), Some("/b"));
    }

    #[test]
    fn test_missing_location_yields_empty_object() {
        let attribution = capture_attribution(&StaticPage::default());
        assert_eq!(serde_json::to_value(&attribution).unwrap(), serde_json::json!({}));
        assert_eq!(current_path(&StaticPage::default()), "");
    }

    #[test]
    fn test_browser_context_camel_case() {
        let browser = BrowserContext {
            user_agent: "Mozilla/5.0".into(),
            language: "en-US".into(),
            platform: "MacIntel".into(),
            screen_resolution: BrowserContext::screen(1920, 1080),
            timezone: "Europe/Berlin".into(),
            cookie_enabled: true,
            online: true,
        };

        let json = serde_json::to_value(&browser).unwrap();
        assert_eq!(json["userAgent"], "Mozilla/5.0");
        assert_eq!(json["screenResolution"], "1920x1080");
        assert_eq!(json["cookieEnabled"], true);
        assert!(json.get("user_agent").is_none());
    }
}
