//! Event properties and envelope assembly.

use crate::context::{Attribution, BrowserContext};
use crate::identity::VisitStats;
use crate::types::{EventData, TrackerEvent, UserType, COMPUTED_FIELDS};
use serde_json::{Map, Value};

/// Default category for events that do not set one.
pub const DEFAULT_CATEGORY: &str = "engagement";

/// Caller-supplied part of an event.
///
/// Only the typed setters can override values the SDK computes. Free-form
/// [`property`](Self::property) keys that collide with a computed field are
/// dropped when the event is built, so identity and session fields always
/// reflect the SDK's own state.
///
/// # Example
///
/// ```rust
/// use stk_analytics::EventProps;
///
/// let props = EventProps::new()
///     .category("checkout")
///     .label("annual plan")
///     .value(49)
///     .custom("coupon", "SPRING")
///     .property("plan_id", "pro_annual");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventProps {
    category: Option<String>,
    label: Option<String>,
    value: Option<Value>,
    page: Option<String>,
    page_title: Option<String>,
    time_on_page: Option<u64>,
    scroll_depth: Option<i64>,
    page_load_time: Option<f64>,
    custom: Map<String, Value>,
    properties: Map<String, Value>,
}

impl EventProps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the event category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the event label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the event value.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Override the page path.
    pub fn page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    /// Override the page title.
    pub fn page_title(mut self, title: impl Into<String>) -> Self {
        self.page_title = Some(title.into());
        self
    }

    /// Time on page in milliseconds.
    pub fn time_on_page(mut self, ms: u64) -> Self {
        self.time_on_page = Some(ms);
        self
    }

    /// Scroll depth in percent.
    pub fn scroll_depth(mut self, percent: i64) -> Self {
        self.scroll_depth = Some(percent);
        self
    }

    /// Page load time in milliseconds.
    pub fn page_load_time(mut self, ms: f64) -> Self {
        self.page_load_time = Some(ms);
        self
    }

    /// Add an entry to `custom_parameters`.
    pub fn custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Add a top-level field to the event data.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    // Wrapper defaults never replace what the caller set.

    pub(crate) fn default_category(mut self, category: &str) -> Self {
        self.category.get_or_insert_with(|| category.to_owned());
        self
    }

    pub(crate) fn default_label(mut self, label: Option<&str>) -> Self {
        if self.label.is_none() {
            self.label = label.map(str::to_owned);
        }
        self
    }

    pub(crate) fn default_value(mut self, value: Value) -> Self {
        self.value.get_or_insert(value);
        self
    }

    pub(crate) fn default_page(mut self, page: &str) -> Self {
        self.page.get_or_insert_with(|| page.to_owned());
        self
    }

    pub(crate) fn default_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties
            .entry(key.to_owned())
            .or_insert_with(|| value.into());
        self
    }

    /// Spread fields over the caller's properties, replacing duplicates.
    pub(crate) fn spread(mut self, fields: Map<String, Value>) -> Self {
        self.properties.extend(fields);
        self
    }
}

/// Values the SDK computes for every event at enqueue time.
#[derive(Debug, Clone)]
pub(crate) struct Computed {
    pub visitor_id: String,
    pub session_id: String,
    pub user_email: Option<String>,
    pub visit: VisitStats,
    pub page: String,
    pub page_title: String,
    pub page_load_time: f64,
    pub scroll_depth: i64,
    pub attribution: Attribution,
    pub browser: Option<BrowserContext>,
    pub service: String,
}

/// Builder for a complete event envelope.
#[derive(Debug)]
pub(crate) struct EventBuilder {
    event_name: String,
    props: EventProps,
}

impl EventBuilder {
    pub(crate) fn new(event_name: impl Into<String>, props: EventProps) -> Self {
        Self {
            event_name: event_name.into(),
            props,
        }
    }

    /// Merge caller props over computed values.
    pub(crate) fn build(self, computed: Computed, debug: bool) -> TrackerEvent {
        let props = self.props;

        let mut extra = props.properties;
        extra.retain(|key, _| {
            let reserved = COMPUTED_FIELDS.contains(&key.as_str());
            if reserved && debug {
                tracing::warn!(
                    event_name = %self.event_name,
                    field = %key,
                    "dropping property that shadows a computed field"
                );
            }
            !reserved
        });

        let user_type = if computed.user_email.is_some() {
            UserType::Authenticated
        } else {
            UserType::Anonymous
        };

        let data = EventData {
            event_category: props
                .category
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_owned()),
            event_label: props.label,
            value: props.value,
            custom_parameters: props.custom,
            user_id: computed.visitor_id.clone(),
            user_email: computed.user_email.clone(),
            session_id: computed.session_id,
            user_type,
            first_visit: computed.visit.first_visit,
            visit_count: computed.visit.visit_count,
            page: props.page.unwrap_or(computed.page),
            page_title: props.page_title.unwrap_or(computed.page_title),
            page_load_time: props.page_load_time.unwrap_or(computed.page_load_time),
            scroll_depth: props.scroll_depth.unwrap_or(computed.scroll_depth),
            time_on_page: props.time_on_page.unwrap_or(0),
            attribution: computed.attribution,
            browser: computed.browser,
            extra,
        };

        TrackerEvent {
            event_name: self.event_name,
            user_id: computed.visitor_id,
            user_email: computed.user_email,
            data,
            service: computed.service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn computed(email: Option<&str>) -> Computed {
        Computed {
            visitor_id: "visitor-1".into(),
            session_id: "session-1".into(),
            user_email: email.map(String::from),
            visit: VisitStats {
                first_visit: "2024-01-28T00:00:00.000Z".into(),
                visit_count: 3,
            },
            page: "/pricing".into(),
            page_title: "Pricing".into(),
            page_load_time: 812.5,
            scroll_depth: 40,
            attribution: Attribution::default(),
            browser: None,
            service: "key_1".into(),
        }
    }

    #[test]
    fn test_defaults_from_computed_values() {
        let event = EventBuilder::new("signup", EventProps::new()).build(computed(None), false);

        assert_eq!(event.event_name, "signup");
        assert_eq!(event.user_id, "visitor-1");
        assert_eq!(event.service, "key_1");
        assert_eq!(event.data.event_category, DEFAULT_CATEGORY);
        assert_eq!(event.data.session_id, "session-1");
        assert_eq!(event.data.user_type, UserType::Anonymous);
        assert_eq!(event.data.visit_count, 3);
        assert_eq!(event.data.page, "/pricing");
        assert_eq!(event.data.scroll_depth, 40);
        assert_eq!(event.data.time_on_page, 0);
    }

    #[test]
    fn test_typed_overrides_win() {
        let props = EventProps::new()
            .category("promo")
            .label("banner")
            .value(5)
            .page("/other")
            .time_on_page(1500)
            .scroll_depth(90)
            .custom("x", 10);

        let event = EventBuilder::new("promo_click", props).build(computed(None), false);

        assert_eq!(event.data.event_category, "promo");
        assert_eq!(event.data.event_label.as_deref(), Some("banner"));
        assert_eq!(event.data.value, Some(json!(5)));
        assert_eq!(event.data.page, "/other");
        assert_eq!(event.data.time_on_page, 1500);
        assert_eq!(event.data.scroll_depth, 90);
        assert_eq!(event.data.custom_parameters.get("x"), Some(&json!(10)));
    }

    #[test]
    fn test_identity_fields_cannot_be_overridden() {
        let props = EventProps::new()
            .property("session_id", "forged")
            .property("user_id", "forged")
            .property("user_type", "authenticated")
            .property("visit_count", 999)
            .property("userAgent", "forged")
            .property("plan", "pro");

        let event = EventBuilder::new("signup", props).build(computed(None), true);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["data"]["session_id"], "session-1");
        assert_eq!(json["data"]["user_id"], "visitor-1");
        assert_eq!(json["data"]["user_type"], "anonymous");
        assert_eq!(json["data"]["visit_count"], 3);
        assert!(json["data"].get("userAgent").is_none());
        assert_eq!(json["data"]["plan"], "pro");
    }

    #[test]
    fn test_email_marks_authenticated() {
        let event =
            EventBuilder::new("signup", EventProps::new()).build(computed(Some("a@b.com")), false);

        assert_eq!(event.user_email.as_deref(), Some("a@b.com"));
        assert_eq!(event.data.user_email.as_deref(), Some("a@b.com"));
        assert_eq!(event.data.user_type, UserType::Authenticated);
    }

    #[test]
    fn test_wrapper_defaults_yield_to_caller() {
        let props = EventProps::new()
            .category("custom")
            .property("action", "mine")
            .default_category("interaction")
            .default_property("action", "theirs")
            .default_property("target", "button")
            .default_label(Some("ignored"))
            .default_page("/ignored");

        assert_eq!(props.category.as_deref(), Some("custom"));
        assert_eq!(props.properties.get("action"), Some(&json!("mine")));
        assert_eq!(props.properties.get("target"), Some(&json!("button")));
        assert_eq!(props.label.as_deref(), Some("ignored"));
        assert_eq!(props.page.as_deref(), Some("/ignored"));
    }

    #[test]
    fn test_spread_replaces_duplicates() {
        let props = EventProps::new()
            .property("utm_source", "caller")
            .spread(Map::from_iter([("utm_source".to_string(), json!("url"))]));

        assert_eq!(props.properties.get("utm_source"), Some(&json!("url")));
    }
}
