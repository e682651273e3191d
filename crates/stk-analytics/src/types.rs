//! Event types and serialization.

use crate::context::{Attribution, BrowserContext};
use serde::Serialize;
use serde_json::{Map, Value};

/// Whether the host application identified the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Authenticated,
    Anonymous,
}

/// The `data` object of an event.
#[derive(Debug, Clone, Serialize)]
pub struct EventData {
    pub event_category: String,
    pub event_label: Option<String>,
    pub value: Option<Value>,
    pub custom_parameters: Map<String, Value>,
    pub user_id: String,
    pub user_email: Option<String>,
    pub session_id: String,
    pub user_type: UserType,
    pub first_visit: String,
    pub visit_count: u64,
    pub page: String,
    pub page_title: String,
    pub page_load_time: f64,
    pub scroll_depth: i64,
    pub time_on_page: u64,
    pub attribution: Attribution,
    #[serde(flatten)]
    pub browser: Option<BrowserContext>,
    /// Caller-supplied fields that do not collide with any computed field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keys of [`EventData`] computed by the SDK, including flattened browser
/// fields. Free-form caller properties may not use them.
pub const COMPUTED_FIELDS: &[&str] = &[
    "event_category",
    "event_label",
    "value",
    "custom_parameters",
    "user_id",
    "user_email",
    "session_id",
    "user_type",
    "first_visit",
    "visit_count",
    "page",
    "page_title",
    "page_load_time",
    "scroll_depth",
    "time_on_page",
    "attribution",
    "userAgent",
    "language",
    "platform",
    "screenResolution",
    "timezone",
    "cookieEnabled",
    "online",
];

/// A queued event as sent on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerEvent {
    pub event_name: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub data: EventData,
    /// Tenant API key.
    pub service: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(email: Option<&str>) -> TrackerEvent {
        TrackerEvent {
            event_name: "signup".into(),
            user_id: "visitor-1".into(),
            user_email: email.map(String::from),
            data: EventData {
                event_category: "engagement".into(),
                event_label: None,
                value: None,
                custom_parameters: Map::new(),
                user_id: "visitor-1".into(),
                user_email: email.map(String::from),
                session_id: "session-1".into(),
                user_type: if email.is_some() {
                    UserType::Authenticated
                } else {
                    UserType::Anonymous
                },
                first_visit: "2024-01-28T00:00:00.000Z".into(),
                visit_count: 1,
                page: "/".into(),
                page_title: String::new(),
                page_load_time: 0.0,
                scroll_depth: 0,
                time_on_page: 0,
                attribution: Attribution::default(),
                browser: None,
                extra: Map::from_iter([("plan".to_string(), json!("pro"))]),
            },
            service: "key_1".into(),
        }
    }

    #[test]
    fn test_event_snake_case() {
        let json = serde_json::to_value(sample(None)).unwrap();

        assert_eq!(json["event_name"], "signup");
        assert_eq!(json["service"], "key_1");
        assert_eq!(json["data"]["session_id"], "session-1");
        assert_eq!(json["data"]["user_type"], "anonymous");
        assert!(json.get("eventName").is_none());
    }

    #[test]
    fn test_top_level_email_omitted_when_none() {
        let json = serde_json::to_value(sample(None)).unwrap();

        assert!(json.get("user_email").is_none());
        assert_eq!(json["data"]["user_email"], Value::Null);
    }

    #[test]
    fn test_authenticated_event() {
        let json = serde_json::to_value(sample(Some("a@b.com"))).unwrap();

        assert_eq!(json["user_email"], "a@b.com");
        assert_eq!(json["data"]["user_type"], "authenticated");
    }

    #[test]
    fn test_extras_and_browser_flatten_into_data() {
        let mut event = sample(None);
        event.data.browser = Some(BrowserContext {
            language: "en-US".into(),
            ..BrowserContext::default()
        });

        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["data"]["plan"], "pro");
        assert_eq!(json["data"]["language"], "en-US");
        assert!(json["data"].get("browser").is_none());
        assert!(json["data"].get("extra").is_none());
    }
}
