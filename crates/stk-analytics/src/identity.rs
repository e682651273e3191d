//! Visitor, session and user identity.
//!
//! Identifiers are resolved once at init from storage and written back when
//! possible. When storage is unavailable they are generated fresh and live
//! only as long as the [`Analytics`](crate::Analytics) value.

use crate::storage::BestEffort;
use chrono::{DateTime, Local, SecondsFormat, Utc};
use std::sync::{Mutex, OnceLock};
use uuid::Uuid;

/// Storage keys.
pub mod keys {
    pub const SESSION_ID: &str = "analytics_session_id";
    pub const VISITOR_ID: &str = "analytics_user_id";
    pub const USER_EMAIL: &str = "userEmail";
    pub const FIRST_VISIT: &str = "analytics_first_visit";
    pub const VISIT_COUNT: &str = "analytics_visit_count";
    pub const UNIQUE_VISITOR_SESSION: &str = "analytics_unique_visitor_session";
    pub const UNIQUE_VISITOR_DAY: &str = "analytics_unique_visitor_day";
}

/// Fresh random identifier in UUIDv4 form.
pub(crate) fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Calendar-day marker used for daily unique visitors, e.g. `Tue Mar 05 2024`.
pub(crate) fn day_marker(now: DateTime<Local>) -> String {
    now.format("%a %b %d %Y").to_string()
}

#[derive(Debug, Clone)]
struct Ids {
    session_id: String,
    visitor_id: String,
}

/// Visit bookkeeping attached to each event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VisitStats {
    pub first_visit: String,
    pub visit_count: u64,
}

pub(crate) struct SessionManager {
    local: BestEffort,
    session: BestEffort,
    ids: OnceLock<Ids>,
    user_email: Mutex<Option<String>>,
}

impl SessionManager {
    pub(crate) fn new(local: BestEffort, session: BestEffort) -> Self {
        Self {
            local,
            session,
            ids: OnceLock::new(),
            user_email: Mutex::new(None),
        }
    }

    /// Resolve both identifiers. Only the first call has an effect.
    pub(crate) fn resolve(&self, debug: bool) {
        self.ids.get_or_init(|| {
            let session_id = self.resolve_session_id(debug);
            let visitor_id = self.resolve_visitor_id(debug);
            Ids {
                session_id,
                visitor_id,
            }
        });
    }

    fn resolve_session_id(&self, debug: bool) -> String {
        if !self.session.is_available() {
            return generate_id();
        }
        let id = self
            .session
            .get(keys::SESSION_ID)
            .unwrap_or_else(generate_id);
        self.session.set(keys::SESSION_ID, &id, debug);
        id
    }

    fn resolve_visitor_id(&self, debug: bool) -> String {
        if !self.local.is_available() {
            return generate_id();
        }
        let id = self.local.get(keys::VISITOR_ID).unwrap_or_else(generate_id);
        self.local.set(keys::VISITOR_ID, &id, debug);

        *self.email_slot() = self.local.get(keys::USER_EMAIL);
        id
    }

    fn email_slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.user_email.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Session id, empty until [`resolve`](Self::resolve) has run.
    pub(crate) fn session_id(&self) -> &str {
        self.ids.get().map_or("", |ids| ids.session_id.as_str())
    }

    /// Visitor id, empty until [`resolve`](Self::resolve) has run.
    pub(crate) fn visitor_id(&self) -> &str {
        self.ids.get().map_or("", |ids| ids.visitor_id.as_str())
    }

    pub(crate) fn user_email(&self) -> Option<String> {
        self.email_slot().clone()
    }

    pub(crate) fn set_user_email(&self, email: &str, debug: bool) {
        *self.email_slot() = Some(email.to_owned());
        if self.local.is_available() {
            self.local.set(keys::USER_EMAIL, email, debug);
        }
    }

    pub(crate) fn clear_user_email(&self, debug: bool) {
        *self.email_slot() = None;
        if self.local.is_available() {
            self.local.remove(keys::USER_EMAIL, debug);
        }
    }

    /// Bump the persisted visit counter and seed the first-visit timestamp.
    ///
    /// Runs for every queued event, not only page views.
    pub(crate) fn record_visit(&self, now: DateTime<Utc>, debug: bool) -> VisitStats {
        let stored_first = self.local.get(keys::FIRST_VISIT);
        let first_visit = stored_first
            .clone()
            .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Millis, true));
        let visit_count = self
            .local
            .get(keys::VISIT_COUNT)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(0)
            + 1;

        if self.local.is_available() {
            self.local
                .set(keys::VISIT_COUNT, &visit_count.to_string(), debug);
            if stored_first.is_none() {
                self.local.set(keys::FIRST_VISIT, &first_visit, debug);
            }
        }

        VisitStats {
            first_visit,
            visit_count,
        }
    }

    /// Mark the current session as seen. Returns `true` the first time for
    /// a given session id; always `false` without session storage.
    pub(crate) fn claim_session_marker(&self, debug: bool) -> bool {
        if !self.session.is_available() {
            return false;
        }
        let current = self.session_id();
        if self.session.get(keys::UNIQUE_VISITOR_SESSION).as_deref() == Some(current) {
            return false;
        }
        self.session.set(keys::UNIQUE_VISITOR_SESSION, current, debug);
        true
    }

    /// Mark `day` as seen. Returns `true` the first time for a given day;
    /// always `false` without persistent storage.
    pub(crate) fn claim_daily_marker(&self, day: &str, debug: bool) -> bool {
        if !self.local.is_available() {
            return false;
        }
        if self.local.get(keys::UNIQUE_VISITOR_DAY).as_deref() == Some(day) {
            return false;
        }
        self.local.set(keys::UNIQUE_VISITOR_DAY, day, debug);
        true
    }
}
