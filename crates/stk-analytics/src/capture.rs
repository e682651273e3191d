//! Automatic capture of host-page activity.
//!
//! The host adapter owns the DOM listeners and forwards each browser event
//! to the matching `on_*` method. Until [`Analytics::init`] succeeds every
//! handler is a no-op, which is the "listeners not attached" state.

use crate::builders::EventProps;
use crate::client::Analytics;
use serde_json::json;
use std::collections::HashMap;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::debug;

/// Attribute marking elements whose clicks are tracked.
pub const TRACKING_ATTRIBUTE: &str = "data-click";

/// Navigation timing read from the Performance API on `load`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NavigationTiming {
    /// Milliseconds from navigation start to the `load` event.
    pub load_time: f64,
    /// `domContentLoadedEventEnd` of the navigation entry, if any.
    pub dom_content_loaded: Option<f64>,
}

/// Scroll geometry at the time of a `scroll` event.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub document_height: f64,
    pub window_height: f64,
}

impl ScrollMetrics {
    /// Scrolled share of the scrollable height, in whole percent.
    /// `None` when the page cannot scroll.
    pub fn percent(&self) -> Option<i64> {
        let percent = (self.scroll_top / (self.document_height - self.window_height)) * 100.0;
        percent.is_finite().then(|| percent.round() as i64)
    }
}

/// One element on a click's propagation path.
#[derive(Debug, Clone, Default)]
pub struct ElementInfo {
    pub tag_name: String,
    pub text: String,
    /// Resolved `href` for anchors.
    pub href: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl ElementInfo {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            ..Self::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A click as delivered to the document listener.
#[derive(Debug, Clone, Default)]
pub struct ClickEvent {
    /// Target first, then its ancestors up to the root.
    pub path: Vec<ElementInfo>,
    pub client_x: f64,
    pub client_y: f64,
}

impl ClickEvent {
    /// Closest element on the path carrying the tracking attribute.
    fn tracked_element(&self) -> Option<&ElementInfo> {
        self.path
            .iter()
            .find(|element| element.attributes.contains_key(TRACKING_ATTRIBUTE))
    }
}

/// What the host adapter must do with the DOM event after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    /// Call `stopPropagation()` so nested handlers do not track it again.
    Stop,
}

/// Page visibility after a `visibilitychange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Mutable per-page capture state.
#[derive(Debug)]
pub(crate) struct CaptureState {
    pub max_scroll: i64,
    pub page_load_time: f64,
    pub visible_since: Instant,
    pub listeners: Listeners,
}

impl Default for CaptureState {
    fn default() -> Self {
        Self {
            max_scroll: 0,
            page_load_time: 0.0,
            visible_since: Instant::now(),
            listeners: Listeners::default(),
        }
    }
}

impl CaptureState {
    pub(crate) fn time_on_page_ms(&self) -> u64 {
        self.visible_since.elapsed().as_millis() as u64
    }
}

/// Listeners attached at setup. Later config updates do not change them.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Listeners {
    pub attached: bool,
    pub clicks: bool,
    pub scroll: bool,
    pub performance: bool,
}

impl Analytics {
    /// `load` on `window`.
    pub fn on_load(&self, timing: Option<NavigationTiming>) {
        let listeners = self.shared.listeners();
        if !listeners.attached || !listeners.performance {
            return;
        }

        let timing = timing.unwrap_or_default();
        self.shared.with_capture(|state| state.page_load_time = timing.load_time);

        self.shared.enqueue(
            "page_load_complete",
            EventProps::new()
                .category("performance")
                .custom("load_time", timing.load_time)
                .custom("dom_ready", timing.dom_content_loaded.unwrap_or(0.0))
                .custom("fully_loaded", true),
        );
    }

    /// `scroll` on `window`. Only raises the running maximum; nothing is
    /// queued.
    pub fn on_scroll(&self, metrics: ScrollMetrics) {
        let listeners = self.shared.listeners();
        if !listeners.attached || !listeners.scroll {
            return;
        }
        if let Some(percent) = metrics.percent() {
            self.shared
                .with_capture(|state| state.max_scroll = state.max_scroll.max(percent));
        }
    }

    /// `click` on `document`.
    pub fn on_click(&self, event: &ClickEvent) -> Propagation {
        let listeners = self.shared.listeners();
        if !listeners.attached || !listeners.clicks {
            return Propagation::Continue;
        }
        let Some(target) = event.tracked_element() else {
            return Propagation::Continue;
        };

        let click_type = target
            .attributes
            .get(TRACKING_ATTRIBUTE)
            .filter(|value| !value.is_empty())
            .map_or("click", String::as_str);

        self.shared.enqueue(
            "click",
            EventProps::new()
                .category("interaction")
                .label(target.text.as_str())
                .property("element", target.tag_name.as_str())
                .property("href", json!(target.href))
                .property("click_type", click_type)
                .custom("x", event.client_x)
                .custom("y", event.client_y),
        );

        Propagation::Stop
    }

    /// `visibilitychange` on `document`.
    pub fn on_visibility_change(&self, visibility: Visibility) {
        if !self.shared.listeners().attached {
            return;
        }
        match visibility {
            Visibility::Hidden => {
                let (time_on_page, scroll_depth) = self
                    .shared
                    .with_capture(|state| (state.time_on_page_ms(), state.max_scroll));
                self.shared.enqueue(
                    "page_hidden",
                    EventProps::new()
                        .time_on_page(time_on_page)
                        .scroll_depth(scroll_depth),
                );
            }
            Visibility::Visible => {
                self.shared
                    .with_capture(|state| state.visible_since = Instant::now());
            }
        }
    }

    /// `pagehide` on `window`.
    ///
    /// Queues `page_exit` and hands the whole queue to the transport before
    /// returning. The send is not awaited and not retried from here; the
    /// returned handle only exists so callers that outlive the page (tests,
    /// native hosts) can wait for it.
    pub fn on_page_hide(&self) -> Option<JoinHandle<()>> {
        if !self.shared.listeners().attached {
            return None;
        }

        let (time_on_page, scroll_depth) = self
            .shared
            .with_capture(|state| (state.time_on_page_ms(), state.max_scroll));
        self.shared.enqueue(
            "page_exit",
            EventProps::new()
                .time_on_page(time_on_page)
                .scroll_depth(scroll_depth),
        );

        let handle = self.shared.flush_detached();
        if handle.is_none() && self.shared.config().debug {
            debug!("page exit flush had nothing to send");
        }
        handle
    }
}
