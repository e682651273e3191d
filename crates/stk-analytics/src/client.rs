//! Analytics client implementation.

use crate::builders::{Computed, EventBuilder, EventProps};
use crate::capture::{CaptureState, Listeners};
use crate::config::{find_loader_script, Config, InitOptions, ScriptTag};
use crate::context::{
    capture_attribution, capture_browser_context, current_path, PageContext, StaticPage,
};
use crate::identity::{day_marker, SessionManager};
use crate::queue::EventQueue;
use crate::storage::{BestEffort, MemoryStorage, Storage};
use crate::transport::HttpTransport;
use crate::types::TrackerEvent;
use crate::Error;
use chrono::{Local, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep};
use tracing::{debug, error, info, instrument, warn};

/// Delay before `session_start` is queued, so the page view and unique
/// visitor events land first.
const SESSION_START_DELAY: Duration = Duration::from_millis(100);

/// Analytics client for one page load.
///
/// Owns the configuration, identity, capture state and event queue. Nothing
/// is global, so independent instances can run side by side.
///
/// # Example
///
/// ```rust,no_run
/// use stk_analytics::{Analytics, EventProps, InitOptions, StaticPage};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), stk_analytics::Error> {
///     let analytics = Analytics::builder()
///         .page_context(StaticPage::new("https://example.com/pricing?utm_source=news"))
///         .build()?;
///
///     analytics.init(
///         InitOptions::new()
///             .api_key("key_123")
///             .api_url("https://ingest.example.com/analytics/log")
///             .batch_interval(Duration::from_secs(5)),
///     )?;
///
///     analytics.set_user_email("user@example.com");
///     analytics.track_event("plan_selected", EventProps::new().label("pro"));
///
///     analytics.send_batch().await?;
///     Ok(())
/// }
/// ```
pub struct Analytics {
    pub(crate) shared: Arc<Shared>,
}

/// State shared with background tasks.
pub(crate) struct Shared {
    config: RwLock<Config>,
    identity: SessionManager,
    queue: EventQueue,
    page: Arc<dyn PageContext>,
    transport: HttpTransport,
    capture: Mutex<CaptureState>,
    initialized: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Builder wiring an [`Analytics`] to its host environment.
pub struct AnalyticsBuilder {
    page: Arc<dyn PageContext>,
    local: Arc<dyn Storage>,
    session: Arc<dyn Storage>,
}

impl Default for AnalyticsBuilder {
    fn default() -> Self {
        Self {
            page: Arc::new(StaticPage::default()),
            local: Arc::new(MemoryStorage::new()),
            session: Arc::new(MemoryStorage::new()),
        }
    }
}

impl AnalyticsBuilder {
    /// Set the page context provider.
    pub fn page_context(mut self, page: impl PageContext + 'static) -> Self {
        self.page = Arc::new(page);
        self
    }

    /// Set the persistent storage (`localStorage`).
    pub fn local_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.local = Arc::new(storage);
        self
    }

    /// Set the tab-scoped storage (`sessionStorage`).
    pub fn session_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.session = Arc::new(storage);
        self
    }

    /// Build an uninitialized client.
    pub fn build(self) -> Result<Analytics, Error> {
        let shared = Shared {
            config: RwLock::new(Config::default()),
            identity: SessionManager::new(
                BestEffort::new(self.local, "local"),
                BestEffort::new(self.session, "session"),
            ),
            queue: EventQueue::new(),
            page: self.page,
            transport: HttpTransport::new()?,
            capture: Mutex::new(CaptureState::default()),
            initialized: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        };

        Ok(Analytics {
            shared: Arc::new(shared),
        })
    }
}

impl Analytics {
    /// Create a builder with in-memory storage and an empty page.
    pub fn builder() -> AnalyticsBuilder {
        AnalyticsBuilder::default()
    }

    // ============================================
    // LIFECYCLE
    // ============================================

    /// Validate `options`, resolve identity, queue the automatic events and
    /// start the flush timer.
    ///
    /// A second call after a successful init is a no-op. On a configuration
    /// error nothing is started and the configuration is left untouched.
    /// Must be called from within a Tokio runtime.
    #[instrument(skip_all)]
    pub fn init(&self, options: InitOptions) -> Result<(), Error> {
        if self
            .shared
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if self.shared.config().debug {
                warn!("already initialized");
            }
            return Ok(());
        }

        let config = match self.validated(options) {
            Ok(config) => config,
            Err(e) => {
                self.shared.initialized.store(false, Ordering::SeqCst);
                error!(error = %e, "not initializing");
                return Err(e);
            }
        };

        *self.shared.config.write().unwrap_or_else(|e| e.into_inner()) = config.clone();
        self.shared.identity.resolve(config.debug);

        self.setup_automatic_tracking(&config);
        self.start_batch_timer(config.batch_interval);

        if config.debug {
            info!(
                api_url = %config.api_url,
                batch_interval_ms = config.batch_interval.as_millis() as u64,
                "initialized"
            );
        }

        Ok(())
    }

    fn validated(&self, options: InitOptions) -> Result<Config, Error> {
        if Handle::try_current().is_err() {
            return Err(Error::Config(
                "init must be called within a Tokio runtime".into(),
            ));
        }
        let mut candidate = self.shared.config();
        candidate.merge(&options);
        candidate.validate()
    }

    /// Initialize from the loader script tag, falling back to options the
    /// host page published (the `window.AnalyticsConfig` path). Does nothing
    /// when neither is present.
    pub fn auto_init(
        &self,
        scripts: &[ScriptTag],
        window_config: Option<InitOptions>,
    ) -> Result<(), Error> {
        let from_script = find_loader_script(scripts)
            .and_then(|script| InitOptions::from_script_attributes(&script.attributes));

        match from_script.or(window_config) {
            Some(options) => self.init(options),
            None => Ok(()),
        }
    }

    /// Whether [`init`](Self::init) completed.
    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    fn setup_automatic_tracking(&self, config: &Config) {
        self.shared.with_capture(|state| {
            state.visible_since = Instant::now();
            state.listeners = Listeners {
                attached: true,
                clicks: config.auto_track_clicks,
                scroll: config.auto_track_scroll,
                performance: config.auto_track_performance,
            };
        });

        if !config.auto_track_page_views {
            return;
        }

        self.shared.enqueue("page_view", EventProps::new());
        self.shared.track_unique_visitor();

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            sleep(SESSION_START_DELAY).await;
            shared.enqueue(
                "session_start",
                EventProps::new()
                    .category("session")
                    .custom("session_type", "new"),
            );
        });
        self.shared.register_task(handle);
    }

    fn start_batch_timer(&self, period: Duration) {
        let shared = Arc::clone(&self.shared);

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut timer = interval_at(start, period);

            loop {
                timer.tick().await;

                if let Err(e) = shared.flush().await {
                    if shared.config().debug {
                        warn!(error = %e, "periodic flush failed, events requeued");
                    }
                }
            }
        });

        self.shared.register_task(handle);
    }

    /// Send everything queued now.
    ///
    /// On failure the batch is put back at the front of the queue before
    /// the error is returned, so the next flush retries it first.
    pub async fn send_batch(&self) -> Result<(), Error> {
        self.shared.flush().await
    }

    // ============================================
    // TRACKING
    // ============================================

    /// Track a custom event. Dropped if the client is not initialized.
    pub fn track_event(&self, event_name: impl Into<String>, props: EventProps) {
        let event_name = event_name.into();
        if !self.is_initialized() {
            if self.shared.config().debug {
                warn!(event_name = %event_name, "not initialized, call init() first");
            }
            return;
        }
        self.shared.enqueue(event_name, props);
    }

    /// Track a user interaction.
    pub fn track_interaction(&self, action: &str, label: Option<&str>, props: EventProps) {
        self.track_event(
            "interaction",
            props
                .default_category("interaction")
                .default_property("action", action)
                .default_label(label),
        );
    }

    /// Track a navigation to `page`.
    pub fn track_navigation(&self, page: &str, props: EventProps) {
        self.track_event(
            "navigation",
            props.default_category("navigation").default_page(page),
        );
    }

    /// Track an error message.
    pub fn track_error(&self, message: &str, props: EventProps) {
        self.track_event(
            "error",
            props
                .default_category("error")
                .default_property("error_message", message),
        );
    }

    /// Track a performance metric.
    pub fn track_performance(&self, metric: &str, value: f64, props: EventProps) {
        self.track_event(
            "performance",
            props
                .default_category("performance")
                .default_property("metric", metric)
                .default_value(json!(value)),
        );
    }

    /// Track a promo impression. Attribution fields are spread into the
    /// event data.
    pub fn track_promo_impression(&self, promo_id: &str, props: EventProps) {
        let attribution = capture_attribution(self.shared.page.as_ref()).to_fields();
        self.track_event(
            "promo_impression",
            props
                .default_category("promo")
                .default_property("promo_id", promo_id)
                .spread(attribution),
        );
    }

    /// Track a promo click; `action` defaults to `"click"`.
    pub fn track_promo_click(&self, promo_id: &str, action: Option<&str>, props: EventProps) {
        let attribution = capture_attribution(self.shared.page.as_ref()).to_fields();
        self.track_event(
            "promo_click",
            props
                .default_category("promo")
                .default_property("promo_id", promo_id)
                .default_property("action", action.unwrap_or("click"))
                .spread(attribution),
        );
    }

    /// Queue `unique_visitor_session` / `unique_visitor_daily` if this
    /// session / calendar day has not been seen yet.
    pub fn track_unique_visitor(&self) {
        if !self.is_initialized() {
            if self.shared.config().debug {
                warn!("not initialized, call init() first");
            }
            return;
        }
        self.shared.track_unique_visitor();
    }

    // ============================================
    // IDENTITY
    // ============================================

    /// Identify the user; later events are `authenticated`.
    pub fn set_user_email(&self, email: &str) {
        let debug = self.shared.config().debug;
        self.shared.identity.set_user_email(email, debug);
        if debug {
            debug!(email, "user email set");
        }
    }

    /// Forget the user; later events are `anonymous`.
    pub fn clear_user_email(&self) {
        let debug = self.shared.config().debug;
        self.shared.identity.clear_user_email(debug);
        if debug {
            debug!("user email cleared");
        }
    }

    pub fn user_email(&self) -> Option<String> {
        self.shared.identity.user_email()
    }

    /// Session id; empty before init.
    pub fn session_id(&self) -> String {
        self.shared.identity.session_id().to_owned()
    }

    /// Visitor id; empty before init.
    pub fn visitor_id(&self) -> String {
        self.shared.identity.visitor_id().to_owned()
    }

    // ============================================
    // CONFIG
    // ============================================

    /// Snapshot of the current configuration.
    pub fn get_config(&self) -> Config {
        self.shared.config()
    }

    /// Merge `options` into the configuration without re-validating.
    /// The flush timer and attached listeners are not changed.
    pub fn update_config(&self, options: InitOptions) {
        let mut config = self.shared.config.write().unwrap_or_else(|e| e.into_inner());
        config.merge(&options);
        if config.debug {
            debug!(config = ?*config, "config updated");
        }
    }

    /// Get the number of pending events.
    pub fn pending_event_count(&self) -> usize {
        self.shared.queue.len()
    }

    /// Names of pending events, oldest first.
    pub fn pending_event_names(&self) -> Vec<String> {
        self.shared.queue.event_names()
    }
}

impl Drop for Analytics {
    fn drop(&mut self) {
        for handle in self.shared.tasks.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            handle.abort();
        }
    }
}

// ============================================
// INTERNAL
// ============================================

impl Shared {
    pub(crate) fn config(&self) -> Config {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn with_capture<R>(&self, f: impl FnOnce(&mut CaptureState) -> R) -> R {
        let mut state = self.capture.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub(crate) fn listeners(&self) -> Listeners {
        self.with_capture(|state| state.listeners)
    }

    fn register_task(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    /// Build the full envelope and append it to the queue.
    pub(crate) fn enqueue(&self, event_name: impl Into<String>, props: EventProps) {
        let config = self.config();
        let (page_load_time, scroll_depth) =
            self.with_capture(|state| (state.page_load_time, state.max_scroll));
        let visit = self.identity.record_visit(Utc::now(), config.debug);

        let computed = Computed {
            visitor_id: self.identity.visitor_id().to_owned(),
            session_id: self.identity.session_id().to_owned(),
            user_email: self.identity.user_email(),
            visit,
            page: current_path(self.page.as_ref()),
            page_title: self.page.title().unwrap_or_default(),
            page_load_time,
            scroll_depth,
            attribution: capture_attribution(self.page.as_ref()),
            browser: capture_browser_context(self.page.as_ref()),
            service: config.api_key.clone(),
        };

        let event = EventBuilder::new(event_name, props).build(computed, config.debug);
        if config.debug {
            debug!(event_name = %event.event_name, "event queued");
        }
        self.queue.enqueue(event);
    }

    pub(crate) fn track_unique_visitor(&self) {
        let debug = self.config().debug;

        if self.identity.claim_session_marker(debug) {
            self.enqueue(
                "unique_visitor_session",
                EventProps::new()
                    .category("visitor")
                    .custom("first_visit_session", true)
                    .custom("visitor_type", "unique")
                    .custom("tracking_type", "per_session"),
            );
        }

        if self.identity.claim_daily_marker(&day_marker(Local::now()), debug) {
            self.enqueue(
                "unique_visitor_daily",
                EventProps::new()
                    .category("visitor")
                    .custom("first_visit_day", true)
                    .custom("visitor_type", "unique")
                    .custom("tracking_type", "per_day"),
            );
        }
    }

    /// Take the queue for sending, applying the no-op and debug-mode rules.
    /// Returns the endpoint and batch when there is something to send.
    fn take_batch(&self) -> Option<(String, Vec<TrackerEvent>)> {
        let config = self.config();

        if self.queue.is_empty() || config.api_url.is_empty() || config.api_key.is_empty() {
            if config.debug {
                if config.api_key.is_empty() {
                    debug!("no API key configured, not sending");
                }
                if config.api_url.is_empty() {
                    debug!("no API URL configured, not sending");
                }
            }
            return None;
        }

        if config.debug {
            let dropped = self.queue.clear();
            debug!(event_count = dropped, "debug mode, batch not sent");
            return None;
        }

        let events = self.queue.drain();
        if events.is_empty() {
            return None;
        }
        Some((config.api_url, events))
    }

    async fn deliver(&self, endpoint: &str, events: Vec<TrackerEvent>) -> Result<(), Error> {
        let debug = self.config().debug;
        if debug {
            info!(event_count = events.len(), "sending batch");
        }

        if let Err(e) = self.transport.send(endpoint, &events).await {
            if debug {
                warn!(error = %e, event_count = events.len(), "batch send failed, requeuing");
            }
            self.queue.requeue(events);
            return Err(e);
        }

        Ok(())
    }

    /// Flush all pending events.
    #[instrument(skip(self))]
    pub(crate) async fn flush(&self) -> Result<(), Error> {
        match self.take_batch() {
            Some((endpoint, events)) => self.deliver(&endpoint, events).await,
            None => Ok(()),
        }
    }

    /// Take the batch now and send it in the background.
    pub(crate) fn flush_detached(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let (endpoint, events) = self.take_batch()?;

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                self.queue.requeue(events);
                return None;
            }
        };

        let shared = Arc::clone(self);
        Some(runtime.spawn(async move {
            if let Err(e) = shared.deliver(&endpoint, events).await {
                if shared.config().debug {
                    warn!(error = %e, "page exit flush failed");
                }
            }
        }))
    }
}
