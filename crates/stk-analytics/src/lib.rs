//! Embeddable web analytics collection SDK.
//!
//! The core resolves visitor and session identity, captures page activity
//! and manual events, batches them in memory and delivers them to an ingest
//! endpoint with requeue-on-failure. It has no DOM dependency: a host
//! adapter supplies a [`PageContext`], two [`Storage`] handles, and forwards
//! browser events to the `on_*` handlers of [`Analytics`].
//!
//! # Example
//!
//! ```rust,ignore
//! use stk_analytics::{Analytics, ClickEvent, ElementInfo, EventProps, InitOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stk_analytics::Error> {
//!     let analytics = Analytics::builder().build()?;
//!     analytics.init(
//!         InitOptions::new()
//!             .api_key("key_123")
//!             .api_url("https://ingest.example.com/analytics/log"),
//!     )?;
//!
//!     analytics.track_event("signup", EventProps::new().category("account"));
//!
//!     let click = ClickEvent {
//!         path: vec![ElementInfo::new("BUTTON").attribute("data-click", "signup")],
//!         ..ClickEvent::default()
//!     };
//!     analytics.on_click(&click);
//!
//!     if let Some(exit) = analytics.on_page_hide() {
//!         let _ = exit.await;
//!     }
//!     Ok(())
//! }
//! ```

mod builders;
mod capture;
mod client;
mod config;
mod context;
mod error;
mod identity;
mod queue;
mod storage;
mod transport;
pub mod types;

pub use builders::{EventProps, DEFAULT_CATEGORY};
pub use capture::{
    ClickEvent, ElementInfo, NavigationTiming, Propagation, ScrollMetrics, Visibility,
    TRACKING_ATTRIBUTE,
};
pub use client::{Analytics, AnalyticsBuilder};
pub use config::{
    find_loader_script, Config, InitOptions, ScriptTag, DEFAULT_BATCH_INTERVAL,
    LOADER_SCRIPT_MARKER,
};
pub use context::{
    capture_attribution, capture_browser_context, Attribution, BrowserContext, PageContext,
    StaticPage,
};
pub use error::{Error, StorageError};
pub use identity::keys as storage_keys;
pub use queue::EventQueue;
pub use storage::{MemoryStorage, Storage, UnavailableStorage};
pub use transport::HttpTransport;
pub use types::{EventData, TrackerEvent, UserType};
