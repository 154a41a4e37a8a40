//! Fan-out of ingest events to dashboard subscribers
//!
//! ```text
//!                          ┌──► Subscription (queue, drop-oldest)
//! ingest ──► DashboardRelay ┼──► Subscription
//!   publish() never waits  └──► Subscription
//! ```

pub mod error;
pub mod event;
pub mod hub;
pub mod subscription;

pub use error::RelayError;
pub use event::{ConnectionStatus, Delivery, FrameEvent, RelayEvent, StatusEvent};
pub use hub::{DashboardRelay, RelayConfig, SubscriberId, DEFAULT_SUBSCRIBER_CAPACITY};
pub use subscription::Subscription;
