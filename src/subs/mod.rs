//! Barkeep subscription cache
//!
//! Multiplexes the data subscriptions requested by independent screens of the
//! bar point-of-sale client into one bounded, deduplicated, time-expiring set
//! of live subscriptions against the document store.
//!
//! - **Requests**: a publication name plus parameters, deduplicated by a
//!   structural [`Fingerprint`].
//! - **Cache**: [`SubscriptionCache`] tracks entries in touch order, expires
//!   and evicts them, and aggregates readiness.
//! - **Reactive runtime**: [`Tracker`], [`Computation`] and [`Dependency`]
//!   provide deferred re-runs; [`spawn_flush_driver`] flushes on tokio.
//! - **Store seam**: [`SubscriptionStore`] and [`LiveSubscription`], with
//!   [`MemoryStore`] for tests and replays.
//!
//! ## Configuration
//!
//! ```toml
//! [subs]
//! capacity_limit = 10
//! expiration_window_minutes = 50
//! ```

mod callbacks;
mod clock;
mod config;
mod driver;
mod error;
mod lock;
mod manager;
mod memory;
pub mod reactive;
mod registry;
mod request;
mod store;

pub use callbacks::Callbacks;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SubsConfig;
pub use driver::spawn_flush_driver;
pub use error::SubsError;
pub use manager::{EntrySnapshot, SubscriptionCache, SubscriptionHandle};
pub use memory::{MemoryStore, StoreEvent};
pub use reactive::{Computation, Dependency, Tracker};
pub use request::{Fingerprint, Publication, SubscriptionRequest};
pub use store::{
    ErrorFn, LiveSubscription, ReadyFn, SubscriptionCallbacks, SubscriptionError,
    SubscriptionStore,
};
