//! Seam to the external reactive document store.
//!
//! The cache only needs two things from the store: whether this runtime can
//! hold live subscriptions at all, and a way to open one subscription and get
//! back a handle with readiness polling and explicit teardown.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::reactive::Computation;
use super::request::SubscriptionRequest;

pub type ReadyFn = Arc<dyn Fn() + Send + Sync + 'static>;
pub type ErrorFn = Arc<dyn Fn(&SubscriptionError) + Send + Sync + 'static>;

/// A store-side failure to establish or keep a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct SubscriptionError {
    pub reason: String,
    pub code: Option<String>,
}

impl SubscriptionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Canonical callback shape handed to the store.
#[derive(Clone, Default)]
pub struct SubscriptionCallbacks {
    pub on_ready: Option<ReadyFn>,
    pub on_error: Option<ErrorFn>,
}

impl SubscriptionCallbacks {
    pub fn notify_ready(&self) {
        if let Some(on_ready) = &self.on_ready {
            on_ready();
        }
    }

    pub fn notify_error(&self, error: &SubscriptionError) {
        if let Some(on_error) = &self.on_error {
            on_error(error);
        }
    }
}

impl fmt::Debug for SubscriptionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionCallbacks")
            .field("on_ready", &self.on_ready.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// One live subscription held open against the store.
pub trait LiveSubscription: Send + Sync {
    /// Whether the initial data set has arrived. Registers `ctx` as a
    /// dependent of this handle's readiness.
    fn ready(&self, ctx: Option<&Computation>) -> bool;

    /// Tear the subscription down. Calling it again is a no-op.
    fn stop(&self);
}

/// The external store's native subscribe primitive.
pub trait SubscriptionStore: Send + Sync {
    /// False on runtimes that cannot hold live subscriptions; the cache then
    /// forwards every request untouched.
    fn is_client_runtime(&self) -> bool;

    fn subscribe(
        &self,
        request: &SubscriptionRequest,
        callbacks: SubscriptionCallbacks,
    ) -> Box<dyn LiveSubscription>;
}
