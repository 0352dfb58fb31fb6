//! Caller-supplied subscription callbacks and their normalization.
//!
//! Callers may hand over nothing, a bare ready callback, or an options pair.
//! The cache resolves that once, when it creates an entry, into a single
//! [`SubscriptionCallbacks`] that always carries the cache's own error handler.

use std::fmt;
use std::sync::Arc;

use super::store::{ErrorFn, ReadyFn, SubscriptionCallbacks, SubscriptionError};

/// What the caller attached to a subscribe call.
#[derive(Clone, Default)]
pub enum Callbacks {
    #[default]
    None,
    /// A plain success callback.
    OnReady(ReadyFn),
    /// An options object; either field may be missing.
    Options {
        on_ready: Option<ReadyFn>,
        on_error: Option<ErrorFn>,
    },
}

impl Callbacks {
    pub fn on_ready<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::OnReady(Arc::new(f))
    }

    pub fn on_error<F>(f: F) -> Self
    where
        F: Fn(&SubscriptionError) + Send + Sync + 'static,
    {
        Self::Options {
            on_ready: None,
            on_error: Some(Arc::new(f)),
        }
    }

    /// Add an error handler, turning the value into the options form.
    pub fn with_on_error<F>(self, f: F) -> Self
    where
        F: Fn(&SubscriptionError) + Send + Sync + 'static,
    {
        let on_error: ErrorFn = Arc::new(f);
        match self {
            Self::None => Self::Options {
                on_ready: None,
                on_error: Some(on_error),
            },
            Self::OnReady(on_ready) | Self::Options {
                on_ready: Some(on_ready),
                ..
            } => Self::Options {
                on_ready: Some(on_ready),
                on_error: Some(on_error),
            },
            Self::Options { on_ready: None, .. } => Self::Options {
                on_ready: None,
                on_error: Some(on_error),
            },
        }
    }

    /// The caller's callbacks as-is, for stores that are used without caching.
    pub(crate) fn into_native(self) -> SubscriptionCallbacks {
        match self {
            Self::None => SubscriptionCallbacks::default(),
            Self::OnReady(on_ready) => SubscriptionCallbacks {
                on_ready: Some(on_ready),
                on_error: None,
            },
            Self::Options { on_ready, on_error } => SubscriptionCallbacks { on_ready, on_error },
        }
    }

    /// Install `cache_on_error` without discarding anything the caller supplied.
    ///
    /// When the caller brought its own error handler, the cache's handler runs
    /// first and the caller's second.
    pub(crate) fn normalize(self, cache_on_error: ErrorFn) -> SubscriptionCallbacks {
        match self {
            Self::None => SubscriptionCallbacks {
                on_ready: None,
                on_error: Some(cache_on_error),
            },
            Self::OnReady(on_ready) => SubscriptionCallbacks {
                on_ready: Some(on_ready),
                on_error: Some(cache_on_error),
            },
            Self::Options {
                on_ready,
                on_error: Some(original),
            } => {
                let composed: ErrorFn = Arc::new(move |error: &SubscriptionError| {
                    cache_on_error(error);
                    original(error);
                });
                SubscriptionCallbacks {
                    on_ready,
                    on_error: Some(composed),
                }
            }
            Self::Options {
                on_ready,
                on_error: None,
            } => SubscriptionCallbacks {
                on_ready,
                on_error: Some(cache_on_error),
            },
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("Callbacks::None"),
            Self::OnReady(_) => f.write_str("Callbacks::OnReady(..)"),
            Self::Options { on_ready, on_error } => f
                .debug_struct("Callbacks::Options")
                .field("on_ready", &on_ready.is_some())
                .field("on_error", &on_error.is_some())
                .finish(),
        }
    }
}
