//! Deterministic replays of subscription traffic.
//!
//! A replay script drives a [`SubscriptionCache`] backed by a [`MemoryStore`]
//! and a [`ManualClock`], so eviction, expiration and reset behaviour can be
//! inspected without a document store or real time passing.
//!
//! ```toml
//! [store]
//! client = true
//! auto_ready = false
//!
//! [[steps]]
//! op = "subscribe"
//! name = "sales.byShift"
//! params = [3, { bar = "main" }]
//!
//! [[steps]]
//! op = "advance"
//! minutes = 51
//!
//! [[steps]]
//! op = "flush"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

use crate::subs::{
    Callbacks, Clock, ManualClock, MemoryStore, StoreEvent, SubsConfig, SubscriptionCache,
    SubscriptionError, SubscriptionRequest, Tracker,
};

const REPLAY_EPOCH: OffsetDateTime = datetime!(2024-01-01 18:00 UTC);

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read replay script `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid replay script: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to encode replay report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A parsed replay script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub store: StoreOptions,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreOptions {
    /// False replays a runtime that forwards every request uncached.
    pub client: bool,
    /// Report every subscription ready as soon as it opens.
    pub auto_ready: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            client: true,
            auto_ready: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    Subscribe {
        name: String,
        #[serde(default)]
        params: Vec<Value>,
    },
    Advance {
        minutes: u32,
    },
    Flush,
    MarkReady {
        name: String,
    },
    Fail {
        name: String,
        reason: String,
        #[serde(default)]
        code: Option<String>,
    },
    Reset,
    Clear,
}

impl Script {
    pub fn parse(source: &str) -> Result<Self, ReplayError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ReplayError> {
        let source = fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source)
    }
}

/// Cache and store state once a script has run.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub steps: usize,
    pub ready: bool,
    pub tracked: Vec<TrackedEntry>,
    pub live: Vec<String>,
    pub events: Vec<StoreEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedEntry {
    pub fingerprint: String,
    pub subscription: String,
    pub ready: bool,
    pub idle_minutes: i64,
}

impl ReplayReport {
    pub fn to_json(&self, pretty: bool) -> Result<String, ReplayError> {
        let encoded = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(encoded)
    }
}

/// Run `script` against a fresh cache and return the settled state.
///
/// The tracker is flushed once more after the last step.
pub fn run(script: &Script, config: SubsConfig) -> ReplayReport {
    let store = if script.store.client {
        MemoryStore::client()
    } else {
        MemoryStore::server()
    }
    .with_auto_ready(script.store.auto_ready);
    let clock = Arc::new(ManualClock::new(REPLAY_EPOCH));
    let tracker = Tracker::new();
    let cache = SubscriptionCache::with_clock(
        config,
        Arc::new(store.clone()),
        tracker.clone(),
        clock.clone(),
    );

    info!(
        steps = script.steps.len(),
        client = script.store.client,
        capacity_limit = cache.config().capacity_limit,
        "replay starting"
    );

    // Uncached handles are owned by the caller; keep them open for the run.
    let mut forwarded = Vec::new();
    for (index, step) in script.steps.iter().enumerate() {
        debug!(index, ?step, "replay step");
        match step {
            Step::Subscribe { name, params } => {
                let request = SubscriptionRequest::with_params(name.as_str(), params.clone());
                let handle = cache.subscribe(None, request, Callbacks::None);
                if !handle.is_cached() {
                    forwarded.push(handle);
                }
            }
            Step::Advance { minutes } => clock.advance(Duration::minutes(i64::from(*minutes))),
            Step::Flush => {
                tracker.flush();
            }
            Step::MarkReady { name } => {
                store.mark_ready(name);
            }
            Step::Fail { name, reason, code } => {
                let mut error = SubscriptionError::new(reason.as_str());
                if let Some(code) = code {
                    error = error.with_code(code.as_str());
                }
                store.fail(name, &error);
            }
            Step::Reset => cache.reset(),
            Step::Clear => cache.clear(),
        }
    }
    tracker.flush();

    let now = clock.now();
    let report = ReplayReport {
        steps: script.steps.len(),
        ready: cache.ready(None) || forwarded.iter().any(|handle| handle.ready(None)),
        tracked: cache
            .entries()
            .into_iter()
            .map(|entry| TrackedEntry {
                fingerprint: entry.fingerprint.to_string(),
                subscription: entry.identifier,
                ready: entry.ready,
                idle_minutes: (now - entry.touched_at).whole_minutes(),
            })
            .collect(),
        live: store.live_fingerprints(),
        events: store.events(),
    };

    info!(
        tracked = report.tracked.len(),
        live = report.live.len(),
        ready = report.ready,
        "replay finished"
    );
    report
}

/// Read, parse and run the script at `path`.
pub fn run_file(path: &Path, config: SubsConfig) -> Result<ReplayReport, ReplayError> {
    let script = Script::from_path(path)?;
    Ok(run(&script, config))
}
