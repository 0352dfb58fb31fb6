use thiserror::Error;

/// Failures raised while building subscription requests.
///
/// The cache itself never fails; store-side failures arrive through the
/// `on_error` callback as a [`SubscriptionError`](super::store::SubscriptionError).
#[derive(Debug, Error)]
pub enum SubsError {
    #[error("failed to encode parameters for publication `{publication}`: {source}")]
    Params {
        publication: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl SubsError {
    pub fn params(publication: &'static str, source: serde_json::Error) -> Self {
        Self::Params {
            publication,
            source,
        }
    }
}
