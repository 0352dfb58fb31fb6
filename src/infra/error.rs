use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_layer() {
        assert_eq!(
            InfraError::telemetry("subscriber already set").to_string(),
            "telemetry initialization failed: subscriber already set"
        );
        let io = InfraError::from(std::io::Error::other("broken pipe"));
        assert_eq!(io.to_string(), "io error: broken pipe");
    }
}
