use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElectorError {
    #[error("peer {peer} is not part of session {session}")]
    InvalidMembership { peer: String, session: String },

    #[error("election for session {session} did not converge within {waited_ms}ms")]
    ElectionTimeout { session: String, waited_ms: u64 },

    #[error("election cancelled")]
    Cancelled,

    #[error("elector is stopped")]
    Stopped,

    #[error("transport error during {operation}: {details}")]
    Transport { operation: String, details: String },

    #[error("encoding error: {details}")]
    Encoding { details: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ElectorError>;

impl ElectorError {
    pub fn transport(operation: impl Into<String>, details: impl ToString) -> Self {
        ElectorError::Transport { operation: operation.into(), details: details.to_string() }
    }
}

impl From<bincode::Error> for ElectorError {
    fn from(err: bincode::Error) -> Self {
        ElectorError::Encoding { details: err.to_string() }
    }
}

// NOTE: Avoid adding generic "stringly" error conversions here.
// Use structured `ElectorError` variants at the call site to preserve context.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_render() {
        let err = ElectorError::InvalidMembership { peer: "relayer-9".to_string(), session: "1".to_string() };
        assert!(err.to_string().contains("relayer-9"));

        let err = ElectorError::ElectionTimeout { session: "1".to_string(), waited_ms: 25_000 };
        assert!(err.to_string().contains("25000ms"));

        let err = ElectorError::transport("send", "queue full");
        assert!(err.to_string().contains("send"));
        assert!(err.to_string().contains("queue full"));
    }
}
