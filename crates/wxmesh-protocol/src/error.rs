/// Protocol-level errors for wxmesh.
///
/// Wraps transport errors and adds the failures of upstream data sources,
/// packet decoding and configuration.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("transport error: {0}")]
    Transport(#[from] wxmesh_transport::TransportError),

    #[error("upstream {service} failed: {reason}")]
    Upstream {
        service: &'static str,
        reason: String,
    },

    #[error("malformed {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    #[error("truncated packet: need {needed} bytes, have {available}")]
    TruncatedPacket { needed: usize, available: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config file {path}: {reason}")]
    ConfigFile { path: String, reason: String },
}

impl AlertError {
    /// Shorthand for an upstream failure.
    pub fn upstream(service: &'static str, reason: impl ToString) -> Self {
        AlertError::Upstream {
            service,
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a parse failure.
    pub fn parse(what: &'static str, reason: impl ToString) -> Self {
        AlertError::Parse {
            what,
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for AlertError {
    fn from(e: serde_json::Error) -> Self {
        AlertError::parse("json", e)
    }
}
