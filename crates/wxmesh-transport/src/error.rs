/// Errors returned by the wxmesh transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("link I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("radio did not answer {command} in time")]
    Timeout { command: &'static str },

    #[error("radio rejected {command} (code {code:?})")]
    Rejected {
        command: &'static str,
        code: Option<u8>,
    },

    #[error("unexpected reply to {command}: {response}")]
    Unexpected {
        command: &'static str,
        response: String,
    },

    #[error("channel {0:?} not found and no free slot to create it")]
    ChannelUnavailable(String),

    #[error("companion link is shut down")]
    Shutdown,
}

impl TransportError {
    pub(crate) fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        TransportError::Malformed {
            what,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_frame_too_large() {
        let err = TransportError::FrameTooLarge { size: 900, max: 512 };
        assert_eq!(err.to_string(), "frame too large: 900 bytes (max 512)");
    }

    #[test]
    fn test_display_rejected() {
        let err = TransportError::Rejected {
            command: "SetChannel",
            code: Some(2),
        };
        assert_eq!(err.to_string(), "radio rejected SetChannel (code Some(2))");
    }

    #[test]
    fn test_display_channel_unavailable() {
        let err = TransportError::ChannelUnavailable("#alerts".into());
        assert_eq!(
            err.to_string(),
            "channel \"#alerts\" not found and no free slot to create it"
        );
    }
}
