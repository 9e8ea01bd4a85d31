use mqttsn_codec::CodecError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("no session bound to address: {0}")]
    UnboundAddress(String),

    #[error("maximum session count reached ({0})")]
    MaxSessionsReached(usize),

    #[error("queue full for session: {0}")]
    QueueFull(String),

    #[error("topic alias space exhausted")]
    RegistryFull,

    #[error("subscription limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("invalid topic filter: {0}")]
    InvalidTopicFilter(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::session::ClientState,
        to: crate::session::ClientState,
    },

    #[error("message id space exhausted")]
    MessageIdExhausted,

    #[error("inflight slot occupied (msg id {0})")]
    InflightOccupied(u16),

    #[error("transport send failed: {0}")]
    Transport(String),

    #[error("connector error: {0}")]
    Connector(String),

    #[error("authentication rejected for client: {0}")]
    AuthenticationRejected(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("gateway is shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_convert() {
        let err: GatewayError = CodecError::UnknownType(0x3F).into();
        assert!(matches!(err, GatewayError::Codec(_)));
    }

    #[test]
    fn display_formats() {
        let err = GatewayError::QueueFull("device-1".into());
        assert_eq!(err.to_string(), "queue full for session: device-1");
    }
}
