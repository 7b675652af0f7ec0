use wiremesh_core::{IntegrityError, RenderError};
use wiremesh_types::ConnectionIdError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("no network snapshot given (use --network or WIREMESH_NETWORK)")]
    MissingNetwork,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid peer id: {0}")]
    InvalidPeerId(#[from] uuid::Error),

    #[error(transparent)]
    ConnectionId(#[from] ConnectionIdError),

    #[error("peer not found: {0}")]
    PeerNotFound(uuid::Uuid),

    #[error("network is inconsistent: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("invalid field payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("no available addresses in this network")]
    NetworkFull,

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("internal error")]
    Internal,
}

impl From<RenderError> for CliError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::PeerNotFound(id) => Self::PeerNotFound(id),
            RenderError::DanglingConnection { connection, peer } => {
                Self::Integrity(IntegrityError::UnknownPeer { connection, peer })
            }
            RenderError::SelfConnection(connection) => {
                Self::Integrity(IntegrityError::SelfConnection(connection))
            }
            RenderError::Format(_) => {
                tracing::error!(error = %err, "render error");
                Self::Internal
            }
        }
    }
}

impl CliError {
    /// Process exit code: 2 for bad input, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::MissingNetwork
            | Self::InvalidPeerId(_)
            | Self::ConnectionId(_)
            | Self::Payload(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremesh_types::ConnectionId;

    #[test]
    fn dangling_connection_maps_to_integrity() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let connection = ConnectionId::new(a, b);
        let err = CliError::from(RenderError::DanglingConnection { connection, peer: b });
        assert!(matches!(
            err,
            CliError::Integrity(IntegrityError::UnknownPeer { peer, .. }) if peer == b
        ));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn self_connection_maps_to_integrity() {
        let a = Uuid::new_v4();
        let connection = ConnectionId::new(a, a);
        let err = CliError::from(RenderError::SelfConnection(connection));
        assert!(matches!(
            err,
            CliError::Integrity(IntegrityError::SelfConnection(found)) if found == connection
        ));
    }

    #[test]
    fn bad_uuid_is_usage_error() {
        let err = CliError::from("not-a-uuid".parse::<Uuid>().unwrap_err());
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().starts_with("invalid peer id"));
    }
}
