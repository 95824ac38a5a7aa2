//! Internal, typed error taxonomy (§10.B). Each component gets its own focused enum; this one
//! aggregates them at the composition root via `#[from]` so `main` can propagate with `?`.

use thiserror::Error;

use crate::attachment::AttachmentError;
use crate::bridge::AgentBridgeError;
use crate::channel::AdapterError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    #[error(transparent)]
    Bridge(#[from] AgentBridgeError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("bind control plane: {0}")]
    Bind(#[source] std::io::Error),
}
