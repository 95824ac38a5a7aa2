//! Placeholder [`gateway::Agent`] binding.
//!
//! The Agent runtime itself is out of scope here: production deployments wire this seam to
//! whatever agent runtime they run (an HTTP call, an IPC socket, an in-process library), none of
//! which this crate owns. `EchoAgent` exists only so the composition root has something concrete
//! to hand `AgentBridge::new` and so the control plane can be exercised end-to-end without a real
//! backend.

use std::sync::Arc;

use async_trait::async_trait;
use gateway::{Agent, AgentBridgeError, UserMessage};

pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    async fn communicate(&self, msg: UserMessage) -> Result<String, AgentBridgeError> {
        Ok(msg.content)
    }
}

pub fn build_agent() -> Arc<dyn Agent> {
    Arc::new(EchoAgent)
}
