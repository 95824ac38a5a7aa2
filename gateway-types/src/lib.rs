//! Shared domain types exchanged between channel adapters, the channel manager,
//! the agent bridge, and the HTTP control plane.
//!
//! These are plain data (no behavior) so every crate in the workspace can depend
//! on them without pulling in adapter or transport code.

mod attachment;
mod capabilities;
mod message;
mod session;

pub use attachment::{Attachment, MessageType};
pub use capabilities::ChannelCapabilities;
pub use message::{InboundMessage, OutboundMessage, ParseMode};
pub use session::{session_key, ChannelSession};
