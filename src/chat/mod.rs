//! Real-time support chat: frame protocol, connection registry and the
//! per-channel router state machine.

mod frames;
mod registry;
mod router;

pub use frames::{ClientFrame, ServerFrame};
pub use registry::ConnectionRegistry;
pub use router::{ChannelHandle, ChatRouter, FrameOutcome};
