//! # parley-shared
//!
//! Wire protocol shared by the Parley relay server and client:
//! - the frame envelope and chat message types ([`protocol`])
//! - the length-prefixed JSON frame codec ([`codec`])
//! - the protocol error taxonomy ([`error`])

pub mod codec;
pub mod error;
pub mod protocol;

pub use codec::FrameCodec;
pub use error::ProtocolError;
pub use protocol::{BrowserField, ChatMessage, Frame, BROADCAST};
