//! Chat channel (LINE): webhook event types, signature verification, and the reply connector.
//!
//! The dispatcher only sees the `ReplyChannel` trait; the gateway uses `signature` to
//! authenticate webhook POSTs before parsing them.

mod event;
mod handle;
mod line;
pub mod signature;

pub use event::{
    DispatchResult, EventKind, EventMessage, InboundEvent, MessageKind, ReplyMessage, WebhookBody,
};
pub use handle::{ChannelError, ReplyChannel};
pub use line::LineChannel;
