//! Wire messages for the gateway protocol
//!
//! Every frame is a JSON object `{ op, d, s, t }`. Only DISPATCH frames
//! carry a sequence number and an event name.

mod close;
mod payload;

pub use close::{INVALID_SEQUENCE, NORMAL_CLOSURE, RESUMABLE_CLOSURE, SESSION_TIMEOUT, clears_session};
pub use payload::{GatewayOp, GatewayPayload};
