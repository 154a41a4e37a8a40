//! Client/server telemetry protocol
//!
//! A long-lived TCP stream of length-prefixed JSON messages. The stream
//! opens with a [`Hello`], then carries [`CalibratedFrame`]s upstream and
//! [`Ack`]s downstream until either side closes it.
//!
//! [`CalibratedFrame`]: crate::frame::CalibratedFrame

pub mod codec;
pub mod message;

pub use codec::{MessageReader, MessageWriter, DEFAULT_MAX_MESSAGE_SIZE};
pub use message::{Ack, Hello, JointBounds, Message};
