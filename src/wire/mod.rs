//! Wire layer: message types, frame codec and the zmq transport.

pub mod codec;
pub mod message;
pub mod transport;
