//! Persistent bidi-stream clients the Gateway uses to talk to Logic, per
//! spec §4.2's generic stream-manager contract.

pub mod chat_stream;
pub mod presence_stream;
