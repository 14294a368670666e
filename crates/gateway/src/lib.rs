//! Gateway: accepts authenticated WebSocket connections, runs the
//! per-connection read/write loops, forwards chat frames to Logic over a
//! persistent bidi stream, batches presence changes, and exposes a `Push`
//! RPC that Task uses to deliver messages to connected users.
//!
//! All sequencing, persistence, and session bookkeeping live in Logic —
//! the gateway holds only the connection table and in-flight stream state.

pub mod presence;
pub mod push_service;
pub mod rpc;
pub mod server;
pub mod state;
pub mod ws;
