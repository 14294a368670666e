//! Generated gRPC types and service stubs for the auth, session, chat/presence
//! stream, and push services, compiled from `proto/resonance.proto`.

tonic::include_proto!("resonance");
