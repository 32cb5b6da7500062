//! # Server Reflection
//!
//! Registration source backed by the gRPC Server Reflection Protocol.
//!
//! It lets a suite register the services of a running server without a local
//! `FileDescriptorSet`, by querying the server for its own Protobuf schema.
pub mod client;
