//! # Item Service
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide the `grpctest.ItemService`
//! server bindings and descriptor set used by the `grpc-steps` integration tests and
//! feature files. It is not intended for production use.

pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/grpctest.rs"));
}

pub use pb::item_service_server::{ItemService, ItemServiceServer};
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptors");
