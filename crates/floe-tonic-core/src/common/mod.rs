pub mod error;
pub mod types;

pub use error::{Error, Result};

/// Generated protobuf types and gRPC bindings for the `floe.IdWorker`
/// service, plus the encoded file descriptor set used for reflection.
pub mod proto {
    tonic::include_proto!("floe");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("floe_descriptor");
}
