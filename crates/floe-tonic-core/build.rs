use std::env;
use std::path::PathBuf;

/// Builds the gRPC client and server bindings for `proto/floe.proto` with
/// `tonic-prost-build`, emitting a file descriptor set alongside so the
/// server can register v1 reflection.
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("floe_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/floe.proto"], &["proto"])
        .unwrap();
}
