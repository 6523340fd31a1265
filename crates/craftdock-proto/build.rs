//! Build script for craftdock-proto
//!
//! Compiles protobuf definitions using tonic-build.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The build environment has no system protoc; use the vendored binary.
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            // SAFETY: build scripts are single-threaded at this point.
            #[allow(unsafe_code)]
            unsafe {
                std::env::set_var("PROTOC", protoc);
            }
        }
    }

    let proto_root = "../../proto";

    let protos = ["craftdock/v1/requests.proto"];

    let proto_paths: Vec<_> = protos
        .iter()
        .map(|p| format!("{}/{}", proto_root, p))
        .collect();

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&proto_paths, &[proto_root.to_string()])?;

    Ok(())
}
