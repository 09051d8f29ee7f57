fn main() -> std::io::Result<()> {
    pb_build::set_protoc_path();
    println!("cargo:rerun-if-changed=proto/filestore.proto");
    tonic_build::configure().compile_protos(&["proto/filestore.proto"], &["proto/"])
}
