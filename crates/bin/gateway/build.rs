fn main() -> Result<(), Box<dyn std::error::Error>> {
    // SAFETY: single-threaded build script, no concurrent env access.
    unsafe {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    tonic_build::compile_protos("proto/mail.proto")?;
    Ok(())
}
