fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::compile_protos("proto/ops.proto")?;
    println!("cargo:rerun-if-changed=proto/ops.proto");
    Ok(())
}
