use anyhow::{Context, Result};

fn main() -> Result<()> {
    // Build the broker.proto server code.
    tonic_build::configure()
        .out_dir("src/grpc")
        .build_client(false)
        .build_server(true)
        .compile(&["../proto/broker.proto"], &["../proto"])
        .context("error compiling broker proto")?;

    Ok(())
}
