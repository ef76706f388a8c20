//! Generate updated proto code for this client.
//!
//! This is setup as an example instead of as part of the build.rs because the proto files do not
//! ship along with the client code when distributed.

use anyhow::{Context, Result};

fn main() -> Result<()> {
    tonic_build::configure()
        .out_dir("src/grpc")
        .build_client(true)
        .build_server(false)
        .compile(&["../proto/broker.proto"], &["../proto"])
        .context("error compiling broker proto")?;
    Ok(())
}
