//! Thin entrypoint for the `provisor` binary.

use std::process;

#[tokio::main]
async fn main() {
    let exit_code = provisor_cli::run().await;
    process::exit(exit_code);
}
