//! rembg HTTP server
//!
//! Serves `POST /rembg`, the upload page and static assets on top of the
//! rembg-server library.

#[cfg(feature = "cli")]
use rembg_server::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
