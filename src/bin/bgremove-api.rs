//! Background removal HTTP server
//!
//! Serves `GET /ping` and `POST /remove-background` on top of the
//! bgremove-api library, with ONNX Runtime and Tract backends.

use bgremove_api::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
