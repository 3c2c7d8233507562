//! API server command: `patchwork serve`.

use anyhow::Result;

use patchwork::config::PatchworkConfig;

pub async fn cmd_serve(config: &PatchworkConfig) -> Result<()> {
    patchwork::api::server::start_server(config).await
}
