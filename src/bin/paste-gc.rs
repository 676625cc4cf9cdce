use anyhow::Context;
use pastebin_lite::{
    clock::{Clock, SystemClock},
    config,
    paste_repo::paste_repository_capsule,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let container = config::init_container().await?;

    let deleted = container
        .read(paste_repository_capsule)
        .delete_dead_pastes(SystemClock.now_ms(None))
        .await
        .context("Failed to delete dead pastes")?;
    info!(deleted, "Deleted dead pastes");
    Ok(())
}
