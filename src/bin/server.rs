//! 车辆计数推流服务入口

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vcs_rs::config::Args;
use vcs_rs::server::{self, AppState};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.upload_dir)?;

    let state = AppState::with_defaults(args.pipeline_config(), args.upload_dir.clone());
    // 未接入推理后端时推流可用但不产生计数
    warn!("no detection backend configured, running with null detector");

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!(bind = %args.bind, "vehicle counting server listening");
    axum::serve(listener, server::router(state)).await?;
    Ok(())
}
