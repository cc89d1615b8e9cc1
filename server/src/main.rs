use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use labtrail_bus::LocalBus;
use labtrail_commitlog::CommitLogService;
use labtrail_data::DataService;
use labtrail_nodes::NodeService;
use labtrail_objectstore::{LocalStore, ObjectStore};
use labtrail_project::ProjectService;
use labtrail_storage_common::StorageEngine;
use labtrail_storage_sled::SledStorageEngine;

#[derive(Parser, Debug)]
#[command(name = "labtrail-server", about = "Run all labtrail services on one in-process bus")]
struct Args {
    /// Directory for the datastore.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Directory the local object store writes under.
    #[arg(long, default_value = "./objects")]
    objects_dir: PathBuf,

    /// Bucket data objects are stored in.
    #[arg(long, default_value = "labtrail")]
    bucket: String,

    /// Per-request deadline on the bus, in seconds.
    #[arg(long, default_value_t = 30)]
    request_timeout: u64,

    /// How long to wait for in-flight handlers on shutdown, in seconds.
    #[arg(long, default_value_t = 30)]
    drain: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let bus = LocalBus::with_request_timeout(Duration::from_secs(args.request_timeout));
    let engine: Arc<dyn StorageEngine> = Arc::new(SledStorageEngine::with_path(args.data_dir.clone())?);
    let store: Arc<dyn ObjectStore> = Arc::new(LocalStore::new(args.objects_dir.clone()));

    let project = ProjectService::new(engine.clone(), bus.clone());
    project.serve().await?;

    let commitlog = CommitLogService::new(engine.clone(), bus.clone());
    commitlog.serve().await?;
    let sink = commitlog.run_event_sink().await?;

    let nodes = NodeService::new(engine.clone(), bus.clone());
    nodes.serve().await?;
    let consumer = nodes.run_event_consumer().await?;

    let data = DataService::new(engine.clone(), bus.clone(), store.clone(), &args.bucket);
    data.serve().await?;

    info!(data_dir = %args.data_dir.display(), bucket = %args.bucket, "labtrail services ready");

    shutdown_signal().await;
    info!("shutting down");

    // Stop accepting new work, drain the event consumers, then close
    // resources in reverse order of construction.
    bus.close().await;
    let drained = tokio::time::timeout(Duration::from_secs(args.drain), async {
        let _ = sink.await;
        let _ = consumer.await;
    })
    .await;
    if drained.is_err() {
        info!("drain window elapsed with handlers still running");
    }
    store.close().await?;

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}
