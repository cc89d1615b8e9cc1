//! Test harness: the full set of services wired onto one in-process bus,
//! each with its own datastore, the way a single-node deployment runs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use labtrail_bus::LocalBus;
use labtrail_commitlog::{CommitLogClient, CommitLogService};
use labtrail_data::{DataClient, DataService};
use labtrail_nodes::{NodeClient, NodeService};
use labtrail_objectstore::MemoryStore;
use labtrail_project::{ProjectClient, ProjectService};
use labtrail_storage_common::StorageEngine;
use labtrail_storage_sled::SledStorageEngine;

pub struct Stack {
    pub bus: Arc<LocalBus>,
    pub projects: ProjectClient,
    pub commits: CommitLogClient,
    pub nodes: NodeClient,
    pub data: DataClient,
}

fn test_engine() -> Result<Arc<dyn StorageEngine>> { Ok(Arc::new(SledStorageEngine::new_test()?)) }

pub async fn spawn_stack() -> Result<Stack> {
    let bus = LocalBus::new();

    let project = ProjectService::new(test_engine()?, bus.clone());
    project.serve().await?;

    let commitlog = CommitLogService::new(test_engine()?, bus.clone());
    commitlog.serve().await?;
    commitlog.run_event_sink().await?;

    let nodes = NodeService::new(test_engine()?, bus.clone());
    nodes.serve().await?;
    nodes.run_event_consumer().await?;

    let data = DataService::new(test_engine()?, bus.clone(), Arc::new(MemoryStore::new()), "trials");
    data.serve().await?;

    Ok(Stack {
        bus: bus.clone(),
        projects: ProjectClient::new(bus.clone()),
        commits: CommitLogClient::new(bus.clone()),
        nodes: NodeClient::new(bus.clone()),
        data: DataClient::new(bus),
    })
}

/// Wait for the event subscribers to drain what was just published.
pub async fn settle() { tokio::time::sleep(Duration::from_millis(150)).await }
