use std::sync::Arc;

use anyhow::Result;
use labtrail_bus::{decode_event, Bus, LocalBus, Subscription};
use labtrail_proto::event::{NodeChange, NodeInputDelta, NodeRenamed};
use labtrail_proto::{event::kind, subject, Code, Event};
use labtrail_project::{ProjectClient, ProjectService};
use labtrail_storage_common::StorageEngine;
use labtrail_storage_sled::SledStorageEngine;

async fn setup() -> Result<(Arc<LocalBus>, ProjectClient)> {
    let bus = LocalBus::new();
    let engine: Arc<dyn StorageEngine> = Arc::new(SledStorageEngine::new_test()?);
    let service = ProjectService::new(engine, bus.clone());
    service.serve().await?;
    Ok((bus.clone(), ProjectClient::new(bus)))
}

async fn next_event(sub: &mut Subscription) -> Event {
    let delivery = sub.next().await.expect("subscription open");
    decode_event(&delivery.payload).expect("event envelope")
}

#[tokio::test]
async fn create_requires_account_and_name() -> Result<()> {
    let (_bus, client) = setup().await?;

    let err = client.create("", "P", "").await.unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
    let err = client.create("u1", "", "").await.unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
    Ok(())
}

#[tokio::test]
async fn names_are_unique_per_account_case_insensitive() -> Result<()> {
    let (_bus, client) = setup().await?;

    client.create("u1", "Trial", "").await?;
    let err = client.create("u1", "trial", "").await.unwrap_err();
    assert_eq!(err.code, Code::AlreadyExists);

    // A different account may reuse the name.
    client.create("u2", "Trial", "").await?;
    Ok(())
}

#[tokio::test]
async fn create_publishes_project_created() -> Result<()> {
    let (bus, client) = setup().await?;
    let mut sub = bus.subscribe(subject::EVENTS_ALL).await?;

    let project = client.create("u1", "P", "a study").await?;

    let event = next_event(&mut sub).await;
    assert_eq!(event.kind, kind::PROJECT_CREATED);
    assert_eq!(event.project, project.id);
    assert_eq!(event.author, "u1");
    let data: serde_json::Value = serde_json::from_slice(&event.data)?;
    assert_eq!(data["name"], "P");
    Ok(())
}

#[tokio::test]
async fn update_workflow_emits_diff_events_in_order() -> Result<()> {
    let (bus, client) = setup().await?;
    let project = client.create("u1", "P", "").await?;

    let mut sub = bus.subscribe(subject::EVENTS_ALL).await?;
    client.update_workflow("u1", project.id, "a: {type: data, title: A, input: [], output: [x]}").await?;

    let event = next_event(&mut sub).await;
    assert_eq!(event.kind, kind::NODE_ADDED);
    let added: NodeChange = event.decode_data()?;
    assert_eq!(added.node.key, "a");
    assert_eq!(added.node.kind, "DATA");
    assert_eq!(added.node.title, "A");
    assert_eq!(added.node.output, ["x"]);

    // Rename + new input: rename event first, then the input delta.
    client.update_workflow("u1", project.id, "a: {type: data, title: B, input: [y], output: [x]}").await?;

    let event = next_event(&mut sub).await;
    assert_eq!(event.kind, kind::NODE_RENAMED);
    let renamed: NodeRenamed = event.decode_data()?;
    assert_eq!(renamed.node.from, "A");
    assert_eq!(renamed.node.to, "B");

    let event = next_event(&mut sub).await;
    assert_eq!(event.kind, kind::NODE_INPUT_ADDED);
    let delta: NodeInputDelta = event.decode_data()?;
    assert_eq!(delta.node.input, "y");
    Ok(())
}

#[tokio::test]
async fn unchanged_workflow_is_a_failed_precondition() -> Result<()> {
    let (bus, client) = setup().await?;
    let project = client.create("u1", "P", "").await?;
    let source = "a: {type: data, title: A}";

    client.update_workflow("u1", project.id, source).await?;

    let mut sub = bus.subscribe(subject::EVENTS_ALL).await?;
    let err = client.update_workflow("u1", project.id, source).await.unwrap_err();
    assert_eq!(err.code, Code::FailedPrecondition);
    assert_eq!(err.message, "nothing changed");

    // And no events were published for the rejected call.
    bus.publish("events.sentinel", bytes::Bytes::new()).await?;
    let delivery = sub.next().await.unwrap();
    assert_eq!(delivery.subject, "events.sentinel");
    Ok(())
}

#[tokio::test]
async fn malformed_or_cyclic_source_is_invalid() -> Result<()> {
    let (_bus, client) = setup().await?;
    let project = client.create("u1", "P", "").await?;

    let err = client.update_workflow("u1", project.id, "a: [oops").await.unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);

    let cyclic = "a: {type: compute, input: [y], output: [x]}\nb: {type: compute, input: [x], output: [y]}";
    let err = client.update_workflow("u1", project.id, cyclic).await.unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
    assert!(err.message.contains("cycle"), "unexpected message: {}", err.message);
    Ok(())
}

#[tokio::test]
async fn get_returns_only_the_latest_revision() -> Result<()> {
    let (_bus, client) = setup().await?;
    let project = client.create("u1", "P", "").await?;

    client.update_workflow("u1", project.id, "a: {type: data, title: A}").await?;
    client.update_workflow("u1", project.id, "a: {type: data, title: A2}").await?;

    let view = client.get("u1", project.id).await?;
    assert_eq!(view.workflow.nodes["a"].title, "A2");
    assert!(view.workflow.id.is_some());

    // Wrong account cannot see it.
    let err = client.get("u2", project.id).await.unwrap_err();
    assert_eq!(err.code, Code::NotFound);
    Ok(())
}

#[tokio::test]
async fn list_is_scoped_to_the_account() -> Result<()> {
    let (_bus, client) = setup().await?;
    client.create("u1", "A", "").await?;
    client.create("u1", "B", "").await?;
    client.create("u2", "C", "").await?;

    let mine = client.list("u1").await?;
    let mut names: Vec<_> = mine.iter().map(|p| p.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["A", "B"]);
    Ok(())
}

#[tokio::test]
async fn rename_frees_the_old_name() -> Result<()> {
    let (_bus, client) = setup().await?;
    let project = client.create("u1", "Old", "").await?;

    client.update("u1", project.id, "New", "renamed").await?;

    // Old name is reusable, new name is taken.
    client.create("u1", "Old", "").await?;
    let err = client.create("u1", "new", "").await.unwrap_err();
    assert_eq!(err.code, Code::AlreadyExists);
    Ok(())
}

#[tokio::test]
async fn delete_removes_the_project_and_publishes() -> Result<()> {
    let (bus, client) = setup().await?;
    let project = client.create("u1", "P", "").await?;

    let mut sub = bus.subscribe(subject::EVENTS_ALL).await?;
    client.delete("u1", project.id).await?;

    let event = next_event(&mut sub).await;
    assert_eq!(event.kind, kind::PROJECT_DELETED);

    let err = client.get("u1", project.id).await.unwrap_err();
    assert_eq!(err.code, Code::NotFound);

    // The name is free again.
    client.create("u1", "P", "").await?;
    Ok(())
}
