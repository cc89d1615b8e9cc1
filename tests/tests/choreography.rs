//! End-to-end flows across the services: the project service publishes,
//! the commit log and the node projection both consume the same stream.

use labtrail_proto::{event::kind, Code, NodeKind, ObjectState, UpdateObjectRequest};
use labtrail_tests::{settle, spawn_stack};

#[tokio::test]
async fn workflow_update_lands_in_the_log_in_emission_order() -> anyhow::Result<()> {
    let stack = spawn_stack().await?;

    let project = stack.projects.create("u1", "P", "").await?;
    stack.projects.update_workflow("u1", project.id, "a: {type: data, title: A}").await?;
    settle().await;

    // Pending returns the unsealed suffix newest-first.
    let pending = stack.commits.pending(project.id).await?.events;
    let kinds: Vec<&str> = pending.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, [kind::NODE_ADDED, kind::PROJECT_CREATED]);
    assert!(pending[0].id > pending[1].id);

    let added: serde_json::Value = serde_json::from_slice(&pending[0].data)?;
    assert_eq!(added["node"]["key"], "a");
    assert_eq!(added["node"]["type"], "DATA");
    assert_eq!(added["node"]["title"], "A");
    Ok(())
}

#[tokio::test]
async fn commit_seals_the_suffix_and_history_replays_it() -> anyhow::Result<()> {
    let stack = spawn_stack().await?;

    let project = stack.projects.create("u1", "P", "").await?;
    stack.projects.update_workflow("u1", project.id, "a: {type: data, title: A}").await?;
    settle().await;

    let c1 = stack.commits.commit(project.id, "u1", "init").await?;

    let reply = stack.commits.history(project.id, None).await?;
    let commit = reply.commit.expect("one commit");
    assert_eq!(commit.id, c1);
    assert_eq!(commit.msg, "init");
    let kinds: Vec<&str> = commit.events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, [kind::NODE_ADDED, kind::PROJECT_CREATED]);
    assert!(reply.next.is_none());

    assert!(stack.commits.pending(project.id).await?.events.is_empty());
    Ok(())
}

#[tokio::test]
async fn rename_and_input_growth_emit_the_expected_sequence() -> anyhow::Result<()> {
    let stack = spawn_stack().await?;

    let project = stack.projects.create("u1", "P", "").await?;
    stack.projects.update_workflow("u1", project.id, "a: {type: data, title: A, input: [], output: [x]}").await?;
    settle().await;
    stack.commits.commit(project.id, "u1", "baseline").await?;

    stack.projects.update_workflow("u1", project.id, "a: {type: data, title: B, input: [y], output: [x]}").await?;
    settle().await;

    let pending = stack.commits.pending(project.id).await?.events;
    let kinds: Vec<&str> = pending.iter().map(|e| e.kind.as_str()).collect();
    // Newest-first, so the rename was emitted before the input delta.
    assert_eq!(kinds, [kind::NODE_INPUT_ADDED, kind::NODE_RENAMED]);

    let renamed: serde_json::Value = serde_json::from_slice(&pending[1].data)?;
    assert_eq!(renamed["node"]["from"], "A");
    assert_eq!(renamed["node"]["to"], "B");
    Ok(())
}

#[tokio::test]
async fn second_identical_workflow_update_changes_nothing_anywhere() -> anyhow::Result<()> {
    let stack = spawn_stack().await?;

    let project = stack.projects.create("u1", "P", "").await?;
    let source = "a: {type: data, title: A}";
    stack.projects.update_workflow("u1", project.id, source).await?;
    settle().await;
    let before = stack.commits.pending(project.id).await?.events.len();

    let err = stack.projects.update_workflow("u1", project.id, source).await.unwrap_err();
    assert_eq!(err.code, Code::FailedPrecondition);
    settle().await;

    assert_eq!(stack.commits.pending(project.id).await?.events.len(), before);
    Ok(())
}

#[tokio::test]
async fn the_projection_follows_workflow_revisions() -> anyhow::Result<()> {
    let stack = spawn_stack().await?;

    let project = stack.projects.create("u1", "P", "").await?;
    stack.projects.update_workflow("u1", project.id, "a: {type: data, title: A}").await?;
    settle().await;

    let node = stack.nodes.get(project.id, "a").await?;
    assert_eq!(node.kind, NodeKind::Data);
    assert_eq!(node.title, "A");
    assert_eq!(node.notes, "");
    assert!(node.files.is_empty());

    // A rename in the next revision retitles the projected node.
    stack.projects.update_workflow("u1", project.id, "a: {type: data, title: B}").await?;
    settle().await;
    assert_eq!(stack.nodes.get(project.id, "a").await?.title, "B");
    Ok(())
}

#[tokio::test]
async fn notes_and_files_flow_into_the_commit_log_but_not_the_projection() -> anyhow::Result<()> {
    let stack = spawn_stack().await?;

    let project = stack.projects.create("u1", "P", "").await?;
    stack.projects.update_workflow("u1", project.id, "a: {type: data, title: A}").await?;
    settle().await;
    stack.commits.commit(project.id, "u1", "baseline").await?;

    // Attach an uploaded object to the node.
    let object = stack.data.upload().await?;
    stack
        .nodes
        .add_files(project.id, "a", "u1", vec![labtrail_proto::FileRef { id: object.id, name: "raw.csv".into() }])
        .await?;
    stack.nodes.set_notes(project.id, "a", "u1", "first pass").await?;
    settle().await;

    let pending = stack.commits.pending(project.id).await?.events;
    let kinds: Vec<&str> = pending.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, [kind::NODE_UPDATED_NOTES, kind::NODE_ADDED_FILES]);

    // The authoritative copy lives in the node service.
    let node = stack.nodes.get(project.id, "a").await?;
    assert_eq!(node.notes, "first pass");
    assert_eq!(node.files.len(), 1);
    Ok(())
}

#[tokio::test]
async fn commits_page_backwards_over_revision_batches() -> anyhow::Result<()> {
    let stack = spawn_stack().await?;

    let project = stack.projects.create("u1", "P", "").await?;
    stack.projects.update_workflow("u1", project.id, "a: {type: data, title: A}").await?;
    settle().await;
    let c1 = stack.commits.commit(project.id, "u1", "first").await?;

    stack.projects.update_workflow("u1", project.id, "a: {type: data, title: A}\nb: {type: manual, title: B}").await?;
    settle().await;
    let c2 = stack.commits.commit(project.id, "u1", "second").await?;

    let page = stack.commits.history(project.id, None).await?;
    let commit = page.commit.unwrap();
    assert_eq!(commit.id, c2);
    assert_eq!(commit.events.len(), 1); // just node.added for "b"
    assert_eq!(page.next, Some(c1));

    let page = stack.commits.history(project.id, Some(c1)).await?;
    let commit = page.commit.unwrap();
    // project.created + node.added for "a"
    assert_eq!(commit.events.len(), 2);
    assert!(page.next.is_none());
    Ok(())
}

#[tokio::test]
async fn uploaded_objects_complete_their_lifecycle() -> anyhow::Result<()> {
    let stack = spawn_stack().await?;

    let reply = stack.data.upload().await?;
    assert!(reply.signed_url.contains("verb=PUT"));

    stack
        .data
        .update(UpdateObjectRequest {
            id: reply.id,
            state: ObjectState::InProgress,
            error: String::new(),
            import_time: 1,
            put_time: 0,
            hash: String::new(),
            size: 0,
            mediatype: String::new(),
        })
        .await?;
    stack
        .data
        .update(UpdateObjectRequest {
            id: reply.id,
            state: ObjectState::Done,
            error: String::new(),
            import_time: 0,
            put_time: 2,
            hash: "sha256:feed".into(),
            size: 10,
            mediatype: "text/csv".into(),
        })
        .await?;

    let desc = stack.data.describe(reply.id).await?;
    assert_eq!(desc.state, ObjectState::Done);

    let err = stack
        .data
        .update(UpdateObjectRequest {
            id: reply.id,
            state: ObjectState::Done,
            error: String::new(),
            import_time: 0,
            put_time: 3,
            hash: String::new(),
            size: 0,
            mediatype: String::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, Code::FailedPrecondition);
    Ok(())
}

#[tokio::test]
async fn deleting_a_project_keeps_its_event_history() -> anyhow::Result<()> {
    let stack = spawn_stack().await?;

    let project = stack.projects.create("u1", "P", "").await?;
    stack.projects.update_workflow("u1", project.id, "a: {type: data, title: A}").await?;
    stack.projects.delete("u1", project.id).await?;
    settle().await;

    let err = stack.projects.get("u1", project.id).await.unwrap_err();
    assert_eq!(err.code, Code::NotFound);

    // Events survive the project record, project.deleted included.
    let pending = stack.commits.pending(project.id).await?.events;
    let kinds: Vec<&str> = pending.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, [kind::PROJECT_DELETED, kind::NODE_ADDED, kind::PROJECT_CREATED]);
    Ok(())
}
