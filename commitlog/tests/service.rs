use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use labtrail_bus::{publish_event, Bus, LocalBus};
use labtrail_commitlog::{CommitLogClient, CommitLogService};
use labtrail_proto::{Code, Event, EventSeq, ProjectId};
use labtrail_storage_common::StorageEngine;
use labtrail_storage_sled::SledStorageEngine;

async fn setup() -> Result<(Arc<LocalBus>, CommitLogClient)> {
    let bus = LocalBus::new();
    let engine: Arc<dyn StorageEngine> = Arc::new(SledStorageEngine::new_test()?);
    let service = CommitLogService::new(engine, bus.clone());
    service.serve().await?;
    service.run_event_sink().await?;
    Ok((bus.clone(), CommitLogClient::new(bus)))
}

async fn emit(bus: &dyn Bus, project: ProjectId, label: &str) -> Result<()> {
    let event = Event::new(project, 1_700_000_000, "node.added", "u1", &serde_json::json!({ "label": label }))?;
    publish_event(bus, &event).await?;
    Ok(())
}

/// Give the event sink a moment to drain its subscription.
async fn settle() { tokio::time::sleep(Duration::from_millis(100)).await }

#[tokio::test]
async fn commit_on_empty_project_fails() -> Result<()> {
    let (_bus, client) = setup().await?;
    let err = client.commit(ProjectId::new(), "u1", "init").await.unwrap_err();
    assert_eq!(err.code, Code::FailedPrecondition);
    assert_eq!(err.message, "nothing to commit");
    Ok(())
}

#[tokio::test]
async fn commit_requires_a_message() -> Result<()> {
    let (_bus, client) = setup().await?;
    let err = client.commit(ProjectId::new(), "u1", "   ").await.unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
    Ok(())
}

#[tokio::test]
async fn first_commit_seals_everything() -> Result<()> {
    let (bus, client) = setup().await?;
    let project = ProjectId::new();

    emit(bus.as_ref(), project, "e1").await?;
    emit(bus.as_ref(), project, "e2").await?;
    settle().await;

    assert_eq!(client.pending(project).await?.events.len(), 2);

    let commit = client.commit(project, "u1", "init").await?;

    let reply = client.history(project, None).await?;
    let view = reply.commit.expect("one commit");
    assert_eq!(view.id, commit);
    assert_eq!(view.msg, "init");
    assert_eq!(view.events.len(), 2);
    // Newest-first.
    assert!(view.events[0].id > view.events[1].id);
    assert_eq!(reply.next, None);

    assert!(client.pending(project).await?.events.is_empty());
    Ok(())
}

#[tokio::test]
async fn commits_seal_disjoint_ranges() -> Result<()> {
    let (bus, client) = setup().await?;
    let project = ProjectId::new();

    for label in ["e1", "e2", "e3", "e4", "e5"] {
        emit(bus.as_ref(), project, label).await?;
    }
    settle().await;
    let c1 = client.commit(project, "u1", "first").await?;

    emit(bus.as_ref(), project, "e6").await?;
    emit(bus.as_ref(), project, "e7").await?;
    settle().await;
    let c2 = client.commit(project, "u1", "second").await?;

    // Page one: c2 sealing exactly {e6, e7}.
    let page = client.history(project, Some(c2)).await?;
    let view = page.commit.unwrap();
    assert_eq!(view.id, c2);
    let ids: Vec<EventSeq> = view.events.iter().map(|e| e.id).collect();
    assert_eq!(ids, [EventSeq(7), EventSeq(6)]);
    assert_eq!(page.next, Some(c1));

    // Page two: c1 sealing {e1..e5}.
    let page = client.history(project, Some(c1)).await?;
    let view = page.commit.unwrap();
    let ids: Vec<EventSeq> = view.events.iter().map(|e| e.id).collect();
    assert_eq!(ids, [EventSeq(5), EventSeq(4), EventSeq(3), EventSeq(2), EventSeq(1)]);
    assert_eq!(page.next, None);
    Ok(())
}

#[tokio::test]
async fn paging_visits_every_commit_once_newest_first() -> Result<()> {
    let (bus, client) = setup().await?;
    let project = ProjectId::new();

    for round in 0..4 {
        emit(bus.as_ref(), project, &format!("round-{round}")).await?;
        settle().await;
        client.commit(project, "u1", &format!("commit {round}")).await?;
    }

    let mut cursor = None;
    let mut seen = Vec::new();
    loop {
        let page = client.history(project, cursor).await?;
        let view = page.commit.expect("commit present while paging");
        seen.push(view.id);
        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    let mut ordered = seen.clone();
    ordered.sort_by(|a, b| b.cmp(a));
    assert_eq!(seen, ordered, "paging must be newest-first");
    assert_eq!(seen.len(), 4);
    Ok(())
}

#[tokio::test]
async fn sealed_suffix_cannot_be_committed_again() -> Result<()> {
    let (bus, client) = setup().await?;
    let project = ProjectId::new();

    emit(bus.as_ref(), project, "e1").await?;
    settle().await;
    client.commit(project, "u1", "init").await?;

    let err = client.commit(project, "u1", "again").await.unwrap_err();
    assert_eq!(err.code, Code::FailedPrecondition);
    Ok(())
}

#[tokio::test]
async fn concurrent_commits_never_overlap() -> Result<()> {
    let (bus, client) = setup().await?;
    let project = ProjectId::new();

    emit(bus.as_ref(), project, "e1").await?;
    emit(bus.as_ref(), project, "e2").await?;
    settle().await;

    let (a, b) = tokio::join!(client.commit(project, "u1", "racer a"), client.commit(project, "u2", "racer b"));

    // Exactly one racer seals the suffix; the other finds nothing left.
    let outcomes = [a, b];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "outcomes: {outcomes:?}");
    let loss = outcomes.iter().find(|r| r.is_err()).unwrap().as_ref().unwrap_err();
    assert_eq!(loss.code, Code::FailedPrecondition);

    // The sealed window is the whole stream.
    let history = client.history(project, None).await?;
    assert_eq!(history.commit.unwrap().events.len(), 2);
    Ok(())
}

#[tokio::test]
async fn unknown_commit_is_not_found() -> Result<()> {
    let (bus, client) = setup().await?;
    let project = ProjectId::new();
    emit(bus.as_ref(), project, "e1").await?;
    settle().await;
    client.commit(project, "u1", "init").await?;

    let err = client.history(project, Some(labtrail_proto::CommitSeq(99))).await.unwrap_err();
    assert_eq!(err.code, Code::NotFound);
    Ok(())
}

#[tokio::test]
async fn history_of_empty_project_is_empty() -> Result<()> {
    let (_bus, client) = setup().await?;
    let reply = client.history(ProjectId::new(), None).await?;
    assert!(reply.commit.is_none());
    assert!(reply.next.is_none());
    Ok(())
}

#[tokio::test]
async fn events_are_partitioned_by_project() -> Result<()> {
    let (bus, client) = setup().await?;
    let p1 = ProjectId::new();
    let p2 = ProjectId::new();

    emit(bus.as_ref(), p1, "one").await?;
    emit(bus.as_ref(), p2, "two").await?;
    settle().await;

    assert_eq!(client.pending(p1).await?.events.len(), 1);
    assert_eq!(client.pending(p2).await?.events.len(), 1);

    client.commit(p1, "u1", "only p1").await?;
    assert!(client.pending(p1).await?.events.is_empty());
    assert_eq!(client.pending(p2).await?.events.len(), 1);
    Ok(())
}
