use std::sync::Arc;

use labtrail_bus::{call, Bus};
use labtrail_proto::{
    subject, CommitReply, CommitRequest, CommitSeq, HistoryReply, HistoryRequest, PendingReply, PendingRequest,
    ProjectId, Status,
};

/// Typed client for the commit log endpoints.
#[derive(Clone)]
pub struct CommitLogClient {
    bus: Arc<dyn Bus>,
}

impl CommitLogClient {
    pub fn new(bus: Arc<dyn Bus>) -> Self { Self { bus } }

    pub async fn commit(&self, project: ProjectId, author: &str, msg: &str) -> Result<CommitSeq, Status> {
        let req = CommitRequest { project, author: author.into(), msg: msg.into() };
        let rep: CommitReply = call(self.bus.as_ref(), subject::commitlog::COMMIT, &req).await?;
        Ok(rep.id)
    }

    pub async fn history(&self, project: ProjectId, commit: Option<CommitSeq>) -> Result<HistoryReply, Status> {
        let req = HistoryRequest { project, commit };
        call(self.bus.as_ref(), subject::commitlog::HISTORY, &req).await
    }

    pub async fn pending(&self, project: ProjectId) -> Result<PendingReply, Status> {
        let req = PendingRequest { project };
        call(self.bus.as_ref(), subject::commitlog::PENDING, &req).await
    }
}
