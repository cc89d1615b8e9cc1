use std::sync::Arc;

use labtrail_bus::{call, Bus};
use labtrail_proto::{
    subject, AddFilesRequest, CreateNodeRequest, FileRef, GetNodeReply, GetNodeRequest, NodeKind, NodeReply, ObjectId,
    ProjectId, RemoveFilesRequest, SetNotesRequest, SetTitleRequest, Status,
};

/// Typed client for the node service endpoints.
#[derive(Clone)]
pub struct NodeClient {
    bus: Arc<dyn Bus>,
}

impl NodeClient {
    pub fn new(bus: Arc<dyn Bus>) -> Self { Self { bus } }

    pub async fn create(&self, project: ProjectId, id: &str, kind: NodeKind, title: &str) -> Result<(), Status> {
        let req = CreateNodeRequest { project, id: id.into(), kind, title: title.into() };
        let _: NodeReply = call(self.bus.as_ref(), subject::nodes::CREATE, &req).await?;
        Ok(())
    }

    pub async fn set_title(&self, project: ProjectId, id: &str, title: &str) -> Result<(), Status> {
        let req = SetTitleRequest { project, id: id.into(), title: title.into() };
        let _: NodeReply = call(self.bus.as_ref(), subject::nodes::SET_TITLE, &req).await?;
        Ok(())
    }

    pub async fn set_notes(&self, project: ProjectId, id: &str, account: &str, notes: &str) -> Result<(), Status> {
        let req = SetNotesRequest { project, id: id.into(), account: account.into(), notes: notes.into() };
        let _: NodeReply = call(self.bus.as_ref(), subject::nodes::SET_NOTES, &req).await?;
        Ok(())
    }

    pub async fn add_files(&self, project: ProjectId, id: &str, account: &str, files: Vec<FileRef>) -> Result<(), Status> {
        let req = AddFilesRequest { project, id: id.into(), account: account.into(), files };
        let _: NodeReply = call(self.bus.as_ref(), subject::nodes::ADD_FILES, &req).await?;
        Ok(())
    }

    pub async fn remove_files(&self, project: ProjectId, id: &str, account: &str, file_ids: Vec<ObjectId>) -> Result<(), Status> {
        let req = RemoveFilesRequest { project, id: id.into(), account: account.into(), file_ids };
        let _: NodeReply = call(self.bus.as_ref(), subject::nodes::REMOVE_FILES, &req).await?;
        Ok(())
    }

    pub async fn get(&self, project: ProjectId, id: &str) -> Result<GetNodeReply, Status> {
        let req = GetNodeRequest { project, id: id.into() };
        call(self.bus.as_ref(), subject::nodes::GET, &req).await
    }
}
