use std::sync::Arc;

use labtrail_bus::{call, Bus};
use labtrail_proto::{
    subject, CreateProjectRequest, CreateProjectResponse, DeleteProjectRequest, DeleteProjectResponse,
    GetProjectRequest, GetProjectResponse, ListProjectsRequest, ListProjectsResponse, ProjectId, ProjectView, Status,
    UpdateProjectRequest, UpdateProjectResponse, UpdateWorkflowRequest, UpdateWorkflowResponse,
};

/// Typed client for the project service endpoints.
#[derive(Clone)]
pub struct ProjectClient {
    bus: Arc<dyn Bus>,
}

impl ProjectClient {
    pub fn new(bus: Arc<dyn Bus>) -> Self { Self { bus } }

    pub async fn create(&self, account: &str, name: &str, description: &str) -> Result<ProjectView, Status> {
        let req = CreateProjectRequest { account: account.into(), name: name.into(), description: description.into() };
        let rep: CreateProjectResponse = call(self.bus.as_ref(), subject::project::CREATE, &req).await?;
        Ok(rep.project)
    }

    pub async fn get(&self, account: &str, id: ProjectId) -> Result<ProjectView, Status> {
        let req = GetProjectRequest { account: account.into(), id };
        let rep: GetProjectResponse = call(self.bus.as_ref(), subject::project::GET, &req).await?;
        Ok(rep.project)
    }

    pub async fn list(&self, account: &str) -> Result<Vec<ProjectView>, Status> {
        let req = ListProjectsRequest { account: account.into() };
        let rep: ListProjectsResponse = call(self.bus.as_ref(), subject::project::LIST, &req).await?;
        Ok(rep.projects)
    }

    pub async fn update(&self, account: &str, id: ProjectId, name: &str, description: &str) -> Result<(), Status> {
        let req = UpdateProjectRequest { account: account.into(), id, name: name.into(), description: description.into() };
        let _: UpdateProjectResponse = call(self.bus.as_ref(), subject::project::UPDATE, &req).await?;
        Ok(())
    }

    pub async fn update_workflow(&self, account: &str, id: ProjectId, source: &str) -> Result<(), Status> {
        let req = UpdateWorkflowRequest { account: account.into(), id, source: source.into() };
        let _: UpdateWorkflowResponse = call(self.bus.as_ref(), subject::project::UPDATE_WORKFLOW, &req).await?;
        Ok(())
    }

    pub async fn delete(&self, account: &str, id: ProjectId) -> Result<(), Status> {
        let req = DeleteProjectRequest { account: account.into(), id };
        let _: DeleteProjectResponse = call(self.bus.as_ref(), subject::project::DELETE, &req).await?;
        Ok(())
    }
}
