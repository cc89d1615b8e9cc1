//! Bus subject hierarchy and wildcard matching.
//!
//! Subjects are dot-separated tokens. Subscriptions may use `*` to match
//! exactly one token and a trailing `>` to match one or more remaining
//! tokens.

/// Subject all project-related events are published on.
pub const EVENTS_PROJECT: &str = "events.project";

/// Ingress pattern used by the commit log and the node projection.
pub const EVENTS_ALL: &str = "events.>";

pub mod project {
    pub const CREATE: &str = "project.CreateProject";
    pub const GET: &str = "project.GetProject";
    pub const LIST: &str = "project.ListProjects";
    pub const UPDATE: &str = "project.UpdateProject";
    pub const UPDATE_WORKFLOW: &str = "project.UpdateWorkflow";
    pub const DELETE: &str = "project.DeleteProject";
}

pub mod commitlog {
    pub const COMMIT: &str = "commitlog.Commit";
    pub const HISTORY: &str = "commitlog.History";
    pub const PENDING: &str = "commitlog.Pending";
}

pub mod nodes {
    pub const CREATE: &str = "nodes.Create";
    pub const SET_TITLE: &str = "nodes.SetTitle";
    pub const SET_NOTES: &str = "nodes.SetNotes";
    pub const ADD_FILES: &str = "nodes.AddFiles";
    pub const REMOVE_FILES: &str = "nodes.RemoveFiles";
    pub const GET: &str = "nodes.Get";
}

pub mod data {
    pub const UPLOAD: &str = "data.Upload";
    pub const IMPORT: &str = "data.Import";
    pub const DESCRIBE: &str = "data.Describe";
    pub const UPDATE: &str = "data.Update";
    pub const GET: &str = "data.Get";
}

/// Returns true when `subject` is covered by `pattern`.
///
/// `>` is only meaningful as the final pattern token and requires at least
/// one remaining subject token. A literal pattern matches only itself.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pat = pattern.split('.');
    let mut sub = subject.split('.').peekable();

    loop {
        match (pat.next(), sub.peek()) {
            (Some(">"), Some(_)) => return true,
            (Some(token), Some(&actual)) => {
                if token != "*" && token != actual {
                    return false;
                }
                sub.next();
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}
