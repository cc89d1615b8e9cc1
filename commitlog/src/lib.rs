mod client;
mod service;

pub use client::CommitLogClient;
pub use service::CommitLogService;
