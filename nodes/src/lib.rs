mod client;
mod service;

pub use client::NodeClient;
pub use service::NodeService;
