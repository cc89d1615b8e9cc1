mod client;
mod service;

pub use client::DataClient;
pub use service::DataService;
