//! The bus every labtrail service talks over.
//!
//! Two primitives: named request/reply endpoints (exactly one responder per
//! subject) and topic pub/sub with wildcard patterns. Implementations carry
//! payloads opaquely; the typed glue in [`call`] frames them with bincode.

mod call;
mod local;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use labtrail_proto::{Status, TraceId};

pub use call::{call, decode_event, publish_event, route};
pub use local::LocalBus;

/// Per-request state handed to every handler: the propagated trace id and
/// the deadline the caller's bus enforces. Cancellation is cooperative —
/// when the deadline passes the handler future is dropped.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub trace: TraceId,
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(trace: TraceId, deadline: Option<Instant>) -> Self { Self { trace, deadline } }
}

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, ctx: RequestContext, payload: Bytes) -> Result<Bytes, Status>;
}

/// A message delivered to a subscription.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subject: String,
    pub payload: Bytes,
}

pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<Delivery> { self.rx.recv().await }
}

#[async_trait]
pub trait Bus: Send + Sync {
    /// Request/reply against the subject's single responder. Errors are the
    /// responder's typed status, or `Unavailable`/`DeadlineExceeded` from
    /// the transport itself.
    async fn request(&self, subject: &str, payload: Bytes) -> Result<Bytes, Status>;

    /// Registers the responder for a subject. A second responder for the
    /// same subject is refused with `AlreadyExists`.
    async fn serve(&self, subject: &str, handler: Arc<dyn RequestHandler>) -> Result<(), Status>;

    /// Fan-out publish. Delivery order is preserved per publisher for any
    /// given subscriber; nothing is guaranteed across publishers.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), Status>;

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, Status>;
}
