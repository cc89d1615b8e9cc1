use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::debug;

use labtrail_proto::{subject_matches, Status, TraceId};

use crate::{Bus, Delivery, RequestContext, RequestHandler, Subscription};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// In-process bus: all services of one deployment share it behind an `Arc`.
///
/// Requests run the responder inline under the configured deadline; expiry
/// drops the handler future, which is how cancellation propagates. Publishes
/// push into unbounded per-subscriber channels, so a single publisher's
/// messages reach each subscriber in publish order.
pub struct LocalBus {
    responders: RwLock<BTreeMap<String, Arc<dyn RequestHandler>>>,
    subscribers: RwLock<Vec<Subscriber>>,
    request_timeout: Duration,
    closed: AtomicBool,
}

struct Subscriber {
    pattern: String,
    tx: mpsc::UnboundedSender<Delivery>,
}

impl LocalBus {
    pub fn new() -> Arc<Self> { Self::with_request_timeout(DEFAULT_REQUEST_TIMEOUT) }

    pub fn with_request_timeout(request_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            responders: RwLock::new(BTreeMap::new()),
            subscribers: RwLock::new(Vec::new()),
            request_timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// Stop accepting work. In-flight handlers finish on their own; open
    /// subscriptions drain whatever was already delivered and then end.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscribers.write().await.clear();
        self.responders.write().await.clear();
    }

    fn check_open(&self) -> Result<(), Status> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Status::unavailable("bus is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Bus for LocalBus {
    async fn request(&self, subject: &str, payload: Bytes) -> Result<Bytes, Status> {
        self.check_open()?;
        let handler = {
            let responders = self.responders.read().await;
            responders.get(subject).cloned().ok_or_else(|| Status::unavailable(format!("no responder for {subject}")))?
        };

        let trace = TraceId::new();
        let deadline = Instant::now() + self.request_timeout;
        let ctx = RequestContext::new(trace, Some(deadline));
        debug!(%subject, trace = %ctx.trace, "bus request");

        match tokio::time::timeout_at(deadline, handler.handle(ctx, payload)).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded(format!("request to {subject} timed out"))),
        }
    }

    async fn serve(&self, subject: &str, handler: Arc<dyn RequestHandler>) -> Result<(), Status> {
        self.check_open()?;
        let mut responders = self.responders.write().await;
        if responders.contains_key(subject) {
            return Err(Status::already_exists(format!("responder already registered for {subject}")));
        }
        responders.insert(subject.to_string(), handler);
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), Status> {
        self.check_open()?;
        let mut dead = false;
        {
            let subscribers = self.subscribers.read().await;
            for sub in subscribers.iter() {
                if subject_matches(&sub.pattern, subject) {
                    let delivery = Delivery { subject: subject.to_string(), payload: payload.clone() };
                    if sub.tx.send(delivery).is_err() {
                        dead = true;
                    }
                }
            }
        }
        if dead {
            let mut subscribers = self.subscribers.write().await;
            subscribers.retain(|sub| !sub.tx.is_closed());
        }
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, Status> {
        self.check_open()?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.push(Subscriber { pattern: pattern.to_string(), tx });
        Ok(Subscription { rx })
    }
}
