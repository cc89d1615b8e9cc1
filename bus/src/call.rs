//! Typed call/route glue over the opaque bus: bincode frames in both
//! directions, written once instead of generated per service.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use labtrail_proto::{subject, Event, Status};

use crate::{Bus, RequestContext, RequestHandler};

/// Issue a typed request and decode the typed reply.
pub async fn call<Req, Rep>(bus: &dyn Bus, subj: &str, req: &Req) -> Result<Rep, Status>
where
    Req: Serialize,
    Rep: DeserializeOwned,
{
    let payload = bincode::serialize(req).map_err(|e| Status::internal(format!("encode request: {e}")))?;
    let reply = bus.request(subj, Bytes::from(payload)).await?;
    bincode::deserialize(&reply).map_err(|e| Status::internal(format!("decode reply: {e}")))
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type RouteFn<S, Req, Rep> = Box<dyn Fn(Arc<S>, RequestContext, Req) -> BoxFuture<Result<Rep, Status>> + Send + Sync>;

/// Adapt a typed service method into a [`RequestHandler`].
pub fn route<S, Req, Rep, F, Fut>(service: Arc<S>, f: F) -> Arc<dyn RequestHandler>
where
    S: Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Rep: Serialize + Send + 'static,
    F: Fn(Arc<S>, RequestContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Rep, Status>> + Send + 'static,
{
    let f: RouteFn<S, Req, Rep> = Box::new(move |service, ctx, req| Box::pin(f(service, ctx, req)));
    Arc::new(Route { service, f })
}

struct Route<S, Req, Rep> {
    service: Arc<S>,
    f: RouteFn<S, Req, Rep>,
}

#[async_trait]
impl<S, Req, Rep> RequestHandler for Route<S, Req, Rep>
where
    S: Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Rep: Serialize + Send + 'static,
{
    async fn handle(&self, ctx: RequestContext, payload: Bytes) -> Result<Bytes, Status> {
        let req: Req = bincode::deserialize(&payload).map_err(|e| Status::invalid_argument(format!("decode request: {e}")))?;
        let rep = (self.f)(self.service.clone(), ctx, req).await?;
        let bytes = bincode::serialize(&rep).map_err(|e| Status::internal(format!("encode reply: {e}")))?;
        Ok(Bytes::from(bytes))
    }
}

/// Publish an event envelope on `events.project`.
pub async fn publish_event(bus: &dyn Bus, event: &Event) -> Result<(), Status> {
    let payload = bincode::serialize(event).map_err(|e| Status::internal(format!("encode event: {e}")))?;
    bus.publish(subject::EVENTS_PROJECT, Bytes::from(payload)).await
}

/// Decode an event envelope off a subscription delivery.
pub fn decode_event(payload: &[u8]) -> Result<Event, Status> {
    bincode::deserialize(payload).map_err(|e| Status::internal(format!("decode event: {e}")))
}
