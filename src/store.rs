use std::{future::Future, rc::Rc};

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("server answered {0}")]
    Status(u16),
    #[error("subscription cancelled: {0}")]
    Cancelled(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("subscription closed by the server")]
    Closed,
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Status(status.as_u16()),
            None => Self::Http(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// The value under a path, `None` if nothing is stored there.
pub type Snapshot = Option<Value>;

pub type SnapshotStream = ReceiverStream<Result<Snapshot, StoreError>>;

/// A hosted key-value tree that pushes changes to subscribers.
pub trait RealtimeStore {
    /// Delivers the current value at `path` and then every change to it. A failure
    /// is delivered once and ends the stream.
    fn subscribe(&self, path: &str) -> (Subscription, SnapshotStream);

    fn set(&self, path: &str, value: Value) -> impl Future<Output = Result<(), StoreError>>;
}

/// Owns the task feeding a subscription; dropping it unsubscribes.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Writes without waiting for the outcome; failures are only logged.
pub fn write_detached<S>(store: Rc<S>, path: String, value: Value)
where
    S: RealtimeStore + 'static,
{
    tokio::task::spawn_local(async move {
        match store.set(&path, value.clone()).await {
            Ok(()) => log::info!("set {path} = {value}"),
            Err(err) => log::error!("failed to set {path} = {value}: {err}"),
        }
    });
}
