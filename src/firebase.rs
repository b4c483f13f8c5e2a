//! Firebase Realtime Database over its REST streaming API.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    sse::{Event, EventDecoder},
    store::{RealtimeStore, Snapshot, SnapshotStream, StoreError, Subscription},
};

pub struct Firebase {
    client: reqwest::Client,
    database_url: String,
}

impl Firebase {
    pub fn new(database_url: &str) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            database_url: database_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.database_url, path.trim_matches('/'))
    }
}

impl RealtimeStore for Firebase {
    fn subscribe(&self, path: &str) -> (Subscription, SnapshotStream) {
        let (tx, rx) = mpsc::channel(16);
        let client = self.client.clone();
        let url = self.url(path);

        let task = tokio::task::spawn_local(async move {
            if let Err(err) = stream_snapshots(&client, &url, &tx).await {
                log::error!("subscription to {url} ended: {err}");
                _ = tx.send(Err(err)).await;
            }
        });

        (Subscription::new(task), ReceiverStream::new(rx))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.client
            .put(self.url(path))
            .timeout(Duration::from_secs(10))
            .json(&value)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

async fn stream_snapshots(
    client: &reqwest::Client,
    url: &str,
    tx: &mpsc::Sender<Result<Snapshot, StoreError>>,
) -> Result<(), StoreError> {
    let response = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()?;

    let mut body = std::pin::pin!(response.bytes_stream());
    let mut decoder = EventDecoder::default();
    let mut tree = Value::Null;

    loop {
        let chunk = tokio::select! {
            _ = tx.closed() => return Ok(()),
            chunk = body.next() => chunk,
        };

        let Some(chunk) = chunk else {
            return Err(StoreError::Closed);
        };

        for event in decoder.feed(&chunk?) {
            if !apply_event(&mut tree, &event)? {
                continue;
            }

            let snapshot = (!tree.is_null()).then(|| tree.clone());
            if tx.send(Ok(snapshot)).await.is_err() {
                return Ok(());
            }
        }
    }
}

/// Applies one server event to the mirrored tree. Returns whether the tree may have changed.
fn apply_event(tree: &mut Value, event: &Event) -> Result<bool, StoreError> {
    match event.name.as_str() {
        "put" => {
            let PathData { path, data } = serde_json::from_str(&event.data)?;
            put(tree, &path, data);
            prune(tree);
            Ok(true)
        }
        "patch" => {
            let PathData { path, data } = serde_json::from_str(&event.data)?;
            let Value::Object(children) = data else {
                return Err(StoreError::Malformed(format!(
                    "patch at {path} is not an object"
                )));
            };
            for (key, value) in children {
                put(tree, &format!("{}/{key}", path.trim_end_matches('/')), value);
            }
            prune(tree);
            Ok(true)
        }
        "keep-alive" => Ok(false),
        "cancel" => Err(StoreError::Cancelled(
            "read permission revoked or path invalid".to_owned(),
        )),
        "auth_revoked" => Err(StoreError::Cancelled("credential expired".to_owned())),
        other => {
            log::debug!("ignoring unknown event {other}");
            Ok(false)
        }
    }
}

/// The database has no empty objects; deleting the last child deletes the record.
fn prune(tree: &mut Value) {
    if tree.as_object().is_some_and(Map::is_empty) {
        *tree = Value::Null;
    }
}

/// Stores `data` at `path` relative to `tree`; `null` deletes.
fn put(tree: &mut Value, path: &str, data: Value) {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(leaf) = segments.pop() else {
        *tree = data;
        return;
    };

    let mut node = tree;
    for segment in segments {
        if data.is_null() {
            match node.get_mut(segment) {
                Some(child) => node = child,
                None => return,
            }
            continue;
        }

        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Some(map) = node.as_object_mut() else {
            return;
        };
        node = map.entry(segment).or_insert(Value::Null);
    }

    if data.is_null() {
        if let Some(map) = node.as_object_mut() {
            map.remove(leaf);
        }
        return;
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Some(map) = node.as_object_mut() {
        map.insert(leaf.to_owned(), data);
    }
}
