/// Hosted document store: paths, versioned documents, live subscriptions
/// and compare-and-swap updates.

mod http;
#[cfg(test)]
pub(crate) mod memory;
mod watch;

pub use http::HttpDocumentStore;
pub use watch::WatcherSet;

use crate::error::{Error, Result};
use crate::listeners::Subscription;
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Slash-separated address of one document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath(Vec<String>);

impl DocumentPath {
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();

        if segments.is_empty() {
            return Err(Error::InvalidInput("empty document path".to_string()));
        }
        if let Some(bad) = segments.iter().find(|s| s.is_empty() || s.contains('/')) {
            return Err(Error::InvalidInput(format!("bad path segment {:?}", bad)));
        }

        Ok(DocumentPath(segments))
    }

    /// `users/{uid}/{name}`
    pub fn user_document(uid: &str, name: &str) -> Result<Self> {
        DocumentPath::new(["users", uid, name])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Monotonic per-document write counter used for compare-and-swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub data: Value,
    pub version: Version,
}

/// Called with the latest snapshot, or `None` once the document is gone
pub type SnapshotListener = Rc<dyn Fn(Option<&Document>)>;

#[async_trait(?Send)]
pub trait DocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>>;

    /// Deep-merge `fields` into the document, creating it if needed
    async fn merge(&self, path: &DocumentPath, fields: Value) -> Result<Version>;

    /// Replace the document only if it is still at `expected`
    /// (`None` meaning "must not exist yet"). Fails with `Error::Conflict`.
    async fn compare_and_set(
        &self,
        path: &DocumentPath,
        expected: Option<Version>,
        data: Value,
    ) -> Result<Version>;

    fn subscribe(&self, path: &DocumentPath, listener: SnapshotListener) -> Subscription;

    /// Re-read watched documents. Stores that push changes need not poll.
    async fn poll(&self) -> Result<()> {
        Ok(())
    }
}

/// Merge `patch` into `target`: objects recursively, anything else replaced
pub fn merge_values(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if let Some(existing) = target.get_mut(&key) {
                    if existing.is_object() && value.is_object() {
                        merge_values(existing, value);
                        continue;
                    }
                }
                target.insert(key, value);
            }
        }
        (target, patch) => *target = patch,
    }
}

/// What a mutation decided about the document it was handed
#[derive(Debug, Clone, PartialEq)]
pub enum Change<R> {
    Write(R),
    /// Nothing to store; the update ends without writing
    Unchanged(R),
}

/// Read, mutate a copy, compare-and-swap; retry on conflict.
///
/// An error from `mutate` aborts without writing. A missing document starts
/// from `T::default()`.
pub async fn update_document<T, R>(
    store: &dyn DocumentStore,
    path: &DocumentPath,
    attempts: u32,
    mut mutate: impl FnMut(&mut T) -> Result<R>,
) -> Result<(T, R)>
where
    T: DeserializeOwned + Serialize + Default,
{
    update_document_if(store, path, attempts, |value: &mut T| {
        mutate(value).map(Change::Write)
    })
    .await
}

/// [`update_document`] for mutations that may find nothing to change
pub async fn update_document_if<T, R>(
    store: &dyn DocumentStore,
    path: &DocumentPath,
    attempts: u32,
    mut mutate: impl FnMut(&mut T) -> Result<Change<R>>,
) -> Result<(T, R)>
where
    T: DeserializeOwned + Serialize + Default,
{
    for attempt in 1..=attempts {
        let (mut value, expected) = match store.get(path).await? {
            Some(document) => (
                serde_json::from_value::<T>(document.data)?,
                Some(document.version),
            ),
            None => (T::default(), None),
        };

        let outcome = match mutate(&mut value)? {
            Change::Write(outcome) => outcome,
            Change::Unchanged(outcome) => return Ok((value, outcome)),
        };

        match store
            .compare_and_set(path, expected, serde_json::to_value(&value)?)
            .await
        {
            Ok(_) => return Ok((value, outcome)),
            Err(Error::Conflict(_)) => {
                debug!("Conflict updating {} (attempt {}/{})", path, attempt, attempts);
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::Conflict(path.to_string()))
}
