/// Document store over JSON/HTTP
///
/// `GET /documents/{path}` returns `{data, version}` (404 when absent),
/// `PATCH` deep-merges `{data}`, and `PUT` replaces `{data}` guarded by
/// `If-Match: <version>` or `If-None-Match: *`; a failed guard is 412.
/// Live subscriptions are served by [`HttpDocumentStore::poll`].

use super::{Document, DocumentPath, DocumentStore, SnapshotListener, Version, WatcherSet};
use crate::auth::CredentialCell;
use crate::error::{Error, Result};
use crate::listeners::Subscription;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct WriteAck {
    version: Version,
}

pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
    credentials: CredentialCell,
    watchers: WatcherSet,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, credentials: CredentialCell) -> Self {
        HttpDocumentStore {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            watchers: WatcherSet::new(),
        }
    }

    fn document_url(&self, path: &DocumentPath) -> String {
        format!("{}/documents/{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &DocumentPath) -> Result<RequestBuilder> {
        let token = self.credentials.get().ok_or(Error::NotSignedIn)?;
        Ok(self
            .client
            .request(method, self.document_url(path))
            .bearer_auth(token))
    }

    async fn fetch(&self, path: &DocumentPath) -> Result<Option<Document>> {
        let response = self.request(Method::GET, path)?.send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(Error::Storage(format!("GET {} returned {}", path, status))),
        }
    }

    /// Hand a re-read to watchers. A failed read is logged and left for the
    /// next poll; it never fails the write that preceded it.
    fn deliver_fetched(&self, path: &DocumentPath, fetched: Result<Option<Document>>) {
        match fetched {
            Ok(document) => self.watchers.deliver(path, document.as_ref()),
            Err(e) => warn!("Re-reading {} failed: {}", path, e),
        }
    }

    async fn write_ack(path: &DocumentPath, response: reqwest::Response) -> Result<Version> {
        match response.status() {
            StatusCode::PRECONDITION_FAILED => Err(Error::Conflict(path.to_string())),
            status if status.is_success() => Ok(response.json::<WriteAck>().await?.version),
            status => Err(Error::Storage(format!("write to {} returned {}", path, status))),
        }
    }
}

#[async_trait(?Send)]
impl DocumentStore for HttpDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        self.fetch(path).await
    }

    async fn merge(&self, path: &DocumentPath, fields: Value) -> Result<Version> {
        let response = self
            .request(Method::PATCH, path)?
            .json(&json!({ "data": fields }))
            .send()
            .await?;
        let version = Self::write_ack(path, response).await?;

        // Merged contents are only known server-side; re-read for watchers
        if self.watchers.paths().contains(path) {
            let fetched = self.fetch(path).await;
            self.deliver_fetched(path, fetched);
        }
        Ok(version)
    }

    async fn compare_and_set(
        &self,
        path: &DocumentPath,
        expected: Option<Version>,
        data: Value,
    ) -> Result<Version> {
        let request = self.request(Method::PUT, path)?;
        let request = match expected {
            Some(version) => request.header("If-Match", version.0.to_string()),
            None => request.header("If-None-Match", "*"),
        };

        let response = request.json(&json!({ "data": &data })).send().await?;
        let version = Self::write_ack(path, response).await?;

        self.watchers
            .deliver(path, Some(&Document { data, version }));
        Ok(version)
    }

    fn subscribe(&self, path: &DocumentPath, listener: SnapshotListener) -> Subscription {
        debug!("Watching {}", path);
        let id = self.watchers.add(path, listener);
        self.watchers.subscription(id)
    }

    async fn poll(&self) -> Result<()> {
        for path in self.watchers.paths() {
            let fetched = self.fetch(&path).await;
            self.deliver_fetched(&path, fetched);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_document_url() {
        let store = HttpDocumentStore::new("https://docs.example.test/", CredentialCell::default());
        let path = DocumentPath::user_document("u1", "labels").unwrap();

        assert_eq!(
            store.document_url(&path),
            "https://docs.example.test/documents/users/u1/labels"
        );
    }

    #[test]
    fn test_requests_need_a_credential() {
        let store = HttpDocumentStore::new("https://docs.example.test", CredentialCell::default());
        let path = DocumentPath::user_document("u1", "labels").unwrap();

        assert!(matches!(
            store.request(Method::GET, &path),
            Err(Error::NotSignedIn)
        ));
    }

    #[test]
    fn test_write_ack_shape() {
        let ack: WriteAck = serde_json::from_str(r#"{"version": 7}"#).unwrap();

        assert_eq!(ack.version, Version(7));
    }

    #[test]
    fn test_failed_reread_is_not_delivered() {
        let store = HttpDocumentStore::new("https://docs.example.test", CredentialCell::default());
        let path = DocumentPath::user_document("u1", "theme").unwrap();
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let _subscription = store.subscribe(&path, Rc::new(move |_: Option<&Document>| counter.set(counter.get() + 1)));

        store.deliver_fetched(&path, Err(Error::Http("connection reset".to_string())));
        assert_eq!(seen.get(), 0);

        let document = Document {
            data: json!({"mode": "dark"}),
            version: Version(3),
        };
        store.deliver_fetched(&path, Ok(Some(document)));
        assert_eq!(seen.get(), 1);
    }
}
