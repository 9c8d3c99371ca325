//! CouchDB HTTP adapter
//!
//! | Port operation | Request |
//! |----------------|---------|
//! | `insert`  | `POST /{db}` |
//! | `get`     | `GET /{db}/{id}` |
//! | `info`    | `GET /{db}` |
//! | `create`  | `PUT /{db}` |
//! | `view`    | `GET /{db}/_design/{d}/_view/{v}` |
//! | `follow`  | `GET /{db}/_changes?feed=continuous` |

use async_trait::async_trait;
use bytes::BytesMut;
use futures::stream::{self, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::domain::{Auth, Change, ConnectionSettings, DatabaseInfo, FeedOptions, NativeRangeQuery};
use crate::error::StoreError;
use crate::ports::{ChangeFeed, DocumentReceipt, DocumentStore, DocumentStoreFactory};

/// Error body CouchDB sends with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct CouchErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct ViewResponse {
    #[serde(default)]
    rows: Vec<ViewRow>,
}

#[derive(Debug, Deserialize)]
struct ViewRow {
    #[serde(default)]
    value: Value,
}

/// Client for one CouchDB database.
pub struct CouchDbClient {
    client: Client,
    base: Url,
    db: String,
    auth: Option<Auth>,
}

impl CouchDbClient {
    pub fn new(settings: &ConnectionSettings) -> Result<Self, StoreError> {
        let base = Url::parse(&settings.url)
            .map_err(|e| StoreError::Transport(format!("invalid url '{}': {e}", settings.url)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Transport(format!(
                "url '{}' cannot carry a path",
                settings.url
            )));
        }

        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .danger_accept_invalid_certs(!settings.secure)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base,
            db: settings.db.clone(),
            auth: settings.auth.clone(),
        })
    }

    /// `/{db}/{segments...}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(&self.db).extend(segments);
        }
        url
    }

    /// Document ids are one segment, except `_design/{name}`.
    fn document_url(&self, id: &str) -> Url {
        match id.strip_prefix("_design/") {
            Some(name) => self.endpoint(&["_design", name]),
            None => self.endpoint(&[id]),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(auth) => request.basic_auth(&auth.username, Some(&auth.password)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        self.authorize(request).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                StoreError::Connection {
                    url: self.base.to_string(),
                    message: e.to_string(),
                }
            } else {
                StoreError::Transport(e.to_string())
            }
        })
    }

    /// Pass 2xx through; turn anything else into [`StoreError::Http`].
    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(Self::http_error(status, response).await)
    }

    async fn http_error(status: StatusCode, response: Response) -> StoreError {
        let body: CouchErrorBody = response.json().await.unwrap_or_default();
        StoreError::Http {
            status: status.as_u16(),
            error: if body.error.is_empty() {
                status.canonical_reason().unwrap_or("unknown").to_string()
            } else {
                body.error
            },
            reason: body.reason,
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for CouchDbClient {
    fn database(&self) -> &str {
        &self.db
    }

    async fn insert(&self, document: Value) -> Result<DocumentReceipt, StoreError> {
        let response = self
            .send(self.client.post(self.endpoint(&[])).json(&document))
            .await?;
        Self::decode(Self::check(response).await?).await
    }

    async fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        let response = self.send(self.client.get(self.document_url(id))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(Self::check(response).await?).await.map(Some)
    }

    async fn info(&self) -> Result<Option<DatabaseInfo>, StoreError> {
        let response = self.send(self.client.get(self.endpoint(&[]))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(Self::check(response).await?).await.map(Some)
    }

    async fn create(&self) -> Result<(), StoreError> {
        let response = self.send(self.client.put(self.endpoint(&[]))).await?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            debug!(db = %self.db, "Database already exists");
            return Ok(());
        }
        Self::check(response).await.map(|_| ())
    }

    async fn view(
        &self,
        design: &str,
        view: &str,
        query: &NativeRangeQuery,
    ) -> Result<Vec<Value>, StoreError> {
        let url = self.endpoint(&["_design", design, "_view", view]);
        let response = self
            .send(self.client.get(url).query(&query.to_query_pairs()))
            .await?;
        let body: ViewResponse = Self::decode(Self::check(response).await?).await?;
        Ok(body.rows.into_iter().map(|row| row.value).collect())
    }

    async fn follow(&self, options: FeedOptions) -> Result<ChangeFeed, StoreError> {
        let url = self.endpoint(&["_changes"]);
        let response = self
            .send(self.client.get(url).query(&options.to_query_pairs()))
            .await?;
        let response = Self::check(response).await?;
        debug!(db = %self.db, since = %options.since, "Change feed connected");

        let mut decoder = ChangeLineDecoder::default();
        let changes = response
            .bytes_stream()
            .map(Some)
            .chain(stream::once(async { None }))
            .map(move |chunk| match chunk {
                Some(Ok(bytes)) => decoder.push(&bytes),
                Some(Err(e)) => vec![Err(StoreError::Feed(e.to_string()))],
                None => decoder.finish().into_iter().collect(),
            })
            .flat_map(stream::iter);
        Ok(changes.boxed())
    }
}

/// Splits a continuous feed body into changes.
///
/// One JSON object per line. Blank lines are heartbeats; the `last_seq`
/// line CouchDB writes when it closes the feed carries no change.
#[derive(Debug, Default)]
pub struct ChangeLineDecoder {
    buffer: BytesMut,
}

impl ChangeLineDecoder {
    /// Feed a chunk; returns every change completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Change, StoreError>> {
        self.buffer.extend_from_slice(chunk);
        let mut changes = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(end + 1).freeze();
            if let Some(change) = Self::decode_line(&line) {
                changes.push(change);
            }
        }
        changes
    }

    /// Decode whatever is left once the body has ended.
    ///
    /// CouchDB may close the feed without terminating the last line.
    pub fn finish(&mut self) -> Option<Result<Change, StoreError>> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = self.buffer.split().freeze();
        trace!(bytes = line.len(), "Decoding unterminated feed line");
        Self::decode_line(&line)
    }

    /// Bytes waiting for their newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn decode_line(line: &[u8]) -> Option<Result<Change, StoreError>> {
        if line.iter().all(u8::is_ascii_whitespace) {
            trace!("Change feed heartbeat");
            return None;
        }
        let value: Value = match serde_json::from_slice(line) {
            Ok(value) => value,
            Err(e) => return Some(Err(StoreError::Decode(e.to_string()))),
        };
        if value.get("seq").is_none() && value.get("last_seq").is_some() {
            return None;
        }
        Some(serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string())))
    }
}

/// Builds [`CouchDbClient`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct CouchDbStoreFactory;

impl DocumentStoreFactory for CouchDbStoreFactory {
    fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn DocumentStore>, StoreError> {
        Ok(Arc::new(CouchDbClient::new(settings)?))
    }
}
