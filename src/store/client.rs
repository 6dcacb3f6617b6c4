//! Typed client for the document store REST API

use super::types::{
    AllDocsQuery, AllDocsResponse, BulkDocResult, ChangesQuery, ChangesResponse, DbInfo,
    FindRequest, FindResponse, IndexQuery, KeyRange, SearchResponse, ServerInfo, ViewResponse,
};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig, RetryPolicy};
use crate::types::{JsonValue, ID_FIELD};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Client for one store account
///
/// Clones share the underlying connection pool and credentials.
#[derive(Debug, Clone)]
pub struct CouchClient {
    http: Arc<HttpClient>,
    base_url: Url,
}

impl CouchClient {
    /// Create a client from an HTTP client and the server root URL
    pub fn new(http: Arc<HttpClient>, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Build a client from connection settings
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let http = HttpClient::with_auth(config.http_client_config()?, config.auth_config()?)?;
        Ok(Self::new(Arc::new(http), config.base_url()?))
    }

    /// Server root URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Underlying HTTP client
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// URL for a database, optionally followed by `/`-separated sub-path segments
    ///
    /// The database name is one percent-encoded segment, so names containing
    /// `/` or `+` address the right database.
    pub fn db_url(&self, db: &str, path: &str) -> Result<String> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::config(format!("Base URL cannot hold a path: {}", self.base_url)))?;
            segments.pop_if_empty().push(db);
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
        }
        Ok(url.to_string())
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, params: Vec<(String, String)>) -> Result<T> {
        self.http
            .get_json_with_config(url, RequestConfig::new().queries(params))
            .await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Vec<(String, String)>,
        body: JsonValue,
    ) -> Result<T> {
        self.http
            .post_json_with_config(url, RequestConfig::new().queries(params).json(body))
            .await
    }

    // ========================================================================
    // Server and database management
    // ========================================================================

    /// `GET /`
    pub async fn server_info(&self) -> Result<ServerInfo> {
        self.http
            .get_json(self.base_url.as_str())
            .await
            .map_err(connection_error)
    }

    /// `GET /{db}`
    pub async fn db_info(&self, db: &str) -> Result<DbInfo> {
        self.get(&self.db_url(db, "")?, Vec::new()).await
    }

    /// `HEAD /{db}`; a 404 means the database is absent
    pub async fn database_exists(&self, db: &str) -> Result<bool> {
        match self.http.head(&self.db_url(db, "")?).await {
            Ok(_) => Ok(true),
            Err(e) if e.status() == Some(404) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// `PUT /{db}`; returns false when it already existed (412)
    pub async fn create_database(&self, db: &str) -> Result<bool> {
        match self.http.put(&self.db_url(db, "")?).await {
            Ok(_) => {
                info!("Created database {db}");
                Ok(true)
            }
            Err(e) if e.status() == Some(412) => {
                debug!("Database {db} already exists");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// `DELETE /{db}`; returns false when it did not exist
    pub async fn delete_database(&self, db: &str) -> Result<bool> {
        match self.http.delete(&self.db_url(db, "")?).await {
            Ok(_) => {
                info!("Deleted database {db}");
                Ok(true)
            }
            Err(e) if e.status() == Some(404) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// `GET /{db}/_all_docs`
    pub async fn all_docs(&self, db: &str, query: &AllDocsQuery) -> Result<AllDocsResponse> {
        if query.range.is_empty() {
            return Ok(AllDocsResponse {
                total_rows: None,
                offset: None,
                rows: Vec::new(),
            });
        }
        self.get(&self.db_url(db, "_all_docs")?, query.to_params()).await
    }

    /// Key found `offset` rows into `range`, if the range holds that many
    pub async fn all_docs_key_at(&self, db: &str, range: &KeyRange, offset: u64) -> Result<Option<String>> {
        let query = AllDocsQuery {
            range: range.clone(),
            after: None,
            skip: Some(offset),
            limit: Some(1),
            include_docs: false,
        };
        let response = self.all_docs(db, &query).await?;
        Ok(response.rows.into_iter().find_map(|row| row.id))
    }

    /// `GET /{db}/_changes`, or `POST` with `filter=_selector` when a selector is set
    pub async fn changes(&self, db: &str, query: &ChangesQuery) -> Result<ChangesResponse> {
        let url = self.db_url(db, "_changes")?;
        match &query.selector {
            Some(selector) => {
                self.post(&url, query.to_params(), json!({ "selector": selector }))
                    .await
            }
            None => self.get(&url, query.to_params()).await,
        }
    }

    /// `GET /{db}/{view path}`
    pub async fn view(&self, db: &str, path: &str, query: &IndexQuery) -> Result<ViewResponse> {
        self.get(&self.db_url(db, path)?, query.to_params()).await
    }

    /// `GET /{db}/{search index path}`
    pub async fn search(&self, db: &str, path: &str, query: &IndexQuery) -> Result<SearchResponse> {
        self.get(&self.db_url(db, path)?, query.to_params()).await
    }

    /// `POST /{db}/_find`
    pub async fn find(&self, db: &str, request: &FindRequest) -> Result<FindResponse> {
        let body = serde_json::to_value(request)?;
        let response: FindResponse = self.post(&self.db_url(db, "_find")?, Vec::new(), body).await?;
        if let Some(warning) = &response.warning {
            debug!("_find on {db}: {warning}");
        }
        Ok(response)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// `POST /{db}/_bulk_docs`
    ///
    /// Resending a document without `_id` would store it twice under a new
    /// generated id, so such batches are only retried when the store
    /// provably never received them.
    pub async fn bulk_docs(&self, db: &str, docs: &[JsonValue]) -> Result<Vec<BulkDocResult>> {
        let retry = if docs.iter().all(|doc| doc.get(ID_FIELD).is_some_and(JsonValue::is_string)) {
            RetryPolicy::Idempotent
        } else {
            RetryPolicy::UnprocessedOnly
        };
        self.http
            .post_json_with_config(
                &self.db_url(db, "_bulk_docs")?,
                RequestConfig::new().json(json!({ "docs": docs })).retry(retry),
            )
            .await
    }

    /// Current revisions of live documents, keyed by id
    pub async fn fetch_revisions(&self, db: &str, ids: &[String]) -> Result<HashMap<String, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let response: AllDocsResponse = self
            .post(&self.db_url(db, "_all_docs")?, Vec::new(), json!({ "keys": ids }))
            .await?;

        Ok(response
            .rows
            .into_iter()
            .filter(|row| row.error.is_none())
            .filter_map(|row| {
                let value = row.value?;
                if value.get("deleted").and_then(JsonValue::as_bool) == Some(true) {
                    return None;
                }
                let rev = value.get("rev")?.as_str()?.to_string();
                Some((row.id?, rev))
            })
            .collect())
    }

    /// Fetch one document by id
    pub async fn get_document(&self, db: &str, id: &str) -> Result<Option<JsonValue>> {
        let mut url = Url::parse(&self.db_url(db, "")?)?;
        url.path_segments_mut()
            .map_err(|()| Error::config("Base URL cannot hold a path"))?
            .pop_if_empty()
            .push(id);
        match self.http.get_json::<JsonValue>(url.as_str()).await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete one document at its current revision
    pub async fn delete_document(&self, db: &str, id: &str, rev: &str) -> Result<BulkDocResult> {
        let docs = [json!({ "_id": id, "_rev": rev, "_deleted": true })];
        let mut results = self.bulk_docs(db, &docs).await?;
        results
            .pop()
            .ok_or_else(|| Error::decode("Empty _bulk_docs response"))
    }
}

fn connection_error(err: Error) -> Error {
    match err {
        Error::Http(e) => Error::connection(e.to_string()),
        other => other,
    }
}
