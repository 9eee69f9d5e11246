//! Solr HTTP client.
//!
//! Queries go over the read connection; adds, deletes, commits and optimizes
//! go over the write connection, which carries basic-auth credentials when
//! configured. All bodies use Solr's JSON update/select format.

use std::time::Duration;

use async_trait::async_trait;
use flare_types::{Document, SolrSettings, VerifyMode};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::backend::{QueryResponse, SearchBackend, SearchOptions};
use crate::error::SearchError;

/// Connection settings for [`SolrClient`].
#[derive(Debug, Clone)]
pub struct SolrClientConfig {
    /// Core URL used for queries, e.g. `http://localhost:8983/solr/default`
    pub read_url: String,
    /// Core URL used for mutations
    pub write_url: String,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    /// Request and connect timeouts of the read connection
    pub read_timeout: Duration,
    pub open_timeout: Duration,
    /// Request and connect timeouts of the write connection
    pub write_timeout: Duration,
    pub write_open_timeout: Duration,
    pub verify_mode: VerifyMode,
}

impl SolrClientConfig {
    /// Same URL for reads and writes, default timeouts, no credentials.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        let defaults = SolrSettings::default();
        Self {
            read_url: url.clone(),
            write_url: url,
            user: None,
            password: None,
            read_timeout: defaults.read_timeout(),
            open_timeout: defaults.open_timeout(),
            write_timeout: defaults.write_timeout(),
            write_open_timeout: defaults.write_open_timeout(),
            verify_mode: VerifyMode::Peer,
        }
    }

    pub fn from_settings(settings: &SolrSettings) -> Self {
        Self {
            read_url: settings.read_url(),
            write_url: settings.write_url(),
            user: settings.user.clone(),
            password: settings.pass.clone().map(SecretString::from),
            read_timeout: settings.read_timeout(),
            open_timeout: settings.open_timeout(),
            write_timeout: settings.write_timeout(),
            write_open_timeout: settings.write_open_timeout(),
            verify_mode: settings.verify_mode,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_write_url(mut self, url: impl Into<String>) -> Self {
        self.write_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

/// [`SearchBackend`] backed by a Solr core.
pub struct SolrClient {
    read: Client,
    write: Client,
    config: SolrClientConfig,
}

impl SolrClient {
    pub fn new(config: SolrClientConfig) -> Result<Self, SearchError> {
        let read = build_client(config.read_timeout, config.open_timeout, config.verify_mode)?;
        let write = build_client(
            config.write_timeout,
            config.write_open_timeout,
            config.verify_mode,
        )?;
        Ok(Self { read, write, config })
    }

    pub fn from_settings(settings: &SolrSettings) -> Result<Self, SearchError> {
        Self::new(SolrClientConfig::from_settings(settings))
    }

    pub fn read_url(&self) -> &str {
        &self.config.read_url
    }

    pub fn write_url(&self) -> &str {
        &self.config.write_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.user {
            Some(user) => request.basic_auth(
                user,
                self.config.password.as_ref().map(|p| p.expose_secret().to_string()),
            ),
            None => request,
        }
    }

    async fn update(&self, body: Value) -> Result<(), SearchError> {
        let url = format!("{}/update", self.config.write_url);
        let request = self
            .write
            .post(&url)
            .query(&[("wt", "json")])
            .header("Content-Type", "application/json")
            .json(&body);

        let response = self.authorize(request).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

fn build_client(
    timeout: Duration,
    connect_timeout: Duration,
    verify_mode: VerifyMode,
) -> Result<Client, SearchError> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .connect_timeout(connect_timeout);
    if verify_mode == VerifyMode::None {
        warn!("TLS certificate verification disabled for search backend");
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder
        .build()
        .map_err(|e| SearchError::Config(e.to_string()))
}

async fn check_status(response: Response) -> Result<Response, SearchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SearchError::Request {
        status: status.as_u16(),
        body,
    })
}

#[derive(Deserialize)]
struct SelectBody {
    response: SelectResponse,
}

#[derive(Deserialize)]
struct SelectResponse {
    #[serde(rename = "numFound")]
    num_found: u64,
    #[serde(default)]
    docs: Vec<Document>,
}

#[async_trait]
impl SearchBackend for SolrClient {
    async fn add(&self, documents: &[Document]) -> Result<(), SearchError> {
        if documents.is_empty() {
            return Ok(());
        }
        debug!(count = documents.len(), "Adding documents");
        self.update(serde_json::to_value(documents).map_err(|e| {
            SearchError::InvalidResponse(format!("document not serializable: {}", e))
        })?)
        .await
    }

    async fn delete_by_id(&self, uids: &[String]) -> Result<(), SearchError> {
        if uids.is_empty() {
            return Ok(());
        }
        debug!(count = uids.len(), "Deleting documents by id");
        self.update(json!({ "delete": uids })).await
    }

    async fn delete_by_query(&self, query: &str) -> Result<(), SearchError> {
        debug!(query, "Deleting documents by query");
        self.update(json!({ "delete": { "query": query } })).await
    }

    async fn commit(&self, soft: bool) -> Result<(), SearchError> {
        debug!(soft, "Committing");
        self.update(json!({ "commit": { "softCommit": soft } })).await
    }

    async fn optimize(&self) -> Result<(), SearchError> {
        debug!("Optimizing");
        self.update(json!({ "optimize": {} })).await
    }

    async fn select(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<QueryResponse, SearchError> {
        let url = format!("{}/select", self.config.read_url);
        let mut params: Vec<(&str, String)> = vec![("q", query.to_string()), ("wt", "json".to_string())];
        if let Some(start) = options.start {
            params.push(("start", start.to_string()));
        }
        if let Some(rows) = options.rows {
            params.push(("rows", rows.to_string()));
        }
        if let Some(sort) = &options.sort {
            params.push(("sort", sort.clone()));
        }
        if !options.fields.is_empty() {
            params.push(("fl", options.fields.join(",")));
        }

        let response = self.read.get(&url).query(&params).send().await?;
        let response = check_status(response).await?;
        let body: SelectBody = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        Ok(QueryResponse {
            num_found: body.response.num_found,
            docs: body.response.docs,
        })
    }

    fn name(&self) -> &str {
        "solr"
    }
}
