//! eBoekhouden REST client.
//!
//! Session-token flow: every call first trades the long-lived API token for
//! a short-lived session token (`POST {base}/v1/session`), which then goes
//! into the `Authorization` header. List endpoints paginate with
//! `limit`/`offset`; pages are 500 items and a safety cap guards runaway
//! pagination.
//!
//! Known upstream quirk: the mutation list contains a placeholder row with
//! `id = 0` that cannot be fetched individually. Listings skip it and a
//! direct fetch of id 0 is rejected client-side.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use verenigingen_accounting::Mutation;

/// Page size used for all list endpoints.
const PAGE_LIMIT: usize = 500;

/// Safety cap on pagination offsets (mirrors the upstream guidance).
const MAX_OFFSET: usize = 50_000;

/// Error classification carried by every client failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Token rejected or expired (401/403). Not retryable.
    Authentication,
    /// Transport problems, rate limits, upstream 5xx. Retryable.
    Connection,
    /// Payload did not parse or violated expectations. Not retryable.
    Data,
}

#[derive(Debug, Error)]
pub enum BoekhoudenError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("data error: {0}")]
    Data(String),
}

impl BoekhoudenError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            BoekhoudenError::Authentication(_) => ErrorType::Authentication,
            BoekhoudenError::Connection(_) => ErrorType::Connection,
            BoekhoudenError::Data(_) => ErrorType::Data,
        }
    }

    /// Whether the migration runner may retry the failed call.
    pub fn retry_possible(&self) -> bool {
        matches!(self, BoekhoudenError::Connection(_))
    }

    fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            BoekhoudenError::Authentication(format!("HTTP {status}: {body}"))
        } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            BoekhoudenError::Connection(format!("HTTP {status}: {body}"))
        } else {
            BoekhoudenError::Data(format!("HTTP {status}: {body}"))
        }
    }
}

impl From<reqwest::Error> for BoekhoudenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            BoekhoudenError::Connection(err.to_string())
        } else if err.is_decode() {
            BoekhoudenError::Data(err.to_string())
        } else {
            BoekhoudenError::Connection(err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    #[serde(rename = "accessToken")]
    access_token: &'a str,
    source: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Chart-of-accounts entry as the REST API reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccountDto {
    pub id: i64,
    pub code: String,
    #[serde(default)]
    pub description: String,
    /// Upstream category ("BAL", "VW", ...), used by the account mapping.
    #[serde(default)]
    pub category: String,
}

/// REST client for the eBoekhouden API.
#[derive(Debug, Clone)]
pub struct BoekhoudenClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    source: String,
}

impl BoekhoudenClient {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            source: "verenigingen".to_string(),
        }
    }

    /// Trade the API token for a short-lived session token.
    async fn session_token(&self) -> Result<String, BoekhoudenError> {
        let url = format!("{}/v1/session", self.base_url);
        debug!(url = %url, "requesting session token");

        let response = self
            .http
            .post(&url)
            .json(&SessionRequest {
                access_token: &self.api_token,
                source: &self.source,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BoekhoudenError::from_status(status, &body));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| BoekhoudenError::Data(format!("session response: {e}")))?;
        Ok(session.token)
    }

    async fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Page<T>, BoekhoudenError> {
        let token = self.session_token().await?;
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BoekhoudenError::from_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| BoekhoudenError::Data(format!("{endpoint}: {e}")))
    }

    async fn fetch_all<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        extra_params: &[(&str, String)],
    ) -> Result<Vec<T>, BoekhoudenError> {
        let mut items = Vec::new();
        let mut offset = 0usize;

        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("limit", PAGE_LIMIT.to_string()),
                ("offset", offset.to_string()),
            ];
            params.extend(extra_params.iter().cloned());

            let page: Page<T> = self.get_page(endpoint, &params).await?;
            let page_len = page.items.len();
            items.extend(page.items);

            if page_len < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
            if offset > MAX_OFFSET {
                warn!(endpoint = %endpoint, offset, "pagination safety cap reached");
                break;
            }
        }

        Ok(items)
    }

    /// Fetch the full chart of accounts.
    pub async fn fetch_ledger_accounts(&self) -> Result<Vec<LedgerAccountDto>, BoekhoudenError> {
        self.fetch_all("v1/ledger", &[]).await
    }

    /// Fetch all mutations, optionally from a date (inclusive).
    ///
    /// The `id = 0` placeholder row is dropped here.
    pub async fn fetch_mutations(
        &self,
        date_from: Option<chrono::NaiveDate>,
    ) -> Result<Vec<Mutation>, BoekhoudenError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(from) = date_from {
            params.push(("dateFrom", from.format("%Y-%m-%d").to_string()));
        }

        let mutations: Vec<Mutation> = self.fetch_all("v1/mutation", &params).await?;
        Ok(mutations.into_iter().filter(|m| m.id != 0).collect())
    }

    /// Fetch a single mutation by id.
    ///
    /// Id 0 is the upstream placeholder and is rejected before any request
    /// goes out.
    pub async fn fetch_mutation(&self, id: i64) -> Result<Mutation, BoekhoudenError> {
        if id == 0 {
            return Err(BoekhoudenError::Data(
                "mutation id 0 is the upstream placeholder and cannot be fetched".to_string(),
            ));
        }

        let token = self.session_token().await?;
        let url = format!("{}/v1/mutation/{id}", self.base_url);

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BoekhoudenError::from_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| BoekhoudenError::Data(format!("mutation {id}: {e}")))
    }
}
