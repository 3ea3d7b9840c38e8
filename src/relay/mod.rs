//! Relay — the privileged side that talks to the remote file API.
//!
//! The UI agent never issues HTTP itself. It sends [`RelayRequest`]s through a
//! [`RelayClient`] and interprets the [`RelayResponse`]s:
//!
//! ```text
//! UI agent ──RelayRequest──▶ Relay ──HTTP (bearer, 429 backoff)──▶ remote API
//!          ◀─RelayResponse──       ◀──────────────────────────────
//! ```

pub mod channel;
pub mod credential;
pub mod executor;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TagError};
use crate::tagging::encode::{encode_update, new_boundary};
use crate::tagging::merge::merge_tags;
use crate::tagging::schema::{FileRecord, SearchResponse, Tag};
use credential::{authorize, is_expired, Credential};
use executor::{HttpRequest, RetryingExecutor, STATUS_TOO_MANY_REQUESTS};

pub use channel::RelayHandle;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum RelayRequest {
    #[serde(rename_all = "camelCase")]
    SearchFiles {
        filename: String,
        credential: Credential,
    },
    #[serde(rename_all = "camelCase")]
    UpdateFile {
        file_id: String,
        file_data: FileRecord,
        new_tag: Tag,
        credential: Credential,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchReply {
    pub files: Vec<FileRecord>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub expired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub expired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayFailure {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayResponse {
    Search(SearchReply),
    Update(UpdateReply),
    Error(RelayFailure),
}

impl RelayResponse {
    pub fn error(message: impl Into<String>) -> Self {
        RelayResponse::Error(RelayFailure {
            error: message.into(),
        })
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Request/response access to a relay, independent of how messages travel.
///
/// Implementors provide [`call`](RelayClient::call); the typed helpers turn
/// replies into [`TagError`]s. A 429 that outlasted every retry comes back as
/// [`TagError::RateLimited`].
#[async_trait]
pub trait RelayClient: Send + Sync {
    async fn call(&self, request: RelayRequest) -> Result<RelayResponse>;

    async fn search_files(
        &self,
        filename: &str,
        credential: &Credential,
    ) -> Result<Vec<FileRecord>> {
        let request = RelayRequest::SearchFiles {
            filename: filename.to_string(),
            credential: credential.clone(),
        };
        match self.call(request).await? {
            RelayResponse::Search(reply) if reply.expired => Err(TagError::CredentialExpired),
            RelayResponse::Search(reply) if reply.status == Some(STATUS_TOO_MANY_REQUESTS) => {
                Err(TagError::RateLimited)
            }
            RelayResponse::Search(SearchReply {
                error: Some(error), ..
            }) => Err(TagError::Relay(error)),
            RelayResponse::Search(reply) => Ok(reply.files),
            RelayResponse::Error(failure) => Err(TagError::Relay(failure.error)),
            other => Err(TagError::Relay(format!("unexpected search reply: {other:?}"))),
        }
    }

    async fn update_file(
        &self,
        record: &FileRecord,
        new_tag: &Tag,
        credential: &Credential,
    ) -> Result<()> {
        let request = RelayRequest::UpdateFile {
            file_id: record.id.clone(),
            file_data: record.clone(),
            new_tag: new_tag.clone(),
            credential: credential.clone(),
        };
        match self.call(request).await? {
            RelayResponse::Update(reply) if reply.expired => Err(TagError::CredentialExpired),
            RelayResponse::Update(reply) if reply.ok => Ok(()),
            RelayResponse::Update(reply) if reply.status == Some(STATUS_TOO_MANY_REQUESTS) => {
                Err(TagError::RateLimited)
            }
            RelayResponse::Update(reply) => Err(TagError::UpdateFailed {
                status: reply.status.unwrap_or_default(),
                body: reply.error.unwrap_or_default(),
            }),
            RelayResponse::Error(failure) => Err(TagError::Relay(failure.error)),
            other => Err(TagError::Relay(format!("unexpected update reply: {other:?}"))),
        }
    }
}

/// Executes relay requests against the remote API.
pub struct Relay {
    executor: RetryingExecutor,
    base_url: String,
    search_limit: usize,
}

impl Relay {
    pub fn new(executor: RetryingExecutor, base_url: impl Into<String>) -> Self {
        Self {
            executor,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    pub async fn handle(&self, request: RelayRequest) -> RelayResponse {
        let (RelayRequest::SearchFiles { credential, .. }
        | RelayRequest::UpdateFile { credential, .. }) = &request;
        if credential.is_blank() {
            return RelayResponse::error("No API token provided");
        }

        let result = match request {
            RelayRequest::SearchFiles {
                filename,
                credential,
            } => self.search(&filename, &credential).await.map(RelayResponse::Search),
            RelayRequest::UpdateFile {
                file_id,
                file_data,
                new_tag,
                credential,
            } => self
                .update(&file_id, &file_data, new_tag, &credential)
                .await
                .map(RelayResponse::Update),
        };
        result.unwrap_or_else(|e| RelayResponse::error(e.to_string()))
    }

    async fn search(&self, filename: &str, credential: &Credential) -> Result<SearchReply> {
        let url = format!(
            "{}/v1/files/search?query={}&limit={}",
            self.base_url,
            urlencoding::encode(filename),
            self.search_limit
        );
        let resp = self
            .executor
            .execute(&authorize(HttpRequest::get(url), credential))
            .await?;

        if is_expired(resp.status) {
            return Ok(SearchReply {
                expired: true,
                ..SearchReply::default()
            });
        }
        if !resp.is_success() {
            tracing::warn!(filename, status = resp.status, "Search failed");
            return Ok(SearchReply {
                status: Some(resp.status),
                error: Some(format!("Search failed: {}", resp.status)),
                ..SearchReply::default()
            });
        }

        let body: SearchResponse = resp.json()?;
        tracing::debug!(filename, candidates = body.data.len(), "Search complete");
        Ok(SearchReply {
            files: body.data,
            ..SearchReply::default()
        })
    }

    async fn update(
        &self,
        file_id: &str,
        file_data: &FileRecord,
        new_tag: Tag,
        credential: &Credential,
    ) -> Result<UpdateReply> {
        let tags = merge_tags(&file_data.tags, new_tag);
        let encoded = encode_update(file_data, &tags, Utc::now(), &new_boundary());
        let url = format!("{}/v1/files/{}", self.base_url, urlencoding::encode(file_id));
        let request = HttpRequest::put(url, encoded.content_type, encoded.body);
        let resp = self.executor.execute(&authorize(request, credential)).await?;

        if is_expired(resp.status) {
            return Ok(UpdateReply {
                expired: true,
                ..UpdateReply::default()
            });
        }
        if !resp.is_success() {
            tracing::error!(file_id, status = resp.status, body = %resp.body, "Update failed");
            return Ok(UpdateReply {
                status: Some(resp.status),
                error: Some(resp.body),
                ..UpdateReply::default()
            });
        }

        tracing::debug!(file_id, tags = tags.len(), "Update accepted");
        Ok(UpdateReply {
            ok: true,
            ..UpdateReply::default()
        })
    }
}

#[async_trait]
impl RelayClient for Relay {
    async fn call(&self, request: RelayRequest) -> Result<RelayResponse> {
        Ok(self.handle(request).await)
    }
}
