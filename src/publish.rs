//! Upload of the committed journal through the GitHub contents API.

use std::time::Duration;

use base64::Engine;
use log::{debug, info};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::PublishSettings;
use crate::error::PublishError;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const CLIENT_USER_AGENT: &str = concat!("activity-journal/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    commit: CommitInfo,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

/// Writes one file to one branch of one repository.
pub struct GitHubPublisher {
    client: Client,
    settings: PublishSettings,
    token: String,
}

impl GitHubPublisher {
    pub fn new(
        settings: PublishSettings,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Transport {
                details: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            settings,
            token: token.into(),
        })
    }

    pub fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.repository,
            self.settings.path.trim_start_matches('/')
        )
    }

    /// Blob sha of the file on the target branch, `None` if it does not exist.
    pub async fn current_sha(&self) -> Result<Option<String>, PublishError> {
        let request = self
            .client
            .get(self.contents_url())
            .query(&[("ref", self.settings.branch.as_str())]);
        let response = self.authorize(request).send().await.map_err(transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("{} not on {} yet", self.settings.path, self.settings.branch);
            return Ok(None);
        }
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(PublishError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let entry: ContentsEntry = serde_json::from_str(&body).map_err(|e| PublishError::Decode {
            details: e.to_string(),
        })?;
        Ok(Some(entry.sha))
    }

    /// Create or update the file with `contents`. Returns the commit sha.
    pub async fn publish(&self, contents: &str) -> Result<String, PublishError> {
        let sha = self.current_sha().await?;
        let payload = PutRequest {
            message: &self.settings.message,
            content: base64::engine::general_purpose::STANDARD.encode(contents),
            branch: &self.settings.branch,
            sha,
        };

        let request = self.client.put(self.contents_url()).json(&payload);
        let response = self.authorize(request).send().await.map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(PublishError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: PutResponse = serde_json::from_str(&body).map_err(|e| PublishError::Decode {
            details: e.to_string(),
        })?;
        info!(
            "Published {} to {}@{} (commit {})",
            self.settings.path, self.settings.repository, self.settings.branch, parsed.commit.sha
        );
        Ok(parsed.commit.sha)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(ACCEPT, GITHUB_ACCEPT)
    }
}

fn transport(e: reqwest::Error) -> PublishError {
    PublishError::Transport {
        details: e.to_string(),
    }
}
