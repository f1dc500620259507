//! GitHub issues client: fetch, create, comment.

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Repository reference in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidRepo(raw.to_string());
        let (owner, name) = raw.trim().split_once('/').ok_or_else(invalid)?;
        let (owner, name) = (owner.trim(), name.trim());
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// An existing issue, as much of it as the bot needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerIssue {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIssue {
    pub url: String,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedComment {
    pub url: String,
}

#[derive(Serialize)]
struct CreateIssueRequest<'a> {
    title: &'a str,
    body: String,
}

#[derive(Serialize)]
struct CreateCommentRequest {
    body: String,
}

#[derive(Deserialize)]
struct IssueResponse {
    title: String,
    html_url: String,
}

#[derive(Deserialize)]
struct CreateIssueResponse {
    html_url: String,
    number: u64,
}

#[derive(Deserialize)]
struct CreateCommentResponse {
    html_url: String,
}

/// Append image URLs to a markdown body, one `![image](url)` per line,
/// separated from the text by a blank line.
pub fn append_images(body: &str, image_urls: &[String]) -> String {
    if image_urls.is_empty() {
        return body.to_string();
    }
    let images: Vec<String> = image_urls
        .iter()
        .map(|url| format!("![image]({url})"))
        .collect();
    format!("{body}\n\n{}", images.join("\n"))
}

pub struct TrackerClient {
    http: reqwest::Client,
    api_base: String,
    repo: RepoRef,
}

impl TrackerClient {
    pub fn new(api_base: &str, token: &str, repo: RepoRef) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("issuebot"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|e| Error::Http(format!("invalid authorization header: {e}")))?;
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo,
        })
    }

    fn issues_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/issues",
            self.api_base, self.repo.owner, self.repo.name
        )
    }

    /// Fetch an issue by number. A 404 is `Ok(None)`, not an error.
    pub async fn fetch_issue(&self, number: u64) -> Result<Option<TrackerIssue>, Error> {
        let response = self
            .http
            .get(format!("{}/{number}", self.issues_url()))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Issue #{number} not found in {}", self.repo.as_slug());
            return Ok(None);
        }

        let issue: IssueResponse = read_json(response).await?;
        Ok(Some(TrackerIssue {
            title: issue.title,
            url: issue.html_url,
        }))
    }

    pub async fn create_issue(
        &self,
        title: &str,
        body: &str,
        image_urls: &[String],
    ) -> Result<CreatedIssue, Error> {
        let request = CreateIssueRequest {
            title,
            body: append_images(body, image_urls),
        };
        let response = self
            .http
            .post(self.issues_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let created: CreateIssueResponse = read_json(response).await?;
        info!("📝 Created issue #{} in {}", created.number, self.repo.as_slug());
        Ok(CreatedIssue {
            url: created.html_url,
            number: created.number,
        })
    }

    pub async fn add_comment(
        &self,
        number: u64,
        body: &str,
        image_urls: &[String],
    ) -> Result<CreatedComment, Error> {
        let request = CreateCommentRequest {
            body: append_images(body, image_urls),
        };
        let response = self
            .http
            .post(format!("{}/{number}/comments", self.issues_url()))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let created: CreateCommentResponse = read_json(response).await?;
        info!("💬 Commented on issue #{number} in {}", self.repo.as_slug());
        Ok(CreatedComment {
            url: created.html_url,
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Api(format!("{status}: {body}")));
    }
    response
        .json()
        .await
        .map_err(|e| Error::Parse(e.to_string()))
}

#[derive(Debug)]
pub enum Error {
    InvalidRepo(String),
    Http(String),
    Api(String),
    Parse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidRepo(raw) => write!(f, "invalid repository '{raw}', expected owner/name"),
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "GitHub API error: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for Error {}
