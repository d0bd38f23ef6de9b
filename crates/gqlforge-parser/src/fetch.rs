//! Go source retrieval from the GitHub contents API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::ParserError;

const USER_AGENT: &str = concat!("gqlforge/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FALLBACK_BRANCH: &str = "main";

/// One fetched source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    /// Path within the repository
    pub path: String,
    pub content: String,
}

/// Last rate-limit state reported by the API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimit {
    pub remaining: u64,
    /// Unix timestamp at which the window resets
    pub reset: u64,
}

/// A GitHub import path split into repository coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    pub owner: String,
    pub repo: String,
    /// Branch, tag or commit; empty until resolved
    pub git_ref: String,
    /// Directory within the repository
    pub path: String,
}

/// Split `github.com/owner/repo/sub/dir` into its parts
pub fn parse_import_path(import_path: &str) -> Result<RepoInfo, ParserError> {
    let rest = import_path
        .strip_prefix("github.com/")
        .ok_or_else(|| ParserError::InvalidImportPath(import_path.to_string()))?;
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.len() < 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ParserError::InvalidImportPath(import_path.to_string()));
    }
    Ok(RepoInfo {
        owner: parts[0].to_string(),
        repo: parts[1].to_string(),
        git_ref: String::new(),
        path: parts[2..].join("/"),
    })
}

/// Source of Go package files
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch the non-test `.go` files of one package directory
    async fn fetch_package(
        &self,
        import_path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<FileContent>, ParserError>;
}

#[async_trait]
impl<T: SourceFetcher + ?Sized> SourceFetcher for Arc<T> {
    async fn fetch_package(
        &self,
        import_path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<FileContent>, ParserError> {
        (**self).fetch_package(import_path, git_ref).await
    }
}

#[derive(Debug, Deserialize)]
struct GitHubContent {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct GitHubRepo {
    default_branch: String,
}

/// Fetches package sources through `GET /repos/{owner}/{repo}/contents`
pub struct GitHubFetcher {
    client: reqwest::Client,
    token: Option<String>,
    base_url: String,
    rate_limit: Mutex<Option<RateLimit>>,
}

impl GitHubFetcher {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.github.com";

    pub fn new(token: Option<String>) -> Result<Self, ParserError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            token: token.filter(|t| !t.is_empty()),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            rate_limit: Mutex::new(None),
        })
    }

    /// Point the fetcher at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Rate-limit snapshot from the most recent response, if any
    pub fn rate_limit(&self) -> Option<RateLimit> {
        *self.rate_limit.lock()
    }

    async fn get(&self, url: &str, git_ref: Option<&str>) -> Result<reqwest::Response, ParserError> {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(git_ref) = git_ref {
            request = request.query(&[("ref", git_ref)]);
        }
        let response = request.send().await?;
        self.update_rate_limit(response.headers());
        Ok(response)
    }

    fn update_rate_limit(&self, headers: &HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };
        let (remaining, reset) = (header("x-ratelimit-remaining"), header("x-ratelimit-reset"));
        if remaining.is_none() && reset.is_none() {
            return;
        }

        let mut guard = self.rate_limit.lock();
        let limit = guard.get_or_insert_with(RateLimit::default);
        if let Some(remaining) = remaining {
            limit.remaining = remaining;
        }
        if let Some(reset) = reset {
            limit.reset = reset;
        }
        if limit.remaining == 0 {
            warn!(reset = limit.reset, "GitHub API rate limit exhausted");
        } else {
            debug!(remaining = limit.remaining, reset = limit.reset, "GitHub rate limit");
        }
    }

    /// Default branch of a repository
    pub async fn default_branch(&self, owner: &str, repo: &str) -> Result<String, ParserError> {
        let url = format!("{}/repos/{}/{}", self.base_url, owner, repo);
        let response = self.get(&url, None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ParserError::TransportError {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let repo: GitHubRepo = response.json().await.map_err(|e| decode_error("repository", e))?;
        Ok(repo.default_branch)
    }

    fn contents_url(&self, info: &RepoInfo, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            format!("{}/repos/{}/{}/contents", self.base_url, info.owner, info.repo)
        } else {
            format!(
                "{}/repos/{}/{}/contents/{}",
                self.base_url, info.owner, info.repo, path
            )
        }
    }

    async fn fetch_directory(&self, info: &RepoInfo) -> Result<Vec<FileContent>, ParserError> {
        let url = self.contents_url(info, &info.path);
        let response = self.get(&url, Some(&info.git_ref)).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ParserError::PackageNotFound(format!(
                "{}/{}/{}",
                info.owner, info.repo, info.path
            )));
        }
        if !status.is_success() {
            return Err(ParserError::TransportError {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let entries: Vec<GitHubContent> = response
            .json()
            .await
            .map_err(|e| decode_error(&info.path, e))?;

        let mut files = Vec::new();
        for entry in entries {
            if entry.kind != "file"
                || !entry.name.ends_with(".go")
                || entry.name.ends_with("_test.go")
            {
                continue;
            }
            let content = self.fetch_file(info, &entry.path).await?;
            files.push(FileContent {
                path: entry.path,
                content,
            });
        }
        Ok(files)
    }

    async fn fetch_file(&self, info: &RepoInfo, path: &str) -> Result<String, ParserError> {
        let url = self.contents_url(info, path);
        let response = self.get(&url, Some(&info.git_ref)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ParserError::TransportError {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let entry: GitHubContent = response.json().await.map_err(|e| decode_error(path, e))?;
        decode_content(path, &entry)
    }

    /// Module path declared in the repository's `go.mod`
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_go_mod(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
    ) -> Result<String, ParserError> {
        let info = RepoInfo {
            owner: owner.to_string(),
            repo: repo.to_string(),
            git_ref: git_ref.to_string(),
            path: String::new(),
        };
        let url = self.contents_url(&info, "go.mod");
        let response = self.get(&url, Some(git_ref)).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ParserError::PackageNotFound(format!("{}/{}/go.mod", owner, repo)));
        }
        if !status.is_success() {
            return Err(ParserError::TransportError {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let entry: GitHubContent = response.json().await.map_err(|e| decode_error("go.mod", e))?;
        let go_mod = decode_content("go.mod", &entry)?;
        go_mod
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix("module "))
            .map(|module| module.trim().trim_matches('"').to_string())
            .ok_or_else(|| ParserError::DecodeFailed {
                path: "go.mod".to_string(),
                reason: "module declaration not found".to_string(),
            })
    }
}

#[async_trait]
impl SourceFetcher for GitHubFetcher {
    #[instrument(skip(self), level = "debug")]
    async fn fetch_package(
        &self,
        import_path: &str,
        git_ref: Option<&str>,
    ) -> Result<Vec<FileContent>, ParserError> {
        let mut info = parse_import_path(import_path)?;
        info.git_ref = match git_ref.filter(|r| !r.is_empty()) {
            Some(git_ref) => git_ref.to_string(),
            None => match self.default_branch(&info.owner, &info.repo).await {
                Ok(branch) => branch,
                Err(e) => {
                    debug!(error = %e, "default branch lookup failed, using {}", FALLBACK_BRANCH);
                    FALLBACK_BRANCH.to_string()
                }
            },
        };

        let files = self.fetch_directory(&info).await?;
        info!(
            import_path,
            git_ref = %info.git_ref,
            files = files.len(),
            "fetched package sources"
        );
        Ok(files)
    }
}

fn decode_content(path: &str, entry: &GitHubContent) -> Result<String, ParserError> {
    if entry.encoding != "base64" {
        return Err(ParserError::DecodeFailed {
            path: path.to_string(),
            reason: format!("unexpected encoding: {:?}", entry.encoding),
        });
    }
    let compact: String = entry.content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ParserError::DecodeFailed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|e| ParserError::DecodeFailed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Body read failures stay network errors; malformed JSON names the path
fn decode_error(path: &str, err: reqwest::Error) -> ParserError {
    if err.is_decode() {
        ParserError::DecodeFailed {
            path: path.to_string(),
            reason: format!("unexpected response shape: {}", err),
        }
    } else {
        ParserError::Network(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_path() {
        let info = parse_import_path("github.com/acme/api/pkg/models").unwrap();
        assert_eq!(info.owner, "acme");
        assert_eq!(info.repo, "api");
        assert_eq!(info.path, "pkg/models");
        assert!(info.git_ref.is_empty());

        let root = parse_import_path("github.com/acme/api").unwrap();
        assert_eq!(root.path, "");
    }

    #[test]
    fn test_parse_import_path_rejects_other_hosts() {
        assert!(matches!(
            parse_import_path("gitlab.com/acme/api"),
            Err(ParserError::InvalidImportPath(_))
        ));
        assert!(matches!(
            parse_import_path("github.com/acme"),
            Err(ParserError::InvalidImportPath(_))
        ));
    }

    #[test]
    fn test_decode_content_strips_line_breaks() {
        let entry = GitHubContent {
            name: "a.go".into(),
            path: "a.go".into(),
            kind: "file".into(),
            content: "cGFja2Fn\nZSBh\n".into(),
            encoding: "base64".into(),
        };
        assert_eq!(decode_content("a.go", &entry).unwrap(), "package a");
    }

    #[test]
    fn test_decode_content_rejects_unknown_encoding() {
        let entry = GitHubContent {
            name: "a.go".into(),
            path: "a.go".into(),
            kind: "file".into(),
            content: "package a".into(),
            encoding: "none".into(),
        };
        assert!(matches!(
            decode_content("a.go", &entry),
            Err(ParserError::DecodeFailed { .. })
        ));
    }
}
