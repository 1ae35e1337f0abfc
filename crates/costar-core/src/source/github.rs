//! GitHub REST API source.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::{
    Cursor, FetchResult, Page, PageRequest, Resource, StarSource, classify_status,
    classify_transport,
};
use crate::config::GitHubConfig;
use crate::error::{Error, FetchError, Result};
use crate::model::{Activity, EventKind, RepoId, RepoMetadata, RepoRef, StargazerRef};

const STAR_MEDIA_TYPE: &str = "application/vnd.github.star+json";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Deserialize)]
struct ApiRepo {
    full_name: String,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    fork: bool,
}

impl ApiRepo {
    fn into_ref(self) -> RepoRef {
        RepoRef::with_metadata(
            self.full_name,
            RepoMetadata {
                total_stars: self.stargazers_count,
                total_forks: self.forks_count,
                fork: self.fork,
            },
        )
    }
}

#[derive(Debug, Deserialize)]
struct ApiStar {
    starred_at: Option<DateTime<Utc>>,
    repo: ApiRepo,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

/// Source backed by `api.github.com` (or a GitHub Enterprise base URL).
#[derive(Debug, Clone)]
pub struct GitHubSource {
    client: reqwest::Client,
    base_url: Url,
    authenticated: bool,
}

impl GitHubSource {
    /// Build a source from its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid, the token is not a valid
    /// header value, or the HTTP client cannot be initialized.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.api_base_url)
            .map_err(|e| Error::InvalidConfig(format!("github.api_base_url: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(API_VERSION),
        );
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::InvalidConfig("github.token is not a valid header".into()))?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            authenticated: config.token.is_some(),
        })
    }

    fn endpoint(&self, resource: &Resource, path: &str) -> FetchResult<Url> {
        self.base_url.join(path).map_err(|e| FetchError::Client {
            resource: resource.to_string(),
            status: 400,
            message: e.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        resource: &Resource,
        url: Url,
        accept: &'static str,
    ) -> FetchResult<(T, HeaderMap)> {
        debug!(%resource, %url, "GET");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .map_err(|e| classify_transport(resource, &e))?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(classify_status(
                resource,
                status.as_u16(),
                rate_limit_exhausted(&headers),
                retry_after(&headers, Utc::now()),
                message,
            ));
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| classify_transport(resource, &e))?;
        Ok((body, headers))
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        resource: &Resource,
        path: &str,
        page: PageRequest,
        accept: &'static str,
    ) -> FetchResult<Page<T>> {
        let mut url = self.endpoint(resource, path)?;
        url.query_pairs_mut()
            .append_pair("per_page", &page.per_page.to_string())
            .append_pair("page", &page.cursor.0.to_string());

        let (items, headers) = self.get::<Vec<T>>(resource, url, accept).await?;
        let next = headers
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_page_from_link);
        Ok(Page { items, next })
    }
}

#[async_trait]
impl StarSource for GitHubSource {
    fn name(&self) -> &'static str {
        "github"
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    async fn starred(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        let resource = Resource::Starred(login.to_string());
        let path = format!("users/{login}/starred");
        let page = self
            .get_page::<ApiStar>(&resource, &path, page, STAR_MEDIA_TYPE)
            .await?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|star| Activity {
                    repo: star.repo.into_ref(),
                    kind: EventKind::Watch,
                    at: star.starred_at,
                })
                .collect(),
            next: page.next,
        })
    }

    async fn stargazers(
        &self,
        repo: &RepoId,
        page: PageRequest,
    ) -> FetchResult<Page<StargazerRef>> {
        let resource = Resource::Stargazers(repo.clone());
        let path = format!("repos/{repo}/stargazers");
        let page = self
            .get_page::<ApiUser>(&resource, &path, page, JSON_MEDIA_TYPE)
            .await?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|user| StargazerRef::new(user.login))
                .collect(),
            next: page.next,
        })
    }

    async fn metadata(&self, repo: &RepoId) -> FetchResult<RepoMetadata> {
        let resource = Resource::Metadata(repo.clone());
        let url = self.endpoint(&resource, &format!("repos/{repo}"))?;
        let (api_repo, _) = self
            .get::<ApiRepo>(&resource, url, JSON_MEDIA_TYPE)
            .await?;
        Ok(RepoMetadata {
            total_stars: api_repo.stargazers_count,
            total_forks: api_repo.forks_count,
            fork: api_repo.fork,
        })
    }
}

/// Extract the `rel="next"` page number from a `Link` header.
fn next_page_from_link(link: &str) -> Option<Cursor> {
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.split(';').any(|p| p.trim() == r#"rel="next""#) {
            return None;
        }
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');
        let url = Url::parse(target).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
            .map(Cursor)
    })
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    headers.contains_key(reqwest::header::RETRY_AFTER)
        || header_u64(headers, "x-ratelimit-remaining") == Some(0)
}

/// How long to wait before retrying, from `Retry-After` or `X-RateLimit-Reset`.
fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(seconds) = header_u64(headers, reqwest::header::RETRY_AFTER.as_str()) {
        return Some(Duration::from_secs(seconds));
    }
    let reset = header_u64(headers, "x-ratelimit-reset")?;
    let now = u64::try_from(now.timestamp()).ok()?;
    Some(Duration::from_secs(reset.saturating_sub(now) + 1))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_next_page_from_link() {
        let link = r#"<https://api.github.com/repositories/1/stargazers?per_page=100&page=2>; rel="next", <https://api.github.com/repositories/1/stargazers?per_page=100&page=34>; rel="last""#;
        assert_eq!(next_page_from_link(link), Some(Cursor(2)));
    }

    #[test]
    fn test_link_without_next_is_last_page() {
        let link = r#"<https://api.github.com/user/1/starred?page=1>; rel="first", <https://api.github.com/user/1/starred?page=3>; rel="prev""#;
        assert_eq!(next_page_from_link(link), None);
        assert_eq!(next_page_from_link(""), None);
    }

    #[test]
    fn test_retry_after_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("7"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1"));
        assert_eq!(retry_after(&headers, Utc::now()), Some(Duration::from_secs(7)));
        assert!(rate_limit_exhausted(&headers));
    }

    #[test]
    fn test_retry_after_from_reset() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000030"));
        assert_eq!(retry_after(&headers, now), Some(Duration::from_secs(31)));
        assert!(rate_limit_exhausted(&headers));
    }

    #[test]
    fn test_remaining_quota_is_not_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));
        assert!(!rate_limit_exhausted(&headers));
        assert_eq!(retry_after(&headers, Utc::now()), None);
    }

    #[test]
    fn test_star_payload_decodes() {
        let json = r#"[{"starred_at":"2024-05-01T10:00:00Z","repo":{"full_name":"a/b","stargazers_count":12,"forks_count":3,"fork":false}}]"#;
        let stars: Vec<ApiStar> = serde_json::from_str(json).unwrap();
        assert_eq!(stars.len(), 1);
        let star = stars.into_iter().next().unwrap();
        assert!(star.starred_at.is_some());
        let repo = star.repo.into_ref();
        assert_eq!(repo.id, RepoId::new("a/b"));
        assert_eq!(repo.metadata.unwrap().total_stars, 12);
    }

    #[test]
    fn test_source_from_config() {
        let config = GitHubConfig {
            token: Some("ghp_test".to_string()),
            api_base_url: "https://ghe.example.com/api/v3".to_string(),
            ..GitHubConfig::default()
        };
        let source = GitHubSource::new(&config).unwrap();
        assert!(source.is_authenticated());
        let url = source
            .endpoint(&Resource::Metadata(RepoId::new("a/b")), "repos/a/b")
            .unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/repos/a/b");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let config = GitHubConfig {
            api_base_url: "not a url".to_string(),
            ..GitHubConfig::default()
        };
        assert!(matches!(
            GitHubSource::new(&config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
