//! ClickHouse event-log source.
//!
//! Reads a `github_events`-style table over the ClickHouse HTTP interface
//! (`JSONEachRow` output). Every query is paginated with LIMIT/OFFSET, asking
//! for one extra row to learn whether another page exists.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::{
    FetchResult, Page, PageRequest, Resource, StarSource, classify_status, classify_transport,
};
use crate::config::ClickHouseConfig;
use crate::error::{Error, FetchError, Result};
use crate::model::{Activity, EventKind, RepoId, RepoMetadata, RepoRef, StargazerRef};

#[derive(Debug, Deserialize)]
struct StarRow {
    repo_name: String,
    last_starred: String,
}

#[derive(Debug, Deserialize)]
struct ActivityRow {
    repo_name: String,
    kind: String,
    happened_at: String,
}

#[derive(Debug, Deserialize)]
struct ActorRow {
    actor_login: String,
}

#[derive(Debug, Deserialize)]
struct MetadataRow {
    stargazers: u64,
    forkers: u64,
}

/// Source backed by a ClickHouse table of GitHub events.
#[derive(Debug, Clone)]
pub struct ClickHouseSource {
    client: reqwest::Client,
    endpoint: Url,
    table: String,
    activity_types: Vec<String>,
}

impl ClickHouseSource {
    /// Build a source from its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or table name is invalid, or the HTTP client
    /// cannot be initialized.
    pub fn new(config: &ClickHouseConfig) -> Result<Self> {
        if !is_identifier(&config.table) {
            return Err(Error::InvalidConfig(format!(
                "clickhouse.table '{}' is not a valid table name",
                config.table
            )));
        }

        let mut endpoint = Url::parse(&config.url)
            .map_err(|e| Error::InvalidConfig(format!("clickhouse.url: {e}")))?;
        {
            let mut query = endpoint.query_pairs_mut();
            query
                .append_pair("default_format", "JSONEachRow")
                .append_pair("output_format_json_quote_64bit_integers", "0");
            if let Some(user) = &config.user {
                query.append_pair("user", user);
            }
            if let Some(password) = &config.password {
                query.append_pair("password", password);
            }
        }

        let activity_types = config
            .neighbor_event_kinds
            .iter()
            .flat_map(|kind| kind.event_types())
            .map(|name| (*name).to_string())
            .collect::<Vec<_>>();
        if activity_types.is_empty() {
            return Err(Error::InvalidConfig(
                "clickhouse.neighbor_event_kinds must name at least one event kind".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            table: config.table.clone(),
            activity_types,
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        resource: &Resource,
        sql: String,
    ) -> FetchResult<Vec<T>> {
        debug!(%resource, "ClickHouse query");
        let response = self
            .client
            .post(self.endpoint.clone())
            .body(sql)
            .send()
            .await
            .map_err(|e| classify_transport(resource, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(resource, &e))?;
        if !status.is_success() {
            return Err(classify_status(
                resource,
                status.as_u16(),
                false,
                None,
                body.trim().to_string(),
            ));
        }

        parse_rows(resource, &body)
    }

    async fn paged<T: DeserializeOwned>(
        &self,
        resource: &Resource,
        sql: &str,
        page: PageRequest,
    ) -> FetchResult<Page<T>> {
        let sql = format!(
            "{sql}\nLIMIT {} OFFSET {}",
            page.per_page + 1,
            page.cursor.offset(page.per_page)
        );
        let mut rows = self.query::<T>(resource, sql).await?;
        let next = if rows.len() > page.per_page {
            rows.truncate(page.per_page);
            Some(page.cursor.next())
        } else {
            None
        };
        Ok(Page { items: rows, next })
    }
}

#[async_trait]
impl StarSource for ClickHouseSource {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    fn max_page_size(&self) -> usize {
        1000
    }

    async fn starred(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        let resource = Resource::Starred(login.to_string());
        let sql = format!(
            "SELECT repo_name, toString(max(created_at)) AS last_starred\n\
             FROM {table}\n\
             WHERE event_type = 'WatchEvent' AND actor_login = {login}\n\
             GROUP BY repo_name\n\
             ORDER BY max(created_at) DESC, repo_name",
            table = self.table,
            login = literal(login),
        );
        let page = self.paged::<StarRow>(&resource, &sql, page).await?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|row| Activity {
                    repo: RepoRef::bare(row.repo_name),
                    kind: EventKind::Watch,
                    at: parse_timestamp(&row.last_starred),
                })
                .collect(),
            next: page.next,
        })
    }

    async fn activity(&self, login: &str, page: PageRequest) -> FetchResult<Page<Activity>> {
        let resource = Resource::Activity(login.to_string());
        let types = self
            .activity_types
            .iter()
            .map(String::as_str)
            .map(literal)
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT repo_name, toString(event_type) AS kind, toString(created_at) AS happened_at\n\
             FROM {table}\n\
             WHERE actor_login = {login} AND event_type IN ({types})\n\
             ORDER BY created_at DESC, repo_name",
            table = self.table,
            login = literal(login),
        );
        let page = self.paged::<ActivityRow>(&resource, &sql, page).await?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|row| Activity {
                    repo: RepoRef::bare(row.repo_name),
                    kind: EventKind::from_event_type(&row.kind),
                    at: parse_timestamp(&row.happened_at),
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
        let sql = format!(
            "SELECT actor_login\n\
             FROM {table}\n\
             WHERE event_type = 'WatchEvent' AND repo_name = {repo}\n\
             GROUP BY actor_login\n\
             ORDER BY max(created_at) DESC, actor_login",
            table = self.table,
            repo = literal(repo.as_str()),
        );
        let page = self.paged::<ActorRow>(&resource, &sql, page).await?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|row| StargazerRef::new(row.actor_login))
                .collect(),
            next: page.next,
        })
    }

    async fn metadata(&self, repo: &RepoId) -> FetchResult<RepoMetadata> {
        let resource = Resource::Metadata(repo.clone());
        let sql = format!(
            "SELECT\n\
             uniqExactIf(actor_login, event_type = 'WatchEvent') AS stargazers,\n\
             uniqExactIf(actor_login, event_type = 'ForkEvent') AS forkers\n\
             FROM {table}\n\
             WHERE repo_name = {repo}",
            table = self.table,
            repo = literal(repo.as_str()),
        );
        let rows = self.query::<MetadataRow>(&resource, sql).await?;
        let row = rows.into_iter().next().ok_or_else(|| FetchError::Decode {
            resource: resource.to_string(),
            message: "empty metadata result".to_string(),
        })?;
        Ok(RepoMetadata {
            total_stars: row.stargazers,
            total_forks: row.forkers,
            fork: false,
        })
    }
}

/// Quote a string as a ClickHouse literal.
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

fn parse_rows<T: DeserializeOwned>(resource: &Resource, body: &str) -> FetchResult<Vec<T>> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| FetchError::Decode {
                resource: resource.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// Parse ClickHouse `DateTime` text (`YYYY-MM-DD hh:mm:ss`, UTC).
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
