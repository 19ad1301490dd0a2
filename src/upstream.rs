// src/upstream.rs
//
// Thin client over the source-control host's REST API. One attempt per
// call, no retries; callers degrade to cache/stale/default on failure.
use crate::models::{ChangelogEntry, RegistryEntry};
use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

/// Most recent CI run for a repo, reduced to what the aggregator needs.
#[derive(Debug, Clone)]
pub struct LatestRun {
    pub conclusion: String,
    pub last_run: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRunsResponse {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    status: Option<String>,
    conclusion: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    date: Option<String>,
}

/// A running workflow has `conclusion: null`, so fall back to its `status`
/// (e.g. "in_progress"); no run at all reports the literal "unknown".
fn resolve_conclusion(run: &WorkflowRun) -> String {
    run.conclusion
        .clone()
        .or_else(|| run.status.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

impl UpstreamClient {
    pub fn new(base: String, token: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fleetpulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Whether an upstream credential is configured. Run lookups without
    /// one short-circuit to "unknown"/empty rather than burning anonymous
    /// rate limit.
    pub fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, anyhow::Error> {
        let mut request = self
            .http
            .get(format!("{}{}", self.base, path))
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("upstream request failed: {}", path))?
            .error_for_status()
            .with_context(|| format!("upstream returned non-2xx: {}", path))?;

        Ok(response.json::<T>().await?)
    }

    /// Fetch and decode the registry file from the configured repo via the
    /// contents API. Malformed entries are skipped, not fatal.
    pub async fn registry_entries(
        &self,
        repo: &str,
        path: &str,
    ) -> Result<Vec<RegistryEntry>, anyhow::Error> {
        let contents: ContentsResponse = self
            .get_json(&format!("/repos/{}/contents/{}", repo, path))
            .await?;

        // The contents API wraps base64 at 60 columns
        let raw: String = contents.content.split_whitespace().collect();
        let decoded = BASE64.decode(raw.as_bytes()).context("registry file is not valid base64")?;
        let values: Vec<serde_json::Value> =
            serde_json::from_slice(&decoded).context("registry file is not a JSON array")?;

        Ok(values
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    pub async fn latest_run(&self, repo: &str) -> Result<LatestRun, anyhow::Error> {
        let runs: WorkflowRunsResponse = self
            .get_json(&format!("/repos/{}/actions/runs?per_page=1", repo))
            .await?;

        Ok(match runs.workflow_runs.first() {
            Some(run) => LatestRun {
                conclusion: resolve_conclusion(run),
                last_run: run.updated_at.clone(),
            },
            None => LatestRun {
                conclusion: "unknown".to_string(),
                last_run: None,
            },
        })
    }

    pub async fn recent_conclusions(
        &self,
        repo: &str,
        count: usize,
    ) -> Result<Vec<String>, anyhow::Error> {
        let runs: WorkflowRunsResponse = self
            .get_json(&format!("/repos/{}/actions/runs?per_page={}", repo, count))
            .await?;

        Ok(runs.workflow_runs.iter().map(resolve_conclusion).collect())
    }

    pub async fn recent_commits(
        &self,
        repo: &str,
        count: usize,
    ) -> Result<Vec<ChangelogEntry>, anyhow::Error> {
        let commits: Vec<CommitItem> = self
            .get_json(&format!("/repos/{}/commits?per_page={}", repo, count))
            .await?;

        Ok(commits
            .into_iter()
            .map(|c| ChangelogEntry {
                repo: repo.to_string(),
                sha: c.sha.chars().take(7).collect(),
                message: c.commit.message.lines().next().unwrap_or("").to_string(),
                date: c.commit.author.and_then(|a| a.date),
            })
            .collect())
    }
}
