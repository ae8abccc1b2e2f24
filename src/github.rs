//! Code-hosting API access: organization repository listing

use crate::config::{GitHubConfig, Secret};
use crate::error::{ConfigError, Result};
use crate::http;
use serde::Deserialize;

const SERVICE: &str = "github";
const PER_PAGE: usize = 100;

/// Minimal GitHub REST client
pub struct GitHubClient {
    client: reqwest::Client,
    token: Secret,
    api_url: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct RepoSummary {
    full_name: String,
}

impl GitHubClient {
    pub fn from_config(config: &GitHubConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| ConfigError::MissingRequired("github token (GITHUB_PAT)".to_string()))?;
        Ok(Self {
            client: http::build_client(SERVICE, config.timeout_secs)?,
            token,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// `full_name` of every repository in `org`, following pagination
    pub async fn list_org_repos(&self, org: &str) -> Result<Vec<String>> {
        let url = format!("{}/orgs/{}/repos", self.api_url, org);
        let mut names = Vec::new();
        let mut page = 1usize;

        loop {
            let request = self
                .client
                .get(&url)
                .bearer_auth(self.token.expose())
                .header("Accept", "application/vnd.github+json")
                .header("User-Agent", concat!("rag-sync/", env!("CARGO_PKG_VERSION")))
                .query(&[("per_page", PER_PAGE), ("page", page)]);
            let repos: Vec<RepoSummary> = http::send_json(SERVICE, request, self.timeout_secs).await?;

            let count = repos.len();
            names.extend(repos.into_iter().map(|r| r.full_name));
            tracing::debug!("Fetched page {} of {} repositories ({} entries)", page, org, count);

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        tracing::info!("Found {} repositories in {}", names.len(), org);
        Ok(names)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}
