//! Admin API discovery client.
//!
//! The harness never hardcodes targets: it asks the administrative
//! service which environments and flags exist, and builds its target
//! list from the active subset.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// An environment as reported by the Admin API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminEnvironment {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    pub api_key: String,
}

/// A feature flag as reported by the Admin API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminFlag {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

/// Everything discovered from the Admin API.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub environments: Vec<AdminEnvironment>,
    pub flags: Vec<AdminFlag>,
}

/// Bearer-token client for the Admin API.
pub struct AdminClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl AdminClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed to build admin HTTP client")?;

        Ok(Self {
            base_url: base_url.into(),
            token: token.into(),
            http,
        })
    }

    /// Verify the admin token with a lightweight request.
    pub async fn ping(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/environments", self.base_url))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("failed to connect to Admin API at {}", self.base_url))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(anyhow!(
                "admin API authentication failed (HTTP {status}) - check your --admin-token"
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("admin API returned HTTP {status}: {body}"));
        }
        Ok(())
    }

    /// Fetch all active environments.
    pub async fn fetch_environments(&self) -> Result<Vec<AdminEnvironment>> {
        let envs: Vec<AdminEnvironment> = self
            .get_json("/environments")
            .await
            .context("failed to fetch environments")?;
        Ok(envs.into_iter().filter(|e| e.is_active).collect())
    }

    /// Fetch all active flags.
    pub async fn fetch_flags(&self) -> Result<Vec<AdminFlag>> {
        let flags: Vec<AdminFlag> = self
            .get_json("/flags")
            .await
            .context("failed to fetch flags")?;
        Ok(flags.into_iter().filter(|f| f.is_active).collect())
    }

    /// Discover the active environments and flags in one pass.
    pub async fn discover(&self) -> Result<Discovery> {
        self.ping().await?;
        let environments = self.fetch_environments().await?;
        let flags = self.fetch_flags().await?;
        Ok(Discovery {
            environments,
            flags,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .context("request failed")?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(anyhow!("authentication failed (HTTP {status})"));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP {status}: {body}"));
        }

        response.json().await.context("failed to decode response")
    }
}

/// Keep only the entries named by `filter` (by key or name); an empty
/// filter keeps everything.
pub fn filter_environments(
    envs: Vec<AdminEnvironment>,
    filter: &[String],
) -> Vec<AdminEnvironment> {
    if filter.is_empty() {
        return envs;
    }
    envs.into_iter()
        .filter(|e| filter.iter().any(|f| f == &e.key || f == &e.name))
        .collect()
}

/// Same as [`filter_environments`], for flags.
pub fn filter_flags(flags: Vec<AdminFlag>, filter: &[String]) -> Vec<AdminFlag> {
    if filter.is_empty() {
        return flags;
    }
    flags
        .into_iter()
        .filter(|f| filter.iter().any(|name| name == &f.key || name == &f.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(key: &str) -> AdminEnvironment {
        AdminEnvironment {
            id: key.to_string(),
            key: key.to_string(),
            name: format!("{key} env"),
            is_active: true,
            api_key: format!("sk-{key}"),
        }
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let envs = vec![env("prod"), env("staging")];
        assert_eq!(filter_environments(envs, &[]).len(), 2);
    }

    #[test]
    fn filter_matches_key_or_name() {
        let envs = vec![env("prod"), env("staging")];
        let kept = filter_environments(envs.clone(), &["prod".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].key, "prod");

        let kept = filter_environments(envs, &["staging env".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].key, "staging");
    }

    #[test]
    fn environments_decode_from_admin_json() {
        let json = r#"[{
            "id": "e-1", "key": "prod", "name": "Production",
            "isActive": true, "apiKey": "sk-prod",
            "createdAt": "2025-01-01T00:00:00Z"
        }]"#;
        let envs: Vec<AdminEnvironment> = serde_json::from_str(json).unwrap();
        assert_eq!(envs[0].key, "prod");
        assert_eq!(envs[0].api_key, "sk-prod");
        assert!(envs[0].is_active);
    }
}
