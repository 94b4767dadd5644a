//! Bootstrap context - The slice of resolved configuration a host needs

use serde::{Deserialize, Serialize};
use regex::Regex;
use url::Url;

use crate::config::{DerivedConfig, LogGroup};
use crate::error::RenderError;
use crate::profile::Environment;
use crate::validation::{PROJECT_NAME, REGION, RESOURCE_PATH, SCRAPE_INTERVAL};

/// Remote-write path appended to the workspace endpoint
const REMOTE_WRITE_PATH: &str = "api/v1/remote_write";

/// Inputs to the bootstrap generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapContext {
    /// Managed metrics workspace endpoint, e.g.
    /// `https://aps-workspaces.us-east-1.amazonaws.com/workspaces/ws-1234/`
    pub metrics_endpoint: String,
    /// Region used to sign remote-write requests
    pub region: String,
    pub project_name: String,
    pub environment: Environment,
    pub agent_config_parameter: String,
    pub scrape_interval: String,
    /// Log group receiving host logs
    pub log_group: String,
}

impl BootstrapContext {
    /// Take the bootstrap inputs from a resolved configuration
    pub fn from_config(config: &DerivedConfig, metrics_endpoint: impl Into<String>) -> Self {
        Self {
            metrics_endpoint: metrics_endpoint.into(),
            region: config.region.clone(),
            project_name: config.project_name.clone(),
            environment: config.environment,
            agent_config_parameter: config.monitoring.agent_config_parameter.clone(),
            scrape_interval: config.monitoring.scrape_interval.clone(),
            log_group: config
                .log_group(LogGroup::Application)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    LogGroup::Application.path(&config.name_prefix, &config.cluster.name)
                }),
        }
    }

    /// Check every field the generator embeds and derive the remote-write target
    ///
    /// Nothing is rendered unless this succeeds.
    pub fn remote_write_target(&self) -> Result<RemoteWriteTarget, RenderError> {
        for (field, value) in [
            ("region", &self.region),
            ("project_name", &self.project_name),
            ("agent_config_parameter", &self.agent_config_parameter),
            ("scrape_interval", &self.scrape_interval),
            ("log_group", &self.log_group),
        ] {
            if value.trim().is_empty() {
                return Err(RenderError::MissingField(field));
            }
        }

        let shapes: [(&'static str, &String, &Regex, &str); 5] = [
            ("region", &self.region, &*REGION, "not a region name"),
            (
                "project_name",
                &self.project_name,
                &*PROJECT_NAME,
                "only letters, digits and hyphens are allowed",
            ),
            (
                "agent_config_parameter",
                &self.agent_config_parameter,
                &*RESOURCE_PATH,
                "not an absolute parameter path",
            ),
            (
                "scrape_interval",
                &self.scrape_interval,
                &*SCRAPE_INTERVAL,
                "not a number followed by s, m or h",
            ),
            (
                "log_group",
                &self.log_group,
                &*RESOURCE_PATH,
                "not an absolute log group path",
            ),
        ];
        for (field, value, pattern, reason) in shapes {
            if !pattern.is_match(value) {
                return Err(RenderError::MalformedField {
                    field,
                    value: value.clone(),
                    reason: reason.to_string(),
                });
            }
        }

        let endpoint = self.metrics_endpoint.trim();
        if endpoint.is_empty() {
            return Err(RenderError::MissingField("metrics_endpoint"));
        }
        let malformed = |reason: &str| RenderError::MalformedEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let mut url = Url::parse(endpoint).map_err(|e| malformed(&e.to_string()))?;
        if url.scheme() != "https" {
            return Err(malformed("scheme must be https"));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| malformed("missing host"))?
            .to_string();
        if url.query().is_some() || url.fragment().is_some() {
            return Err(malformed("must not carry a query or fragment"));
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        let remote_write_url = url
            .join(REMOTE_WRITE_PATH)
            .map_err(|e| malformed(&e.to_string()))?;

        Ok(RemoteWriteTarget {
            host,
            path: remote_write_url.path().to_string(),
            url: remote_write_url.to_string(),
            signing_region: self.region.clone(),
        })
    }
}

/// Where and how metrics leave the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteWriteTarget {
    /// Upstream host the signing proxy forwards to
    pub host: String,
    /// Remote-write path on that host
    pub path: String,
    /// Full remote-write URL
    pub url: String,
    pub signing_region: String,
}
