//! Input - Raw deployment inputs
//!
//! An `InputSet` is what the operator writes down. Nothing here is trusted
//! until `validation::validate` has accepted it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw inputs for one resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSet {
    pub project_name: String,
    /// Environment name, checked against `Environment` during validation
    pub environment: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_vpc_cidr")]
    pub vpc_cidr: String,
    #[serde(default = "default_availability_zones")]
    pub availability_zones: Vec<String>,
    #[serde(default = "default_instance_count")]
    pub instance_count: usize,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    /// Cluster name; defaults to `{project}-{environment}-eks`
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub node_group: NodeGroupSizing,
    #[serde(default = "default_retention_days")]
    pub metrics_retention_days: u32,
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval: String,
    #[serde(default)]
    pub notification_email: Option<String>,
    #[serde(default)]
    pub additional_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub features: FeatureFlags,
}

impl InputSet {
    /// Inputs with every optional field at its default
    pub fn new(project_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            environment: environment.into(),
            region: default_region(),
            owner: default_owner(),
            vpc_cidr: default_vpc_cidr(),
            availability_zones: default_availability_zones(),
            instance_count: default_instance_count(),
            instance_type: default_instance_type(),
            cluster_name: None,
            node_group: NodeGroupSizing::default(),
            metrics_retention_days: default_retention_days(),
            scrape_interval: default_scrape_interval(),
            notification_email: None,
            additional_tags: BTreeMap::new(),
            features: FeatureFlags::default(),
        }
    }

    pub fn with_zones<I, S>(mut self, zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.availability_zones = zones.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_instance_count(mut self, count: usize) -> Self {
        self.instance_count = count;
        self
    }

    pub fn with_vpc_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.vpc_cidr = cidr.into();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_tags.insert(key.into(), value.into());
        self
    }

    pub fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }
}

/// Optional components of the stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Deploy the tracing/metrics collector add-on
    pub enable_collector: bool,
    /// Run cluster nodes on spot capacity (never honoured in production)
    pub enable_spot_instances: bool,
    /// Send alarm notifications to `notification_email`
    pub enable_alerting: bool,
    pub enable_nat_gateway: bool,
    pub enable_container_insights: bool,
}

/// Managed node group scaling bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeGroupSizing {
    pub desired: u32,
    pub min: u32,
    pub max: u32,
}

impl Default for NodeGroupSizing {
    fn default() -> Self {
        Self {
            desired: 2,
            min: 1,
            max: 4,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_owner() -> String {
    "platform-team".to_string()
}

fn default_vpc_cidr() -> String {
    "10.0.0.0/16".to_string()
}

fn default_availability_zones() -> Vec<String> {
    vec!["us-east-1a".to_string(), "us-east-1b".to_string()]
}

fn default_instance_count() -> usize {
    2
}

fn default_instance_type() -> String {
    "t3.medium".to_string()
}

fn default_retention_days() -> u32 {
    150
}

fn default_scrape_interval() -> String {
    "15s".to_string()
}
