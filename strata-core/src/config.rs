//! DerivedConfig - The resolved configuration tree
//!
//! Every section is plain data. Ordering is fixed by struct field order and
//! `BTreeMap` keys, so serializing the same tree always yields the same
//! bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::network::{Cidr, SubnetPartitions};
use crate::profile::{Environment, EnvironmentProfile};
use crate::tags::Tags;

/// Configuration derived from one `InputSet`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedConfig {
    pub project_name: String,
    pub environment: Environment,
    pub region: String,
    pub name_prefix: String,
    pub tags: Tags,
    pub profile: EnvironmentProfile,
    pub vpc_cidr: Cidr,
    pub subnet_partitions: SubnetPartitions,
    pub instance_assignments: Vec<InstanceAssignment>,
    pub security_groups: Vec<SecurityGroupSpec>,
    pub cluster: ClusterConfig,
    pub monitoring: MonitoringConfig,
    pub conditional_blocks: ConditionalBlocks,
    pub log_groups: BTreeMap<LogGroup, LogGroupSpec>,
}

impl DerivedConfig {
    /// Serialize as a pretty JSON document
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Path of one of the derived log groups
    pub fn log_group(&self, group: LogGroup) -> Option<&str> {
        self.log_groups.get(&group).map(|spec| spec.name.as_str())
    }
}

/// One compute instance and where it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAssignment {
    pub index: usize,
    pub name: String,
    #[serde(rename = "type")]
    pub instance_type: String,
    pub availability_zone: String,
    pub detailed_monitoring: bool,
}

/// Security group roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityGroupRole {
    Cluster,
    Nodes,
    Monitoring,
    Dashboard,
}

impl SecurityGroupRole {
    pub const ALL: [SecurityGroupRole; 4] = [
        SecurityGroupRole::Cluster,
        SecurityGroupRole::Nodes,
        SecurityGroupRole::Monitoring,
        SecurityGroupRole::Dashboard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityGroupRole::Cluster => "cluster",
            SecurityGroupRole::Nodes => "nodes",
            SecurityGroupRole::Monitoring => "monitoring",
            SecurityGroupRole::Dashboard => "dashboard",
        }
    }

    fn purpose(&self) -> &'static str {
        match self {
            SecurityGroupRole::Cluster => "EKS cluster control plane",
            SecurityGroupRole::Nodes => "EKS worker nodes",
            SecurityGroupRole::Monitoring => "monitoring instances",
            SecurityGroupRole::Dashboard => "dashboard workspace access",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    pub role: SecurityGroupRole,
    pub name: String,
    pub description: String,
}

impl SecurityGroupSpec {
    pub fn new(role: SecurityGroupRole, name_prefix: &str) -> Self {
        Self {
            role,
            name: format!("{}-{}-sg", name_prefix, role.as_str()),
            description: format!("Security group for {} {}", name_prefix, role.purpose()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    pub node_group: NodeGroupConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapacityType {
    OnDemand,
    Spot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroupConfig {
    pub name: String,
    pub instance_types: Vec<String>,
    pub capacity_type: CapacityType,
    pub desired: u32,
    pub min: u32,
    pub max: u32,
}

/// Managed metrics and dashboard workspace settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub metrics_workspace_alias: String,
    pub dashboard_workspace_name: String,
    pub retention_days: u32,
    pub scrape_interval: String,
    /// Parameter store name holding the host agent configuration
    pub agent_config_parameter: String,
    pub monitoring_interval: u32,
}

/// Optional sub-configurations
///
/// A block is either present and fully populated or absent. Absent blocks
/// are omitted from the serialized document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalBlocks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<CollectorBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_pricing: Option<SpotPricingBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerting: Option<AlertingBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nat_gateway: Option<NatGatewayBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_insights: Option<ContainerInsightsBlock>,
}

/// Tracing and metrics collector add-on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorBlock {
    pub namespace: String,
    pub service_account: String,
    pub log_group: String,
    pub scrape_interval: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotPricingBlock {
    pub instance_types: Vec<String>,
    pub allocation_strategy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertingBlock {
    pub topic_name: String,
    pub notification_email: String,
    pub evaluation_interval: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatGatewayBlock {
    pub gateway_count: usize,
    /// Public subnets hosting a gateway
    pub subnets: Vec<Cidr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInsightsBlock {
    pub performance_log_group: String,
}

/// A log group and how long it keeps events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogGroupSpec {
    pub name: String,
    pub retention_days: u32,
}

/// Logical log group names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogGroup {
    Cluster,
    Application,
    Metrics,
    Dashboards,
    Collector,
}

impl LogGroup {
    pub const ALL: [LogGroup; 5] = [
        LogGroup::Cluster,
        LogGroup::Application,
        LogGroup::Metrics,
        LogGroup::Dashboards,
        LogGroup::Collector,
    ];

    /// Fully qualified log group path
    pub fn path(&self, name_prefix: &str, cluster_name: &str) -> String {
        match self {
            LogGroup::Cluster => format!("/aws/eks/{}/cluster", cluster_name),
            LogGroup::Application => format!("/aws/ec2/{}/application", name_prefix),
            LogGroup::Metrics => format!("/aws/prometheus/{}", name_prefix),
            LogGroup::Dashboards => format!("/aws/grafana/{}", name_prefix),
            LogGroup::Collector => format!("/aws/eks/{}/collector", cluster_name),
        }
    }
}
