//! Resolver - Derive the full configuration tree from raw inputs
//!
//! `resolve` is a pure function: it validates, then derives every section
//! from the validated inputs alone. Calling it twice with the same
//! `InputSet` yields equal trees and byte-identical JSON.

use std::collections::BTreeMap;

use crate::config::{
    AlertingBlock, CapacityType, ClusterConfig, CollectorBlock, ConditionalBlocks,
    ContainerInsightsBlock, DerivedConfig, InstanceAssignment, LogGroup, LogGroupSpec, MonitoringConfig,
    NatGatewayBlock, NodeGroupConfig, SecurityGroupRole, SecurityGroupSpec, SpotPricingBlock,
};
use crate::error::{Result, SizingError};
use crate::input::InputSet;
use crate::network::{Subnet, SubnetPartitions};
use crate::profile::{Environment, EnvironmentProfile};
use crate::tags::Tags;
use crate::validation::{ValidatedInput, validate};

/// Namespace the collector add-on is installed into
pub const COLLECTOR_NAMESPACE: &str = "observability";

const SPOT_ALLOCATION_STRATEGY: &str = "price-capacity-optimized";
const ALERT_EVALUATION_INTERVAL: &str = "1m";

/// Validate `input` and derive its configuration
pub fn resolve(input: &InputSet) -> Result<DerivedConfig> {
    let validated = validate(input)?;
    derive(&validated)
}

/// `{project}-{environment}`
pub fn name_prefix(project: &str, environment: Environment) -> String {
    format!("{}-{}", project, environment)
}

fn derive(validated: &ValidatedInput<'_>) -> Result<DerivedConfig> {
    let input = validated.input;
    let environment = validated.environment;
    let profile = environment.profile();
    let prefix = name_prefix(&input.project_name, environment);
    log::debug!("Resolving configuration for {}", prefix);

    let tags = Tags::fixed(
        &input.project_name,
        environment.as_str(),
        &input.region,
        &input.owner,
    )
    .merge(input.additional_tags.clone());

    let subnet_partitions =
        SubnetPartitions::compute(&validated.vpc_cidr, &input.availability_zones)?;
    let instance_assignments = assign_instances(input, &prefix, &profile)?;

    let security_groups = SecurityGroupRole::ALL
        .iter()
        .map(|role| SecurityGroupSpec::new(*role, &prefix))
        .collect();

    let cluster_name = input
        .cluster_name
        .clone()
        .unwrap_or_else(|| format!("{}-eks", prefix));
    let log_groups: BTreeMap<LogGroup, LogGroupSpec> = LogGroup::ALL
        .iter()
        .map(|group| {
            let spec = LogGroupSpec {
                name: group.path(&prefix, &cluster_name),
                retention_days: profile.log_retention_days,
            };
            (*group, spec)
        })
        .collect();

    let conditional_blocks = conditional_blocks(
        input,
        environment,
        &profile,
        &prefix,
        &cluster_name,
        &subnet_partitions.public,
    );

    let capacity_type = if conditional_blocks.spot_pricing.is_some() {
        CapacityType::Spot
    } else {
        CapacityType::OnDemand
    };
    let cluster = ClusterConfig {
        node_group: NodeGroupConfig {
            name: format!("{}-nodes", cluster_name),
            instance_types: vec![input.instance_type.clone()],
            capacity_type,
            desired: input.node_group.desired,
            min: input.node_group.min,
            max: input.node_group.max,
        },
        name: cluster_name,
    };

    let monitoring = MonitoringConfig {
        metrics_workspace_alias: format!("{}-metrics", prefix),
        dashboard_workspace_name: format!("{}-dashboards", prefix),
        retention_days: input.metrics_retention_days,
        scrape_interval: input.scrape_interval.clone(),
        agent_config_parameter: format!(
            "/{}/{}/cloudwatch-agent/config",
            input.project_name, environment
        ),
        monitoring_interval: profile.monitoring_interval,
    };

    log::info!(
        "Resolved {}: {} instances across {} zones",
        prefix,
        instance_assignments.len(),
        input.availability_zones.len()
    );

    Ok(DerivedConfig {
        project_name: input.project_name.clone(),
        environment,
        region: input.region.clone(),
        name_prefix: prefix,
        tags,
        profile,
        vpc_cidr: validated.vpc_cidr,
        subnet_partitions,
        instance_assignments,
        security_groups,
        cluster,
        monitoring,
        conditional_blocks,
        log_groups,
    })
}

/// Place instances round-robin across the zone list
///
/// Zones are reused whenever there are more instances than zones.
fn assign_instances(
    input: &InputSet,
    prefix: &str,
    profile: &EnvironmentProfile,
) -> std::result::Result<Vec<InstanceAssignment>, SizingError> {
    let zones = &input.availability_zones;
    if zones.is_empty() {
        return Err(SizingError::NoAvailabilityZones);
    }

    Ok((0..input.instance_count)
        .map(|index| InstanceAssignment {
            index,
            name: format!("{}-instance-{}", prefix, index + 1),
            instance_type: input.instance_type.clone(),
            availability_zone: zones[index % zones.len()].clone(),
            detailed_monitoring: profile.instance_monitoring,
        })
        .collect())
}

fn conditional_blocks(
    input: &InputSet,
    environment: Environment,
    profile: &EnvironmentProfile,
    prefix: &str,
    cluster_name: &str,
    public_subnets: &[Subnet],
) -> ConditionalBlocks {
    let features = &input.features;

    let collector = features.enable_collector.then(|| CollectorBlock {
        namespace: COLLECTOR_NAMESPACE.to_string(),
        service_account: format!("{}-collector", prefix),
        log_group: LogGroup::Collector.path(prefix, cluster_name),
        scrape_interval: input.scrape_interval.clone(),
    });

    let spot_pricing =
        (features.enable_spot_instances && !environment.is_production()).then(|| {
            SpotPricingBlock {
                instance_types: vec![input.instance_type.clone()],
                allocation_strategy: SPOT_ALLOCATION_STRATEGY.to_string(),
            }
        });

    let alerting = if features.enable_alerting {
        input
            .notification_email
            .as_ref()
            .map(|email| AlertingBlock {
                topic_name: format!("{}-alerts", prefix),
                notification_email: email.clone(),
                evaluation_interval: ALERT_EVALUATION_INTERVAL.to_string(),
            })
    } else {
        None
    };

    let nat_gateway = features.enable_nat_gateway.then(|| {
        let count = if profile.enable_ha {
            public_subnets.len()
        } else {
            1
        };
        NatGatewayBlock {
            gateway_count: count,
            subnets: public_subnets.iter().take(count).map(|s| s.cidr).collect(),
        }
    });

    let container_insights = features
        .enable_container_insights
        .then(|| ContainerInsightsBlock {
            performance_log_group: format!("/aws/containerinsights/{}/performance", cluster_name),
        });

    ConditionalBlocks {
        collector,
        spot_pricing,
        alerting,
        nat_gateway,
        container_insights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ValidationRule};
    use crate::input::FeatureFlags;

    fn demo() -> InputSet {
        InputSet::new("demo", "development")
            .with_vpc_cidr("10.0.0.0/16")
            .with_zones(["us-east-1a", "us-east-1b"])
            .with_instance_count(2)
    }

    #[test]
    fn end_to_end_instance_assignments() {
        let config = resolve(&demo()).unwrap();
        let got: Vec<(usize, &str, &str)> = config
            .instance_assignments
            .iter()
            .map(|a| (a.index, a.name.as_str(), a.availability_zone.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (0, "demo-development-instance-1", "us-east-1a"),
                (1, "demo-development-instance-2", "us-east-1b"),
            ]
        );
        assert_eq!(config.name_prefix, "demo-development");
    }

    #[test]
    fn instances_round_robin_over_zones() {
        let config = resolve(&demo().with_zones(["A", "B"]).with_instance_count(5)).unwrap();
        let zones: Vec<&str> = config
            .instance_assignments
            .iter()
            .map(|a| a.availability_zone.as_str())
            .collect();
        assert_eq!(zones, vec!["A", "B", "A", "B", "A"]);
    }

    #[test]
    fn single_zone_hosts_every_instance() {
        let config = resolve(&demo().with_zones(["A"]).with_instance_count(3)).unwrap();
        assert!(
            config
                .instance_assignments
                .iter()
                .all(|a| a.availability_zone == "A")
        );
        assert_eq!(config.instance_assignments.len(), 3);
    }

    #[test]
    fn zero_instances_is_empty_list() {
        let config = resolve(&demo().with_instance_count(0)).unwrap();
        assert!(config.instance_assignments.is_empty());
    }

    #[test]
    fn empty_zone_list_is_sizing_error() {
        let err = resolve(&demo().with_zones(Vec::<String>::new())).unwrap_err();
        assert_eq!(err, Error::Sizing(SizingError::NoAvailabilityZones));
    }

    #[test]
    fn small_vpc_is_sizing_error() {
        let err = resolve(&demo().with_vpc_cidr("10.0.0.0/28")).unwrap_err();
        assert!(matches!(err, Error::Sizing(SizingError::CidrTooSmall { .. })));
    }

    #[test]
    fn invalid_project_name_is_validation_error() {
        let mut input = demo();
        input.project_name = "my demo".to_string();
        match resolve(&input).unwrap_err() {
            Error::Validation(e) => assert_eq!(e.rule, ValidationRule::ProjectName),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn resolution_is_deterministic() {
        let input = demo()
            .with_tag("Team", "sre")
            .with_tag("CostCenter", "42")
            .with_features(FeatureFlags {
                enable_collector: true,
                enable_spot_instances: true,
                enable_nat_gateway: true,
                ..Default::default()
            });
        let a = resolve(&input).unwrap();
        let b = resolve(&input).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }

    #[test]
    fn every_environment_resolves() {
        for env in Environment::ALL {
            let mut input = demo();
            input.environment = env.as_str().to_string();
            let config = resolve(&input).unwrap();
            assert_eq!(config.profile, env.profile());
        }
    }

    #[test]
    fn caller_tags_override_fixed_tags() {
        let config = resolve(&demo().with_tag("Project", "override").with_tag("Team", "x")).unwrap();
        assert_eq!(config.tags.get("Project"), Some("override"));
        assert_eq!(config.tags.get("Team"), Some("x"));
        assert_eq!(config.tags.get("Environment"), Some("development"));
        assert_eq!(config.tags.get("ManagedBy"), Some("strata"));
    }

    #[test]
    fn spot_block_absent_in_production() {
        let spot = FeatureFlags {
            enable_spot_instances: true,
            ..Default::default()
        };
        let mut input = demo().with_features(spot);
        input.environment = "production".to_string();
        let config = resolve(&input).unwrap();
        assert!(config.conditional_blocks.spot_pricing.is_none());
        assert_eq!(config.cluster.node_group.capacity_type, CapacityType::OnDemand);

        input.environment = "staging".to_string();
        let config = resolve(&input).unwrap();
        assert!(config.conditional_blocks.spot_pricing.is_some());
        assert_eq!(config.cluster.node_group.capacity_type, CapacityType::Spot);

        let config = resolve(&demo()).unwrap();
        assert!(config.conditional_blocks.spot_pricing.is_none());
    }

    #[test]
    fn disabled_blocks_are_absent_from_json() {
        let json = resolve(&demo()).unwrap().to_json().unwrap();
        let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(doc["conditional_blocks"], serde_json::json!({}));
    }

    #[test]
    fn collector_block_follows_flag() {
        let input = demo().with_features(FeatureFlags {
            enable_collector: true,
            ..Default::default()
        });
        let collector = resolve(&input).unwrap().conditional_blocks.collector.unwrap();
        assert_eq!(collector.namespace, COLLECTOR_NAMESPACE);
        assert_eq!(collector.log_group, "/aws/eks/demo-development-eks/collector");
    }

    #[test]
    fn alerting_block_carries_email() {
        let mut input = demo().with_features(FeatureFlags {
            enable_alerting: true,
            ..Default::default()
        });
        input.notification_email = Some("oncall@example.com".to_string());
        let alerting = resolve(&input).unwrap().conditional_blocks.alerting.unwrap();
        assert_eq!(alerting.topic_name, "demo-development-alerts");
        assert_eq!(alerting.notification_email, "oncall@example.com");
    }

    #[test]
    fn nat_gateways_follow_ha_profile() {
        let features = FeatureFlags {
            enable_nat_gateway: true,
            ..Default::default()
        };
        let nat = resolve(&demo().with_features(features.clone()))
            .unwrap()
            .conditional_blocks
            .nat_gateway
            .unwrap();
        assert_eq!(nat.gateway_count, 1);
        assert_eq!(nat.subnets[0].to_string(), "10.0.1.0/24");

        let mut input = demo().with_features(features);
        input.environment = "production".to_string();
        let nat = resolve(&input).unwrap().conditional_blocks.nat_gateway.unwrap();
        assert_eq!(nat.gateway_count, 2);
    }

    #[test]
    fn log_groups_use_prefix_and_cluster_name() {
        let mut input = demo();
        input.cluster_name = Some("shared-eks".to_string());
        let config = resolve(&input).unwrap();
        assert_eq!(config.log_groups.len(), 5);
        assert_eq!(
            config.log_group(LogGroup::Cluster),
            Some("/aws/eks/shared-eks/cluster")
        );
        assert_eq!(
            config.log_group(LogGroup::Metrics),
            Some("/aws/prometheus/demo-development")
        );
        assert_eq!(config.cluster.name, "shared-eks");
        for spec in config.log_groups.values() {
            assert_eq!(spec.retention_days, 7);
        }
    }

    #[test]
    fn log_group_retention_follows_profile() {
        for env in Environment::ALL {
            let config = resolve(&InputSet::new("demo", env.as_str())).unwrap();
            for spec in config.log_groups.values() {
                assert_eq!(spec.retention_days, env.profile().log_retention_days);
            }
        }
    }

    #[test]
    fn four_security_groups() {
        let config = resolve(&demo()).unwrap();
        let names: Vec<&str> = config.security_groups.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "demo-development-cluster-sg",
                "demo-development-nodes-sg",
                "demo-development-monitoring-sg",
                "demo-development-dashboard-sg",
            ]
        );
    }

    #[test]
    fn monitoring_section() {
        let config = resolve(&demo()).unwrap();
        assert_eq!(config.monitoring.metrics_workspace_alias, "demo-development-metrics");
        assert_eq!(
            config.monitoring.agent_config_parameter,
            "/demo/development/cloudwatch-agent/config"
        );
        assert_eq!(config.monitoring.monitoring_interval, 300);
    }
}
