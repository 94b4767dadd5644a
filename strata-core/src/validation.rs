//! Validation of raw inputs
//!
//! Rules run in a fixed order and the first failure is reported:
//! project name, environment, retention, scrape interval, VPC CIDR,
//! region, cluster name, notification e-mail, node group sizing.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ValidationError, ValidationRule};
use crate::input::InputSet;
use crate::network::Cidr;
use crate::profile::Environment;

/// Inclusive bounds for `metrics_retention_days`
pub const RETENTION_DAYS: std::ops::RangeInclusive<u32> = 1..=450;

pub(crate) static PROJECT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("project name pattern"));

pub(crate) static SCRAPE_INTERVAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[smh]$").expect("scrape interval pattern"));

pub(crate) static REGION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("region pattern"));

static CLUSTER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,99}$").expect("cluster name pattern"));

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern"));

/// Absolute parameter or log group path
pub(crate) static RESOURCE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[A-Za-z0-9_./-]+$").expect("resource path pattern"));

/// Inputs that passed validation, with the typed forms of checked fields
#[derive(Debug, Clone)]
pub struct ValidatedInput<'a> {
    pub input: &'a InputSet,
    pub environment: Environment,
    pub vpc_cidr: Cidr,
}

/// Check `input` against every rule, stopping at the first failure
pub fn validate(input: &InputSet) -> Result<ValidatedInput<'_>, ValidationError> {
    if !PROJECT_NAME.is_match(&input.project_name) {
        return Err(ValidationError::new(
            ValidationRule::ProjectName,
            format!(
                "'{}' must contain only letters, digits and hyphens",
                input.project_name
            ),
        ));
    }

    let environment: Environment = input
        .environment
        .parse()
        .map_err(|msg| ValidationError::new(ValidationRule::Environment, msg))?;

    if !RETENTION_DAYS.contains(&input.metrics_retention_days) {
        return Err(ValidationError::new(
            ValidationRule::Retention,
            format!(
                "must be between {} and {} days, got {}",
                RETENTION_DAYS.start(),
                RETENTION_DAYS.end(),
                input.metrics_retention_days
            ),
        ));
    }

    if !SCRAPE_INTERVAL.is_match(&input.scrape_interval) {
        return Err(ValidationError::new(
            ValidationRule::ScrapeInterval,
            format!(
                "'{}' must be a number followed by s, m or h",
                input.scrape_interval
            ),
        ));
    }

    let vpc_cidr: Cidr = input
        .vpc_cidr
        .parse()
        .map_err(|msg: String| {
            ValidationError::new(
                ValidationRule::VpcCidr,
                format!("'{}': {}", input.vpc_cidr, msg),
            )
        })?;

    if !REGION.is_match(&input.region) {
        return Err(ValidationError::new(
            ValidationRule::Region,
            format!("'{}' is not a valid region name", input.region),
        ));
    }

    if let Some(cluster_name) = input.cluster_name.as_deref()
        && !CLUSTER_NAME.is_match(cluster_name)
    {
        return Err(ValidationError::new(
            ValidationRule::ClusterName,
            format!(
                "'{}' must start with a letter or digit and contain only letters, digits, hyphens and underscores",
                cluster_name
            ),
        ));
    }

    if input.features.enable_alerting {
        match input.notification_email.as_deref() {
            Some(email) if EMAIL.is_match(email) => {}
            Some(email) => {
                return Err(ValidationError::new(
                    ValidationRule::NotificationEmail,
                    format!("'{}' is not a valid e-mail address", email),
                ));
            }
            None => {
                return Err(ValidationError::new(
                    ValidationRule::NotificationEmail,
                    "alerting is enabled but no address is set",
                ));
            }
        }
    }

    let sizing = input.node_group;
    if sizing.min > sizing.desired || sizing.desired > sizing.max {
        return Err(ValidationError::new(
            ValidationRule::NodeGroupSizing,
            format!(
                "expected min <= desired <= max, got {} / {} / {}",
                sizing.min, sizing.desired, sizing.max
            ),
        ));
    }

    Ok(ValidatedInput {
        input,
        environment,
        vpc_cidr,
    })
}
