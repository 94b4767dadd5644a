//! Error - Failure kinds of resolution and rendering
//!
//! All failures here are local and synchronous. Nothing in the core
//! performs I/O, so there is no transient class and nothing is retried.

use std::fmt;

/// Input rule that a `ValidationError` refers to
///
/// Variants are listed in the order the validator checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationRule {
    ProjectName,
    Environment,
    Retention,
    ScrapeInterval,
    VpcCidr,
    Region,
    ClusterName,
    NotificationEmail,
    NodeGroupSizing,
}

impl ValidationRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationRule::ProjectName => "project_name",
            ValidationRule::Environment => "environment",
            ValidationRule::Retention => "metrics_retention_days",
            ValidationRule::ScrapeInterval => "scrape_interval",
            ValidationRule::VpcCidr => "vpc_cidr",
            ValidationRule::Region => "region",
            ValidationRule::ClusterName => "cluster_name",
            ValidationRule::NotificationEmail => "notification_email",
            ValidationRule::NodeGroupSizing => "node_group",
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malformed or out-of-range input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{rule}: {message}")]
pub struct ValidationError {
    pub rule: ValidationRule,
    pub message: String,
}

impl ValidationError {
    pub fn new(rule: ValidationRule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

/// A requested subdivision or count cannot be satisfied by the inputs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SizingError {
    #[error("CIDR block {parent} is too small to add {new_bits} bits of subnetting")]
    CidrTooSmall { parent: String, new_bits: u8 },

    #[error("Subnet number {index} does not fit in {new_bits} bits of {parent}")]
    SubnetOutOfRange {
        parent: String,
        new_bits: u8,
        index: u32,
    },

    #[error("{zones} availability zones would make public subnets collide with private offset {private_offset}")]
    TooManyZones { zones: usize, private_offset: u32 },

    #[error("Availability zone list is empty")]
    NoAvailabilityZones,
}

/// A required bootstrap context field is missing or malformed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("Required context field '{0}' is empty")]
    MissingField(&'static str),

    #[error("Context field '{field}' has malformed value '{value}': {reason}")]
    MalformedField {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Metrics endpoint '{endpoint}' is malformed: {reason}")]
    MalformedEndpoint { endpoint: String, reason: String },

    #[error("Failed to encode {unit} configuration: {message}")]
    Encoding { unit: String, message: String },
}

/// Any failure of the core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Sizing error: {0}")]
    Sizing(#[from] SizingError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_rule() {
        let err = ValidationError::new(ValidationRule::ProjectName, "contains a space");
        assert_eq!(err.to_string(), "project_name: contains a space");
    }

    #[test]
    fn errors_convert_into_crate_error() {
        let err: Error = SizingError::NoAvailabilityZones.into();
        assert!(matches!(err, Error::Sizing(SizingError::NoAvailabilityZones)));
        assert_eq!(
            err.to_string(),
            "Sizing error: Availability zone list is empty"
        );
    }

    #[test]
    fn malformed_field_names_field_and_value() {
        let err = RenderError::MalformedField {
            field: "region",
            value: "us east".to_string(),
            reason: "not a region name".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Context field 'region' has malformed value 'us east': not a region name"
        );
    }
}
