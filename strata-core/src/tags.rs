//! Tags applied to every provisioned resource

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Value of the `ManagedBy` tag
pub const MANAGED_BY: &str = "strata";

/// Value of the `Purpose` tag
pub const PURPOSE: &str = "observability";

/// Ordered tag set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// The fixed tag set every resource carries
    pub fn fixed(project: &str, environment: &str, region: &str, owner: &str) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("Project".to_string(), project.to_string());
        tags.insert("Environment".to_string(), environment.to_string());
        tags.insert("Region".to_string(), region.to_string());
        tags.insert("ManagedBy".to_string(), MANAGED_BY.to_string());
        tags.insert("Purpose".to_string(), PURPOSE.to_string());
        tags.insert("Owner".to_string(), owner.to_string());
        Self(tags)
    }

    /// Overlay caller-supplied tags, overwriting on key collision
    ///
    /// Writes are applied in key order (stable for equal keys), so the
    /// result does not depend on how the caller's collection iterates.
    pub fn merge<I, K, V>(mut self, additional: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut writes: Vec<(String, String)> = additional
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        writes.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, value) in writes {
            self.0.insert(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
