//! Cluster configuration requested by a caller
//!
//! A `ClusterSpec` mirrors the Databricks cluster creation payload. Fields the
//! coordinator does not model explicitly are kept in `extra` so that callers
//! can pass arbitrary settings (and test-specific metadata such as `test_id`)
//! without losing them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Autoscaling bounds, used instead of a fixed `num_workers`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Autoscale {
    pub min_workers: u32,
    pub max_workers: u32,
}

/// Configuration of a compute cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Display name; never part of the sharing fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Databricks runtime version (e.g. "15.4.x-scala2.12")
    pub spark_version: String,

    /// Worker node type (e.g. "i3.xlarge")
    pub node_type_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_node_type_id: Option<String>,

    /// Fixed worker count; ignored by the provider when `autoscale` is set
    #[serde(default)]
    pub num_workers: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscale: Option<Autoscale>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autotermination_minutes: Option<u32>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spark_conf: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spark_env_vars: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_tags: BTreeMap<String, String>,

    /// Access mode (e.g. "SINGLE_USER", "USER_ISOLATION")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_security_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_user_name: Option<String>,

    /// "STANDARD" or "PHOTON"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_engine: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_pool_id: Option<String>,

    /// Any other settings, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClusterSpec {
    /// Create a fixed-size cluster spec
    pub fn new(
        spark_version: impl Into<String>,
        node_type_id: impl Into<String>,
        num_workers: u32,
    ) -> Self {
        Self {
            spark_version: spark_version.into(),
            node_type_id: node_type_id.into(),
            num_workers,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = Some(name.into());
        self
    }

    pub fn with_spark_conf(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spark_conf.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_tags.insert(key.into(), value.into());
        self
    }

    pub fn with_autoscale(mut self, min_workers: u32, max_workers: u32) -> Self {
        self.autoscale = Some(Autoscale {
            min_workers,
            max_workers,
        });
        self
    }

    pub fn with_autotermination(mut self, minutes: u32) -> Self {
        self.autotermination_minutes = Some(minutes);
        self
    }

    /// Attach an arbitrary passthrough field
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Serialize to a JSON object
    ///
    /// Serialization of this type cannot fail (string keys, no non-finite
    /// floats), so an unexpected failure yields an empty object.
    pub fn to_json(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
