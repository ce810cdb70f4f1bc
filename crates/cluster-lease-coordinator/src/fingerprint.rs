//! Sharing fingerprints for cluster specs
//!
//! Two specs that would produce interchangeable clusters hash to the same
//! fingerprint. Caller-specific fields (names, test ids, timestamps) are
//! stripped before hashing and object keys are sorted, so the result does not
//! depend on field order, process or host.

use cluster_lease_common::ClusterSpec;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Top-level fields that never influence whether a cluster can be shared
pub const IGNORED_FIELDS: &[&str] = &[
    "cluster_name",
    "test_id",
    "run_id",
    "table_name",
    "table_names",
    "created_at",
    "timestamp",
];

/// Deterministic identifier of the sharing-relevant part of a cluster spec
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a spec
    pub fn compute(spec: &ClusterSpec) -> Self {
        let mut fields = spec.to_json();
        for key in IGNORED_FIELDS {
            fields.remove(*key);
        }
        let canonical = canonicalize(Value::Object(fields));
        Self(hex::encode(Sha256::digest(canonical.to_string().as_bytes())))
    }

    /// Wrap a stored fingerprint string
    pub fn from_stored(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for logs and cluster names
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

/// Recursively sort object keys and drop nulls
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_spec() -> ClusterSpec {
        ClusterSpec::new("15.4.x-scala2.12", "i3.xlarge", 2)
            .with_spark_conf("spark.sql.shuffle.partitions", "8")
            .with_tag("team", "data-eng")
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(
            Fingerprint::compute(&base_spec()),
            Fingerprint::compute(&base_spec())
        );
        assert_eq!(Fingerprint::compute(&base_spec()).as_str().len(), 64);
    }

    #[test]
    fn test_ignores_caller_specific_fields() {
        let a = base_spec()
            .with_name("test_orders_dag")
            .with_extra("test_id", "test_orders_dag")
            .with_extra("table_name", "orders");
        let b = base_spec()
            .with_name("test_users_dag")
            .with_extra("test_id", "test_users_dag")
            .with_extra("timestamp", "2026-10-18T10:00:00Z");

        assert_eq!(Fingerprint::compute(&a), Fingerprint::compute(&b));
        assert_eq!(Fingerprint::compute(&a), Fingerprint::compute(&base_spec()));
    }

    #[test]
    fn test_key_order_irrelevant() {
        let a: ClusterSpec = serde_json::from_str(
            r#"{"spark_version": "15.4.x-scala2.12", "node_type_id": "i3.xlarge",
                "num_workers": 2, "aws_attributes": {"zone_id": "auto", "availability": "SPOT"}}"#,
        )
        .unwrap();
        let b: ClusterSpec = serde_json::from_str(
            r#"{"aws_attributes": {"availability": "SPOT", "zone_id": "auto"},
                "num_workers": 2, "node_type_id": "i3.xlarge", "spark_version": "15.4.x-scala2.12"}"#,
        )
        .unwrap();

        assert_eq!(Fingerprint::compute(&a), Fingerprint::compute(&b));
    }

    #[test]
    fn test_relevant_fields_change_hash() {
        let base = Fingerprint::compute(&base_spec());

        let variants = [
            ClusterSpec::new("14.3.x-scala2.12", "i3.xlarge", 2)
                .with_spark_conf("spark.sql.shuffle.partitions", "8")
                .with_tag("team", "data-eng"),
            ClusterSpec::new("15.4.x-scala2.12", "i3.2xlarge", 2)
                .with_spark_conf("spark.sql.shuffle.partitions", "8")
                .with_tag("team", "data-eng"),
            base_spec().with_autoscale(1, 4),
            base_spec().with_spark_conf("spark.sql.shuffle.partitions", "16"),
            base_spec().with_tag("team", "analytics"),
            base_spec().with_extra("enable_elastic_disk", true),
        ];

        for variant in &variants {
            assert_ne!(Fingerprint::compute(variant), base, "{variant:?}");
        }
        let mut more_workers = base_spec();
        more_workers.num_workers = 3;
        assert_ne!(Fingerprint::compute(&more_workers), base);
    }

    #[test]
    fn test_null_extra_is_ignored() {
        let with_null = base_spec().with_extra("instance_pool_id", serde_json::Value::Null);
        assert_eq!(
            Fingerprint::compute(&with_null),
            Fingerprint::compute(&base_spec())
        );
    }

    #[test]
    fn test_short() {
        let fp = Fingerprint::compute(&base_spec());
        assert_eq!(fp.short().len(), 12);
        assert!(fp.as_str().starts_with(fp.short()));
        assert_eq!(Fingerprint::from_stored("abc").short(), "abc");
    }
}
