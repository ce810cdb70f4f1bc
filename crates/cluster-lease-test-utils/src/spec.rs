//! Sample cluster specs

use cluster_lease_common::ClusterSpec;

/// A small fixed-size cluster; `test_id` only changes ignored metadata
pub fn sample_spec(test_id: &str) -> ClusterSpec {
    ClusterSpec::new("15.4.x-scala2.12", "i3.xlarge", 2)
        .with_name(format!("it-{test_id}"))
        .with_spark_conf("spark.sql.shuffle.partitions", "8")
        .with_extra("test_id", test_id)
}

/// Same as [`sample_spec`] but with a different worker count, so it never
/// shares a cluster with it
pub fn sample_spec_variant(test_id: &str) -> ClusterSpec {
    ClusterSpec {
        num_workers: 4,
        ..sample_spec(test_id)
    }
}
