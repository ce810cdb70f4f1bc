//! CLI operations for registry inspection and maintenance

use super::cache::SingleSlotCache;
use super::crud::delete_generation;
use super::db::DbPool;
use super::queries::{failed_leases_before, list_leases};
use super::types::{LeaseRecord, cutoff_before, now};
use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use std::time::Duration;

fn format_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn lease_table(leases: &[LeaseRecord], now: DateTime<Utc>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Fingerprint"),
            Cell::new("Status"),
            Cell::new("Cluster"),
            Cell::new("Users"),
            Cell::new("Owner"),
            Cell::new("Created"),
            Cell::new("Expires"),
        ]);

    for lease in leases {
        let owner = if lease.owner_released {
            format!("{} (released)", lease.owner_id)
        } else {
            lease.owner_id.clone()
        };
        let expires = if lease.is_expired(now) {
            format!("{} (expired)", format_time(lease.expiry_time))
        } else {
            format_time(lease.expiry_time)
        };
        let cluster = match (&lease.resource_id, &lease.error_message) {
            (Some(id), _) => id.clone(),
            (None, Some(err)) => format!("error: {err}"),
            (None, None) => "-".to_string(),
        };

        table.add_row(vec![
            Cell::new(lease.fingerprint.get(..12).unwrap_or(&lease.fingerprint)),
            Cell::new(lease.status),
            Cell::new(cluster),
            Cell::new(lease.usage_count),
            Cell::new(owner),
            Cell::new(format_time(lease.created_at)),
            Cell::new(expires),
        ]);
    }

    table
}

/// List all lease records
pub async fn list_lease_records(pool: &DbPool) -> Result<()> {
    let leases = list_leases(pool).await?;

    if leases.is_empty() {
        println!("No leases registered");
        return Ok(());
    }

    println!("{}", lease_table(&leases, now()));

    Ok(())
}

/// Show the single-slot cache
pub async fn show_cache_info(pool: &DbPool) -> Result<()> {
    let cache = SingleSlotCache::new(pool.clone());

    match cache.info(now()).await? {
        None => println!("Cache is empty"),
        Some(info) => {
            println!("Cluster:  {}", info.resource_id);
            println!("Created:  {}", format_time(info.created_at));
            println!("Expires:  {}", format_time(info.expiry_time));
            println!(
                "Status:   {}",
                if info.is_valid { "valid" } else { "expired" }
            );
        }
    }

    Ok(())
}

/// Empty the single-slot cache without touching the cluster
pub async fn clear_cache_slot(pool: &DbPool) -> Result<()> {
    let cache = SingleSlotCache::new(pool.clone());

    if cache.clear().await? {
        println!("Cache cleared");
    } else {
        println!("Cache was already empty");
    }

    Ok(())
}

/// Remove failed records older than `older_than`
pub async fn prune_failed(pool: &DbPool, older_than: Duration) -> Result<u64> {
    let cutoff = cutoff_before(now(), older_than);
    let mut pruned = 0;

    for record in failed_leases_before(pool, cutoff).await? {
        if delete_generation(pool, &record).await? {
            pruned += 1;
        }
    }

    Ok(pruned)
}
