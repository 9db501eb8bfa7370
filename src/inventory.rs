use std::collections::HashMap;

use tracing::{info, warn};

use crate::archive_it::{ArchiveItClient, WarcRecord};
use crate::domain::{DateWindow, SeedId, extract_seed_id, parse_store_time};
use crate::error::HarvestError;
use crate::naming::{NamingInput, NamingPolicy, assign_aip_ids};
use crate::seed::{SEED_METADATA_SUCCESS, SeedRecord, SeedTable, Stage};

const BYTES_PER_GB: f64 = 1_000_000_000.0;

/// Lists the window's WARCs, groups them by seed, fills seed metadata and assigns
/// AIP ids. A WARC filename without a seed id aborts the whole build.
pub fn build_inventory<C: ArchiveItClient + ?Sized>(
    client: &C,
    window: &DateWindow,
    naming: &dyn NamingPolicy,
) -> Result<SeedTable, HarvestError> {
    let records = client.list_warcs(window)?;
    let mut table = aggregate_warcs(&records, window)?;
    info!(
        warcs = records.len(),
        seeds = table.len(),
        "built WARC inventory"
    );
    enrich_seed_metadata(client, &mut table);
    assign_table_aip_ids(&mut table, window, naming);
    Ok(table)
}

/// Groups WARC records by seed id, in first-seen order, dropping records stored
/// outside `window`.
pub fn aggregate_warcs(
    records: &[WarcRecord],
    window: &DateWindow,
) -> Result<SeedTable, HarvestError> {
    let mut order: Vec<SeedId> = Vec::new();
    let mut groups: HashMap<SeedId, (SeedRecord, u64)> = HashMap::new();

    for record in records {
        let seed_id = extract_seed_id(&record.filename)?;
        let store_time = record.store_time.as_deref().unwrap_or_default();
        let stored = parse_store_time(&record.filename, store_time)?;
        if !window.contains(stored) {
            continue;
        }

        let (seed, bytes) = groups.entry(seed_id.clone()).or_insert_with(|| {
            order.push(seed_id.clone());
            (SeedRecord::new(seed_id.clone()), 0)
        });
        if seed.warc_filenames.contains(&record.filename) {
            continue;
        }
        push_unique(&mut seed.collection_ids, record.collection.as_deref());
        push_unique(&mut seed.job_ids, record.crawl.as_deref());
        seed.warc_filenames.push(record.filename.clone());
        *bytes += record.size;
    }

    Ok(order
        .into_iter()
        .filter_map(|seed_id| groups.remove(&seed_id))
        .map(|(mut seed, bytes)| {
            seed.size_gb = bytes_to_gb(bytes);
            seed
        })
        .collect())
}

fn push_unique(values: &mut Vec<String>, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
        if !values.iter().any(|existing| existing == value) {
            values.push(value.to_string());
        }
    }
}

/// Bytes to GB, rounded to three decimals.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_GB * 1000.0).round() / 1000.0
}

/// Looks up title, department and related collection for every seed. A failed
/// lookup is recorded on the seed; the seed stays in the inventory.
pub fn enrich_seed_metadata<C: ArchiveItClient + ?Sized>(client: &C, table: &mut SeedTable) {
    for seed in table.iter_mut() {
        match client.seed_metadata(&seed.seed_id) {
            Ok(metadata) => {
                seed.title = metadata.title;
                seed.department = metadata.department;
                seed.related_collection = metadata.related_collection;
                seed.success(Stage::SeedMetadata, SEED_METADATA_SUCCESS);
            }
            Err(err) => {
                warn!(seed = %seed.seed_id, error = %err, "seed metadata lookup failed");
                seed.failure(
                    Stage::SeedMetadata,
                    format!("Could not get seed metadata: {err}"),
                );
            }
        }
    }
}

pub fn assign_table_aip_ids(table: &mut SeedTable, window: &DateWindow, naming: &dyn NamingPolicy) {
    let ids = {
        let inputs: Vec<NamingInput<'_>> = table
            .iter()
            .map(|seed| NamingInput {
                seed_id: &seed.seed_id,
                department: seed.department.as_deref(),
                related_collection: seed.related_collection.as_deref(),
            })
            .collect();
        assign_aip_ids(naming, window, &inputs)
    };
    for (seed, aip_id) in table.iter_mut().zip(ids) {
        seed.aip_id = aip_id;
    }
}
