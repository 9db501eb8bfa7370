use camino::{Utf8Path, Utf8PathBuf};
use csv::StringRecord;

use crate::domain::SeedId;
use crate::error::HarvestError;
use crate::fs_util;
use crate::seed::{SeedRecord, SeedTable, Stage};

pub const PROGRESS_LOG_FILE: &str = "seeds_log.csv";

const LEADING_COLUMNS: [&str; 10] = [
    "Seed_ID",
    "AIP_ID",
    "Title",
    "Department",
    "Related_Collection",
    "Collection_ID",
    "Job_ID",
    "Size_GB",
    "WARCs",
    "WARC_Filenames",
];
const COMPLETE_COLUMN: &str = "Complete";

/// Durable per-seed progress, rewritten after every seed. The only state a resumed
/// run relies on.
pub trait ProgressStore {
    /// Every persisted seed, or `None` when nothing has been written yet.
    fn load_all(&mut self) -> Result<Option<SeedTable>, HarvestError>;

    /// Persists a freshly built inventory as the starting point of a run.
    fn initialize(&mut self, table: &SeedTable) -> Result<(), HarvestError>;

    /// Persists one seed. Work on a seed is durable once this returns.
    fn save(&mut self, seed: &SeedRecord) -> Result<(), HarvestError>;
}

/// `seeds_log.csv`, rewritten wholesale on every save.
pub struct CsvProgressLog {
    path: Utf8PathBuf,
    table: SeedTable,
}

impl CsvProgressLog {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            table: SeedTable::new(),
        }
    }

    pub fn in_dir(dir: &Utf8Path) -> Self {
        Self::new(dir.join(PROGRESS_LOG_FILE))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn flush(&self) -> Result<(), HarvestError> {
        let bytes = write_table(&self.table)?;
        fs_util::write_bytes_atomic(&self.path, &bytes)
    }
}

impl ProgressStore for CsvProgressLog {
    fn load_all(&mut self) -> Result<Option<SeedTable>, HarvestError> {
        if !self.path.as_std_path().exists() {
            return Ok(None);
        }
        let content = std::fs::read(self.path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("read {}: {err}", self.path)))?;
        let table = read_table(&content)?;
        self.table = table.clone();
        Ok(Some(table))
    }

    fn initialize(&mut self, table: &SeedTable) -> Result<(), HarvestError> {
        self.table = table.clone();
        self.flush()
    }

    fn save(&mut self, seed: &SeedRecord) -> Result<(), HarvestError> {
        self.table.upsert(seed.clone());
        self.flush()
    }
}

/// Keeps progress in memory only; used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    table: Option<SeedTable>,
    pub saves: usize,
}

impl MemoryProgressStore {
    pub fn with_table(table: SeedTable) -> Self {
        Self {
            table: Some(table),
            saves: 0,
        }
    }

    pub fn table(&self) -> Option<&SeedTable> {
        self.table.as_ref()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn load_all(&mut self) -> Result<Option<SeedTable>, HarvestError> {
        Ok(self.table.clone())
    }

    fn initialize(&mut self, table: &SeedTable) -> Result<(), HarvestError> {
        self.table = Some(table.clone());
        Ok(())
    }

    fn save(&mut self, seed: &SeedRecord) -> Result<(), HarvestError> {
        self.table.get_or_insert_with(SeedTable::new).upsert(seed.clone());
        self.saves += 1;
        Ok(())
    }
}

pub fn header() -> Vec<&'static str> {
    let mut columns = LEADING_COLUMNS.to_vec();
    columns.extend(Stage::ALL.iter().map(Stage::column));
    columns.push(COMPLETE_COLUMN);
    columns
}

pub fn write_table(table: &SeedTable) -> Result<Vec<u8>, HarvestError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header())?;
    for seed in table.iter() {
        let mut row = vec![
            seed.seed_id.to_string(),
            seed.aip_id.clone().unwrap_or_default(),
            seed.title.clone().unwrap_or_default(),
            seed.department.clone().unwrap_or_default(),
            seed.related_collection.clone().unwrap_or_default(),
            seed.collection_ids.join(","),
            seed.job_ids.join(","),
            format!("{:.3}", seed.size_gb),
            seed.warc_count().to_string(),
            seed.warc_filenames.join(";"),
        ];
        row.extend(Stage::ALL.iter().map(|stage| seed.render(*stage)));
        row.push(seed.complete().unwrap_or_default().to_string());
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|err| HarvestError::Csv(err.to_string()))
}

pub fn read_table(content: &[u8]) -> Result<SeedTable, HarvestError> {
    let mut reader = csv::Reader::from_reader(content);
    let headers = reader.headers()?.clone();
    if !headers.iter().any(|header| header == "Seed_ID") {
        return Err(HarvestError::Csv(
            "progress log has no Seed_ID column".to_string(),
        ));
    }

    let mut table = SeedTable::new();
    for row in reader.records() {
        let row = row?;
        let value = |name: &str| cell(&headers, &row, name).to_string();
        let seed_id: SeedId = value("Seed_ID").parse()?;
        let mut seed = SeedRecord::new(seed_id);
        seed.aip_id = non_empty(&value("AIP_ID"));
        seed.title = non_empty(&value("Title"));
        seed.department = non_empty(&value("Department"));
        seed.related_collection = non_empty(&value("Related_Collection"));
        seed.collection_ids = split_list(&value("Collection_ID"), ',');
        seed.job_ids = split_list(&value("Job_ID"), ',');
        seed.size_gb = value("Size_GB").parse().unwrap_or(0.0);
        seed.warc_filenames = split_list(&value("WARC_Filenames"), ';');
        for stage in Stage::ALL {
            seed.restore(stage, &value(stage.column()));
        }
        seed.restore_complete(&value(COMPLETE_COLUMN));
        table.upsert(seed);
    }
    Ok(table)
}

/// Cell by column name; absent columns read as empty.
fn cell<'r>(headers: &StringRecord, row: &'r StringRecord, name: &str) -> &'r str {
    headers
        .iter()
        .position(|header| header == name)
        .and_then(|position| row.get(position))
        .unwrap_or("")
        .trim()
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
