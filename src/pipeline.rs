use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive_it::ArchiveItClient;
use crate::domain::DateWindow;
use crate::error::HarvestError;
use crate::fs_util;
use crate::inventory::build_inventory;
use crate::naming::NamingPolicy;
use crate::progress::ProgressStore;
use crate::reports::MetadataAggregator;
use crate::seed::{SeedRecord, SeedState, Stage};
use crate::tools::{Decompressor, FixityTool};
use crate::warc::WarcRetriever;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub seeds: usize,
    pub processed: usize,
    pub skipped: usize,
    pub complete: usize,
    pub errored: usize,
    pub resumed: bool,
}

/// Resumes or builds the inventory, then takes every unfinished seed through
/// metadata, WARCs and rollup, persisting after each one.
pub struct Harvester<C: ArchiveItClient, F: FixityTool, D: Decompressor> {
    client: C,
    fixity: F,
    decompressor: D,
    naming: Box<dyn NamingPolicy>,
    output_dir: Utf8PathBuf,
    warc_delay: Duration,
}

impl<C: ArchiveItClient, F: FixityTool, D: Decompressor> Harvester<C, F, D> {
    pub fn new(
        client: C,
        fixity: F,
        decompressor: D,
        naming: Box<dyn NamingPolicy>,
        output_dir: Utf8PathBuf,
    ) -> Self {
        Self {
            client,
            fixity,
            decompressor,
            naming,
            output_dir,
            warc_delay: Duration::ZERO,
        }
    }

    /// Pause between consecutive WARC downloads of a seed.
    pub fn with_warc_delay(mut self, delay: Duration) -> Self {
        self.warc_delay = delay;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn seed_folder(&self, seed: &SeedRecord) -> Utf8PathBuf {
        self.output_dir.join(seed.folder_name())
    }

    /// Runs (or resumes) the download for `window`.
    pub fn run(
        &self,
        window: &DateWindow,
        store: &mut dyn ProgressStore,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, HarvestError> {
        let started = Instant::now();
        fs_util::ensure_dir(&self.output_dir)?;

        let mut summary = RunSummary::default();
        let table = match store.load_all()? {
            Some(table) => {
                info!(seeds = table.len(), "resuming from progress log");
                summary.resumed = true;
                table
            }
            None => {
                let table = build_inventory(&self.client, window, self.naming.as_ref())?;
                store.initialize(&table)?;
                table
            }
        };

        summary.seeds = table.len();
        for (index, mut seed) in table.into_records().into_iter().enumerate() {
            if seed.is_done() {
                debug!(seed = %seed.seed_id, "already done, skipping");
                summary.skipped += 1;
                continue;
            }

            sink.event(ProgressEvent {
                message: format!("Starting seed {} of {}", index + 1, summary.seeds),
                elapsed: Some(started.elapsed()),
            });
            let state = match self.process_seed(&mut seed) {
                Ok(state) => state,
                Err(err) => {
                    warn!(seed = %seed.seed_id, error = %err, "could not prepare seed folder");
                    seed.reset_log();
                    seed.failure(
                        Stage::ReportDownload,
                        format!("Could not prepare seed folder: {err}"),
                    );
                    seed.roll_up();
                    seed.state()
                }
            };
            store.save(&seed)?;

            summary.processed += 1;
            match state {
                SeedState::Complete => summary.complete += 1,
                _ => summary.errored += 1,
            }
        }

        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            complete = summary.complete,
            errored = summary.errored,
            "download run finished"
        );
        Ok(summary)
    }

    /// Takes one seed from a clean folder to a rolled-up verdict. Only preparing the
    /// folder can fail; everything after it is recorded on the seed.
    pub fn process_seed(&self, seed: &mut SeedRecord) -> Result<SeedState, HarvestError> {
        let folder = self.seed_folder(seed);
        self.reset_partial_seed(seed, &folder)?;
        fs_util::ensure_dir(&folder)?;

        info!(seed = %seed.seed_id, folder = %folder, "processing seed");
        MetadataAggregator::new(&self.client).download_metadata(seed, folder.as_std_path());

        let retriever = WarcRetriever::new(&self.client, &self.fixity, &self.decompressor);
        let filenames = seed.warc_filenames.clone();
        for (position, filename) in filenames.iter().enumerate() {
            if position > 0 && !self.warc_delay.is_zero() {
                thread::sleep(self.warc_delay);
            }
            let outcome = retriever.retrieve(seed, filename, folder.as_std_path());
            debug!(seed = %seed.seed_id, warc = %filename, ?outcome, "WARC finished");
        }

        let verdict = seed.roll_up().to_string();
        info!(seed = %seed.seed_id, verdict = %verdict, "seed finished");
        Ok(seed.state())
    }

    /// A folder or log entries left by an interrupted run are discarded so the seed
    /// restarts from nothing.
    fn reset_partial_seed(&self, seed: &mut SeedRecord, folder: &Utf8Path) -> Result<(), HarvestError> {
        let removed = fs_util::remove_dir_if_exists(folder)?;
        if removed || seed.has_processing_entries() {
            info!(seed = %seed.seed_id, folder = %folder, "resetting partially processed seed");
            seed.reset_log();
        }
        Ok(())
    }
}
