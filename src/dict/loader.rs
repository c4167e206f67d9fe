//! Corpus loader - parse → extract → batch → enrich → store / 语料导入
//!
//! Single pass, single writer. Every run starts from empty tables; a failed
//! frequency lookup or store write aborts the run without committing the
//! current batch.

use futures::{Stream, StreamExt};
use serde::Serialize;
use std::collections::HashSet;

use super::error::{DictError, Result};
use super::extractor::extract;
use super::frequency::FrequencySource;
use super::progress::BuildState;
use super::schema::{DictEntry, RawEntry};
use super::store::DictStore;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Ingestion summary / 导入统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub entries_read: u64,
    /// Entries without a valid form / 无有效词形而丢弃的词条
    pub entries_dropped: u64,
    pub entries_stored: u64,
    pub forms_stored: u64,
    pub batches: u64,
}

pub struct CorpusLoader<'a> {
    store: &'a DictStore,
    frequency: &'a dyn FrequencySource,
    batch_size: usize,
    progress: Option<&'a BuildState>,
}

impl<'a> CorpusLoader<'a> {
    pub fn new(store: &'a DictStore, frequency: &'a dyn FrequencySource) -> Self {
        Self {
            store,
            frequency,
            batch_size: DEFAULT_BATCH_SIZE,
            progress: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_progress(mut self, progress: &'a BuildState) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Rebuild the store from a stream of raw entries / 从词条流重建存储
    pub async fn load<S>(&self, mut entries: S) -> Result<LoadStats>
    where
        S: Stream<Item = Result<RawEntry>> + Unpin,
    {
        self.store.reset_tables().await?;

        let mut stats = LoadStats::default();
        let mut batch: Vec<DictEntry> = Vec::with_capacity(self.batch_size);

        while let Some(item) = entries.next().await {
            let raw = item?;
            stats.entries_read += 1;
            if let Some(p) = self.progress {
                p.entry_read();
            }

            match extract(&raw) {
                Some(entry) => batch.push(entry),
                None => {
                    stats.entries_dropped += 1;
                    tracing::debug!("Entry {} has no valid form, dropped", raw.seq);
                }
            }

            if batch.len() >= self.batch_size {
                self.flush(&mut batch, &mut stats).await?;
            }
        }

        if !batch.is_empty() {
            self.flush(&mut batch, &mut stats).await?;
        }

        tracing::info!(
            "Corpus loaded: {} read, {} stored ({} forms), {} dropped, {} batches",
            stats.entries_read,
            stats.entries_stored,
            stats.forms_stored,
            stats.entries_dropped,
            stats.batches
        );
        Ok(stats)
    }

    async fn flush(&self, batch: &mut Vec<DictEntry>, stats: &mut LoadStats) -> Result<()> {
        if self.progress.map(|p| p.is_cancelled()).unwrap_or(false) {
            return Err(DictError::Cancelled);
        }

        enrich(batch, self.frequency).await?;
        self.store.insert_batch(batch).await?;

        stats.batches += 1;
        stats.entries_stored += batch.len() as u64;
        stats.forms_stored += batch.iter().map(|e| e.forms.len() as u64).sum::<u64>();
        if let Some(p) = self.progress {
            p.batch_stored(stats.entries_stored, stats.entries_dropped);
        }
        tracing::debug!("Batch {} stored ({} entries)", stats.batches, batch.len());

        batch.clear();
        Ok(())
    }
}

/// Distinct slugs of a batch in first-seen order / 批次内去重后的查询键
pub fn distinct_slugs(batch: &[DictEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    batch
        .iter()
        .filter_map(|e| e.slug())
        .filter(|s| seen.insert(*s))
        .map(str::to_string)
        .collect()
}

/// One lookup per batch, fanned out to every entry sharing a slug / 批量查询词频并回填
pub async fn enrich(batch: &mut [DictEntry], source: &dyn FrequencySource) -> Result<()> {
    let slugs = distinct_slugs(batch);
    let scores = source.lookup_frequencies(&slugs).await?;

    for item in batch.iter_mut() {
        let frequency = item.slug().and_then(|s| scores.get(s)).copied();
        item.entry.frequency = frequency;
    }
    Ok(())
}
