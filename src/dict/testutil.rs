//! Shared fixtures for dictionary tests / 测试辅助

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::Stream;

use super::error::{DictError, Result};
use super::extractor::extract;
use super::frequency::FrequencySource;
use super::schema::{DictEntry, RawElement, RawEntry, RawSense};
use super::store::DictStore;

fn elements(items: &[(&str, bool)]) -> Vec<RawElement> {
    items
        .iter()
        .map(|(v, pri)| RawElement {
            value: Some(v.to_string()),
            text: v.to_string(),
            has_priority: *pri,
        })
        .collect()
}

pub fn raw(id: &str, kanji: &[(&str, bool)], readings: &[(&str, bool)], glosses: &[&str]) -> RawEntry {
    RawEntry {
        seq: id.to_string(),
        kanji: elements(kanji),
        readings: elements(readings),
        senses: vec![RawSense {
            pos: Vec::new(),
            xrefs: Vec::new(),
            glosses: glosses.iter().map(|g| g.to_string()).collect(),
        }],
    }
}

pub fn entry(id: &str, kanji: &[(&str, bool)], readings: &[(&str, bool)], glosses: &[&str]) -> DictEntry {
    extract(&raw(id, kanji, readings, glosses)).expect("fixture entry has a valid form")
}

pub fn raw_stream(entries: Vec<RawEntry>) -> impl Stream<Item = Result<RawEntry>> + Unpin {
    futures::stream::iter(entries.into_iter().map(Ok))
}

pub async fn temp_store() -> (tempfile::TempDir, DictStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = DictStore::open(&dir.path().join("jmdict-test.db"))
        .await
        .expect("open store");
    store.init().await.expect("init store");
    (dir, store)
}

/// Deterministic frequency source backed by a map / 固定词频表
pub struct MapFrequency {
    scores: HashMap<String, f64>,
    calls: AtomicUsize,
}

impl MapFrequency {
    pub fn new(scores: &[(&str, f64)]) -> Self {
        Self {
            scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrequencySource for MapFrequency {
    async fn lookup_frequencies(&self, slugs: &[String]) -> Result<HashMap<String, f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(slugs
            .iter()
            .filter_map(|s| self.scores.get(s).map(|v| (s.clone(), *v)))
            .collect())
    }
}

pub struct FailingFrequency;

#[async_trait]
impl FrequencySource for FailingFrequency {
    async fn lookup_frequencies(&self, _slugs: &[String]) -> Result<HashMap<String, f64>> {
        Err(DictError::Enrichment("service unavailable".to_string()))
    }
}
