//! JMdict ingestion and word query / JMdict 导入与查词
//!
//! Corpus → parser → extractor → loader (batch + frequency) → store → query.

pub mod builder;
pub mod error;
pub mod extractor;
pub mod frequency;
pub mod kana;
pub mod loader;
pub mod parser;
pub mod progress;
pub mod query;
pub mod schema;
pub mod store;

#[cfg(test)]
mod testutil;

pub use builder::{DictBuilder, Generations, StoreHandle};
pub use error::{DictError, Result};
pub use frequency::{FrequencySource, HttpFrequencySource, NoFrequency};
pub use loader::{CorpusLoader, LoadStats};
pub use progress::{BuildProgress, BuildState};
pub use query::{GenerateRequest, GenerateResult, OutputFormat, QueryEngine};
pub use schema::{DictEntry, Entry, Form, Meaning};
pub use store::{DictStore, FormQuery, StoreStats};
