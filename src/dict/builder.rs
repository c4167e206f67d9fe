//! Store generations and rebuild-and-swap / 词典库版本与重建切换
//!
//! 每次构建写入一个新的数据库文件 `{prefix}-{millis}.db`：
//! - 构建期间查询继续读旧版本
//! - 构建完成（complete 标记 + WAL checkpoint）后才切换句柄
//! - 旧版本在最后一个读者释放后关闭并删除
//! - 构建失败或取消时丢弃未完成的新版本

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flate2::read::GzDecoder;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;

use super::error::{DictError, Result};
use super::frequency::FrequencySource;
use super::loader::{CorpusLoader, LoadStats};
use super::parser::spawn_entry_stream;
use super::progress::BuildState;
use super::store::DictStore;
use crate::config::{AppConfig, CorpusConfig};

/// How often a retired generation checks for remaining readers
const RETIRE_POLL: Duration = Duration::from_millis(200);

/// Store generation files in one directory / 词典库版本目录
#[derive(Debug, Clone)]
pub struct Generations {
    dir: PathBuf,
    prefix: String,
}

impl Generations {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a fresh generation, never an existing file / 新版本文件路径
    pub fn new_path(&self) -> PathBuf {
        let mut stamp = chrono::Utc::now().timestamp_millis();
        loop {
            let path = self.path_for(stamp);
            if !path.exists() {
                return path;
            }
            stamp += 1;
        }
    }

    fn path_for(&self, stamp: i64) -> PathBuf {
        self.dir.join(format!("{}-{}.db", self.prefix, stamp))
    }

    fn stamp_of(&self, path: &Path) -> Option<i64> {
        let name = path.file_name()?.to_str()?;
        name.strip_prefix(&self.prefix)?
            .strip_prefix('-')?
            .strip_suffix(".db")?
            .parse()
            .ok()
    }

    /// Generation files, newest first / 按时间倒序列出版本
    pub fn list(&self) -> Vec<PathBuf> {
        let Ok(read_dir) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut found: Vec<(i64, PathBuf)> = read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter_map(|p| self.stamp_of(&p).map(|s| (s, p)))
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0));
        found.into_iter().map(|(_, p)| p).collect()
    }

    /// Open the newest complete generation and delete every other one / 打开最新的完整版本
    ///
    /// Only safe while no build is running.
    pub async fn open_current(&self) -> Result<Option<DictStore>> {
        let mut current: Option<DictStore> = None;

        for path in self.list() {
            if current.is_some() {
                tracing::info!("Removing stale dictionary generation {:?}", path);
                DictStore::delete_files(&path);
                continue;
            }

            let store = DictStore::open(&path).await?;
            if store.is_complete().await {
                current = Some(store);
            } else {
                tracing::warn!("Discarding incomplete dictionary generation {:?}", path);
                store.close().await;
                DictStore::delete_files(&path);
            }
        }

        Ok(current)
    }
}

/// Swappable handle to the live store / 当前词典库句柄
///
/// Readers clone the inner `Arc` and keep their snapshot for the whole
/// request, even if a rebuild swaps the handle meanwhile.
#[derive(Default)]
pub struct StoreHandle {
    current: RwLock<Option<Arc<DictStore>>>,
}

impl StoreHandle {
    pub fn new(store: Option<DictStore>) -> Self {
        Self {
            current: RwLock::new(store.map(Arc::new)),
        }
    }

    pub fn current(&self) -> Option<Arc<DictStore>> {
        self.current.read().clone()
    }

    pub fn current_or_err(&self) -> Result<Arc<DictStore>> {
        self.current().ok_or(DictError::StoreNotReady)
    }

    /// Install a new store, returning the previous one / 切换句柄
    pub fn swap(&self, store: DictStore) -> Option<Arc<DictStore>> {
        self.current.write().replace(Arc::new(store))
    }
}

/// Close and delete a generation once its last reader is gone / 延迟回收旧版本
pub fn retire(old: Arc<DictStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while Arc::strong_count(&old) > 1 {
            tokio::time::sleep(RETIRE_POLL).await;
        }
        old.close().await;
        DictStore::delete_files(old.path());
    })
}

/// Make sure the corpus file exists, downloading it when allowed / 确保语料文件存在
pub async fn ensure_corpus(corpus: &CorpusConfig) -> Result<PathBuf> {
    let path = PathBuf::from(&corpus.xml_path);
    if path.exists() {
        return Ok(path);
    }
    if !corpus.auto_download {
        return Err(DictError::Download(format!(
            "corpus file {:?} not found and auto_download is off",
            path
        )));
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if is_gz(&path) {
        download_to(&corpus.download_url, &path).await?;
        return Ok(path);
    }

    let gz_path = PathBuf::from(format!("{}.gz", corpus.xml_path));
    download_to(&corpus.download_url, &gz_path).await?;
    decompress_gz(&gz_path, &path).await?;
    tokio::fs::remove_file(&gz_path).await.ok();
    Ok(path)
}

fn is_gz(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Stream a URL into `dest` through a `.part` file / 下载文件
async fn download_to(url: &str, dest: &Path) -> Result<u64> {
    tracing::info!("Downloading JMdict corpus from {} to {:?}", url, dest);
    let part = part_path(dest);

    let result = async {
        let resp = reqwest::get(url)
            .await
            .map_err(|e| DictError::Download(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DictError::Download(format!("{} responded with HTTP {}", url, status)));
        }

        let mut file = tokio::fs::File::create(&part).await?;
        let mut stream = resp.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DictError::Download(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
    .await;

    match result {
        Ok(written) => {
            tokio::fs::rename(&part, dest).await?;
            tracing::info!("Corpus downloaded: {} bytes", written);
            Ok(written)
        }
        Err(e) => {
            tokio::fs::remove_file(&part).await.ok();
            Err(e)
        }
    }
}

/// Decompress a gzip file on a blocking thread / 解压 gzip
pub async fn decompress_gz(src: &Path, dest: &Path) -> Result<u64> {
    let src = src.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<u64> {
        let part = part_path(&dest);
        let mut decoder = GzDecoder::new(BufReader::new(File::open(&src)?));
        let mut out = BufWriter::new(File::create(&part)?);
        let written = std::io::copy(&mut decoder, &mut out)?;
        out.flush()?;
        drop(out);
        std::fs::rename(&part, &dest)?;
        tracing::info!("Corpus decompressed to {:?} ({} bytes)", dest, written);
        Ok(written)
    })
    .await
    .map_err(|e| DictError::Download(format!("decompress task failed: {}", e)))?
}

/// Builds new generations and swaps them in / 词典构建器
pub struct DictBuilder {
    generations: Generations,
    corpus: CorpusConfig,
    frequency: Arc<dyn FrequencySource>,
    state: BuildState,
}

impl DictBuilder {
    pub fn new(generations: Generations, corpus: CorpusConfig, frequency: Arc<dyn FrequencySource>) -> Self {
        Self {
            generations,
            corpus,
            frequency,
            state: BuildState::new(),
        }
    }

    pub fn from_config(config: &AppConfig, frequency: Arc<dyn FrequencySource>) -> Self {
        Self::new(
            Generations::new(config.get_dict_dir(), config.database.db_prefix.clone()),
            config.corpus.clone(),
            frequency,
        )
    }

    pub fn generations(&self) -> &Generations {
        &self.generations
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    /// Build a new generation and swap it in, waiting for the result / 同步重建
    pub async fn rebuild(&self, handle: &StoreHandle) -> Result<LoadStats> {
        if !self.state.try_start() {
            return Err(DictError::BuildRunning);
        }
        self.run_claimed(handle).await
    }

    /// Start a rebuild in the background / 后台重建
    pub fn spawn_rebuild(self: &Arc<Self>, handle: Arc<StoreHandle>) -> Result<()> {
        if !self.state.try_start() {
            return Err(DictError::BuildRunning);
        }
        let builder = self.clone();
        tokio::spawn(async move {
            // 结果已记录在构建状态中
            let _ = builder.run_claimed(&handle).await;
        });
        Ok(())
    }

    async fn run_claimed(&self, handle: &StoreHandle) -> Result<LoadStats> {
        tracing::info!("Dictionary build started");
        let result = self.build_and_swap(handle).await;
        match &result {
            Ok(stats) => {
                tracing::info!("Dictionary build finished: {} entries", stats.entries_stored);
                self.state.finish(None);
            }
            Err(DictError::Cancelled) => {
                tracing::info!("Dictionary build cancelled");
                self.state.finish(Some(DictError::Cancelled.to_string()));
            }
            Err(e) => {
                tracing::error!("Dictionary build failed: {}", e);
                self.state.finish(Some(e.to_string()));
            }
        }
        result
    }

    async fn build_and_swap(&self, handle: &StoreHandle) -> Result<LoadStats> {
        let corpus_path = ensure_corpus(&self.corpus).await?;
        let path = self.generations.new_path();
        let store = DictStore::open(&path).await?;

        match self.build_into(&store, &corpus_path).await {
            Ok(stats) => {
                if let Some(old) = handle.swap(store) {
                    tracing::info!("Dictionary store swapped, retiring {:?}", old.path());
                    retire(old);
                }
                Ok(stats)
            }
            Err(e) => {
                store.close().await;
                DictStore::delete_files(&path);
                Err(e)
            }
        }
    }

    async fn build_into(&self, store: &DictStore, corpus_path: &Path) -> Result<LoadStats> {
        let batch_size = self.corpus.batch_size.max(1);
        let entries = spawn_entry_stream(corpus_path, batch_size * 2)?;
        let stats = CorpusLoader::new(store, self.frequency.as_ref())
            .with_batch_size(batch_size)
            .with_progress(&self.state)
            .load(entries)
            .await?;
        store.mark_complete().await?;
        Ok(stats)
    }
}
