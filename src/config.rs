//! Application configuration module / 应用配置模块
//!
//! Loaded from config.json in the working directory, created with defaults on
//! first run / 首次运行时创建默认配置文件

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration / 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// Dictionary store location / 词典存储位置
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Corpus source / 语料来源
    #[serde(default)]
    pub corpus: CorpusConfig,
    /// Frequency enrichment / 词频补充
    #[serde(default)]
    pub frequency: FrequencyConfig,
}

/// Server configuration / 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address / 服务器监听地址
    pub host: String,
    /// Server port / 服务器端口
    pub port: u16,
}

/// Database configuration / 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Data directory path / 数据目录路径
    pub data_dir: String,
    /// Store generations directory (relative to data_dir) / 词典库目录
    pub db_dir: String,
    /// Generation file prefix, files are `{prefix}-{millis}.db` / 文件名前缀
    pub db_prefix: String,
}

/// Corpus configuration / 语料配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// JMdict XML path (`.gz` is read directly) / JMdict 文件路径
    pub xml_path: String,
    /// Gzip corpus download URL / 语料下载地址
    pub download_url: String,
    /// Download the corpus when the file is missing / 文件缺失时自动下载
    pub auto_download: bool,
    /// Build the store on startup when none is complete / 启动时自动构建
    pub auto_build: bool,
    /// Entries per enrichment call and store transaction / 批次大小
    pub batch_size: usize,
}

/// Frequency enrichment configuration / 词频配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyConfig {
    pub enabled: bool,
    /// Lookup endpoint, receives `POST { q: [...] }` / 查询接口
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            db_dir: "dict".to_string(),
            db_prefix: "jmdict".to_string(),
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            xml_path: "data/JMdict_e.xml".to_string(),
            download_url: "http://ftp.edrdg.org/pub/Nihongo/JMdict_e.gz".to_string(),
            auto_download: true,
            auto_build: true,
            batch_size: 1000,
        }
    }
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://cdn.zhquiz.cc/api/wordfreq?lang=ja".to_string(),
            timeout_secs: 60,
        }
    }
}

impl AppConfig {
    /// Get the full data directory path / 获取完整的数据目录路径
    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(&self.database.data_dir)
    }

    /// Get the store generations directory / 获取词典库目录
    pub fn get_dict_dir(&self) -> PathBuf {
        let data_dir = self.get_data_dir();
        if self.database.db_dir.is_empty() {
            data_dir
        } else {
            data_dir.join(&self.database.db_dir)
        }
    }

    /// Get the server bind address / 获取服务器绑定地址
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Apply `PORT` / `JMDICT_XML` overrides / 应用环境变量覆盖
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var("PORT").ok().as_deref(),
            std::env::var("JMDICT_XML").ok().as_deref(),
        );
    }

    fn apply_overrides(&mut self, port: Option<&str>, xml_path: Option<&str>) {
        if let Some(port) = port {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!("Ignoring invalid PORT value: {}", port),
            }
        }
        if let Some(path) = xml_path.filter(|p| !p.is_empty()) {
            self.corpus.xml_path = path.to_string();
        }
    }
}

/// Get the config file path / 获取配置文件路径
fn get_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config() -> Result<AppConfig, String> {
    let mut config = load_config_from(&get_config_path())?;
    config.apply_env();
    Ok(config)
}

fn load_config_from(config_path: &Path) -> Result<AppConfig, String> {
    if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        let config = AppConfig::default();
        save_config_to(&config, config_path)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
fn save_config_to(config: &AppConfig, config_path: &Path) -> Result<(), String> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    std::fs::write(config_path, content)
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_created_then_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let created = load_config_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.server.port, 8080);
        assert_eq!(created.corpus.batch_size, 1000);

        let reloaded = load_config_from(&path).unwrap();
        assert_eq!(reloaded.frequency.endpoint, created.frequency.endpoint);
        assert_eq!(reloaded.get_dict_dir(), PathBuf::from("data").join("dict"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"server":{"host":"127.0.0.1","port":9000}}"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.get_bind_address(), "127.0.0.1:9000");
        assert!(config.frequency.enabled);
        assert_eq!(config.database.db_prefix, "jmdict");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(Some("3000"), Some("/tmp/JMdict_e.gz"));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.corpus.xml_path, "/tmp/JMdict_e.gz");

        config.apply_overrides(Some("not-a-port"), Some(""));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.corpus.xml_path, "/tmp/JMdict_e.gz");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_config_from(&path).is_err());
    }
}
