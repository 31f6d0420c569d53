use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Command prefix applied to groups that have not chosen their own.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self { prefix: default_prefix() }
    }
}

/// Which backend the process should try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    #[serde(alias = "remote", alias = "postgresql")]
    Postgres,
    #[serde(alias = "file")]
    Json,
}

impl StorageKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "remote" => Some(Self::Postgres),
            "json" | "file" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default, rename = "type")]
    pub kind: StorageKind,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default)]
    pub sqlx_logging: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            url: String::new(),
            path: default_path(),
            connect_timeout_secs: default_connect_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            sqlx_logging: false,
        }
    }
}

fn default_prefix() -> String { "!".into() }
fn default_path() -> String { "data/database.json".into() }
fn default_connect_timeout() -> u64 { 10 }
fn default_cache_ttl() -> u64 { 30 }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    if std::fs::metadata(&path).is_err() {
        // 配置文件缺失时使用默认值，连接信息仍可由环境变量提供
        return Ok(AppConfig::default());
    }
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let cfg: AppConfig = toml::from_str(&content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        if self.bot.prefix.trim().is_empty() {
            self.bot.prefix = default_prefix();
        }
        self.database.normalize_from_env();
        self.database.validate()?;
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn normalize_from_env(&mut self) {
        if self.url.trim().is_empty() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                self.url = url;
            }
        }
        if let Some(kind) = std::env::var("DATABASE_TYPE").ok().as_deref().and_then(StorageKind::parse) {
            self.kind = kind;
        }
        if self.path.trim().is_empty() {
            self.path = default_path();
        }
    }

    /// Structural checks only. A missing or malformed `url` is not an error here:
    /// the backend selector treats it as a reason to fall back to the JSON file.
    pub fn validate(&self) -> Result<()> {
        if self.min_connections == 0 {
            return Err(anyhow!("database.min_connections must be >= 1"));
        }
        if self.max_connections < self.min_connections {
            return Err(anyhow!("database.max_connections must be >= min_connections"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(anyhow!("database.connect_timeout_secs must be a positive number of seconds"));
        }
        Ok(())
    }

    /// Whether `url` looks like something the Postgres driver can dial.
    pub fn has_remote_url(&self) -> bool {
        let lower = self.url.trim().to_lowercase();
        lower.starts_with("postgresql://") || lower.starts_with("postgres://")
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_secs)
    }
}
