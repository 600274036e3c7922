use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Application configuration for school notification server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub server: ServerConfig,
    /// 未設定の場合はインメモリリポジトリで起動する。
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// 未設定の場合はインメモリの所属情報を使う。
    #[serde(default)]
    pub membership: Option<MembershipConfig>,
    /// 未設定の場合はプッシュを行わない。
    #[serde(default)]
    pub push: Option<PushConfig>,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(content)?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8095
}

/// DatabaseConfig はデータベース接続の設定を表す。
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    #[serde(default = "default_password")]
    pub password: SecretString,
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: u32,
}

fn default_password() -> SecretString {
    SecretString::new(String::new())
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_max_open_conns() -> u32 {
    25
}

impl DatabaseConfig {
    /// PostgreSQL 接続 URL を生成する。ログに出力しないこと。
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user,
            self.password.expose_secret(),
            self.host,
            self.port,
            self.name,
            self.ssl_mode
        )
    }
}

/// MembershipConfig はユーザー管理サービスの接続設定。
#[derive(Debug, Clone, Deserialize)]
pub struct MembershipConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// PushConfig はプッシュ配信用 webhook の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_push_concurrency")]
    pub concurrency: usize,
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_push_concurrency() -> usize {
    16
}

/// DispatcherConfig は予約通知ディスパッチャーの設定。
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_dispatcher_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: default_dispatcher_enabled(),
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_dispatcher_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    30
}

fn default_batch_size() -> i64 {
    100
}

/// RetryConfig はファンアウトとディスパッチのリトライ設定。
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_retry_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_retry_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            initial_delay_ms: default_retry_initial_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
            multiplier: default_retry_multiplier(),
            jitter: default_retry_jitter(),
        }
    }
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    200
}

fn default_retry_max_delay_ms() -> u64 {
    5000
}

fn default_retry_multiplier() -> f64 {
    2.0
}

fn default_retry_jitter() -> bool {
    true
}
