use serde::Deserialize;
use shared::jwt::{JwtConfig, JwtError, TokenLifetimes, MIN_SECRET_LEN};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use domain::models::PaymentConfigStatus;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    /// JWT authentication configuration
    pub jwt: JwtAuthConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub purchase: PurchaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite://data/offtimes.db`.
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Requests per minute per client. 0 disables rate limiting.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Send Strict-Transport-Security. Only enable behind TLS.
    #[serde(default)]
    pub hsts_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthConfig {
    /// HS256 shared secret. Used when no RSA key pair is configured.
    #[serde(default)]
    pub secret: String,

    /// RSA private key in PEM format for signing tokens
    #[serde(default)]
    pub private_key: String,

    /// RSA public key in PEM format for verifying tokens
    #[serde(default)]
    pub public_key: String,

    /// Access token expiration in seconds (default: 3600 = 1 hour)
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: i64,

    /// Refresh token expiration in seconds (default: 2592000 = 30 days)
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry_secs: i64,

    /// Leeway in seconds for clock skew tolerance (default: 30)
    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

impl JwtAuthConfig {
    fn uses_rsa(&self) -> bool {
        !self.private_key.is_empty() && !self.public_key.is_empty()
    }

    fn lifetimes(&self) -> TokenLifetimes {
        TokenLifetimes {
            access_secs: self.access_token_expiry_secs,
            refresh_secs: self.refresh_token_expiry_secs,
        }
    }

    /// Build the signer/verifier. RSA keys win over the shared secret.
    pub fn build(&self) -> Result<JwtConfig, JwtError> {
        if self.uses_rsa() {
            JwtConfig::with_rsa_keys(
                &normalize_pem_key(&self.private_key),
                &normalize_pem_key(&self.public_key),
                self.lifetimes(),
                self.leeway_secs,
            )
        } else {
            JwtConfig::with_secret(&self.secret, self.lifetimes(), self.leeway_secs)
        }
    }
}

/// Env files often carry PEM keys on one line with literal `\n`.
fn normalize_pem_key(key: &str) -> String {
    key.trim_matches('"').trim_matches('\'').replace("\\n", "\n")
}

fn default_access_token_expiry() -> i64 {
    3600 // 1 hour
}

fn default_refresh_token_expiry() -> i64 {
    2592000 // 30 days
}

fn default_jwt_leeway() -> u64 {
    30
}

/// SMS verification code delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
    /// Delivery provider. Only `console` (log the code) is built in.
    #[serde(default = "default_sms_provider")]
    pub provider: String,

    #[serde(default = "default_sms_code_ttl")]
    pub code_ttl_secs: i64,

    /// Minimum gap between two codes for the same phone and purpose.
    #[serde(default = "default_sms_cooldown")]
    pub resend_cooldown_secs: i64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            provider: default_sms_provider(),
            code_ttl_secs: default_sms_code_ttl(),
            resend_cooldown_secs: default_sms_cooldown(),
        }
    }
}

fn default_sms_provider() -> String {
    "console".to_string()
}

fn default_sms_code_ttl() -> i64 {
    300
}

fn default_sms_cooldown() -> i64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Allow username/password registration without a phone code.
    #[serde(default = "default_true")]
    pub allow_register_without_sms: bool,

    #[serde(default = "default_trial_days")]
    pub trial_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_register_without_sms: true,
            trial_days: default_trial_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_trial_days() -> i64 {
    domain::services::TRIAL_DAYS
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Largest number of rows accepted in one upload.
    #[serde(default = "default_max_records")]
    pub max_records_per_upload: usize,

    /// Retention for users that never saved backup settings.
    #[serde(default = "default_retention_days")]
    pub default_retention_days: i32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_records_per_upload: default_max_records(),
            default_retention_days: default_retention_days(),
        }
    }
}

fn default_max_records() -> usize {
    10_000
}

fn default_retention_days() -> i32 {
    domain::models::backup::DEFAULT_RETENTION_DAYS
}

/// Payment platforms. A platform is usable once its merchant id is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurchaseConfig {
    #[serde(default)]
    pub alipay_app_id: String,

    #[serde(default)]
    pub google_play_package_name: String,
}

impl PurchaseConfig {
    pub fn status(&self) -> PaymentConfigStatus {
        PaymentConfigStatus {
            alipay: !self.alipay_app_id.is_empty(),
            google_play: !self.google_play_package_name.is_empty(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_body_size() -> usize {
    5 * 1_048_576
}
fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_rate_limit() -> u32 {
    120
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with OFFTIMES__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("OFFTIMES")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("security.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Defaults are embedded so tests do not depend on config files.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = "sqlite::memory:"
            max_connections = 1
            min_connections = 1

            [logging]
            level = "debug"
            format = "pretty"

            [security]
            cors_origins = []
            rate_limit_per_minute = 0

            [jwt]
            secret = "test-secret-that-is-at-least-32-bytes-long"
            access_token_expiry_secs = 3600
            refresh_token_expiry_secs = 2592000
            leeway_secs = 0

            [sms]
            provider = "console"
            code_ttl_secs = 300
            resend_cooldown_secs = 60

            [auth]
            allow_register_without_sms = true
            trial_days = 7

            [backup]
            max_records_per_upload = 1000
            default_retention_days = 90

            [purchase]
            alipay_app_id = "test-alipay-app"
            google_play_package_name = ""
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        // Validation is left to the caller so tests can build partial configs
        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "OFFTIMES__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.server.host.parse::<IpAddr>().is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "Server host is not an IP address: {}",
                self.server.host
            )));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if !self.jwt.uses_rsa() && self.jwt.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigValidationError::MissingRequired(format!(
                "OFFTIMES__JWT__SECRET (at least {} bytes) or an RSA key pair must be set",
                MIN_SECRET_LEN
            )));
        }

        if self.sms.provider != "console" {
            return Err(ConfigValidationError::InvalidValue(format!(
                "Unsupported SMS provider: {}",
                self.sms.provider
            )));
        }

        if self.sms.code_ttl_secs <= 0 || self.sms.resend_cooldown_secs < 0 {
            return Err(ConfigValidationError::InvalidValue(
                "SMS code TTL must be positive and cooldown non-negative".to_string(),
            ));
        }

        if self.auth.trial_days <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "trial_days must be positive".to_string(),
            ));
        }

        if self.backup.default_retention_days <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "default_retention_days must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        let ip = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.server.port)
    }
}
