use serde::Deserialize;
use std::env;

// Top-level settings, one section per concern
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub mail: MailConfig,
    pub payment: PaymentConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    /// `pretty` or `json`.
    pub log_format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Without a URL the service keeps everything in process memory.
    pub url: Option<String>,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in_hours: i64,
}

// Where generated ticket PDFs are written and how they are linked
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub media_dir: String,
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub stripe_secret_key: Option<String>,
    pub gateway_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

impl Config {
    /// Layers built-in defaults, an optional `config/default.toml`,
    /// `APP__SECTION__KEY` variables and the conventional flat variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 8000)?
            .set_default("app.environment", "development")?
            .set_default("app.rust_log", "event_orders=debug,tower_http=debug")?
            .set_default("app.log_format", "pretty")?
            .set_default("database.pool_size", 20)?
            .set_default("jwt.secret", "change-me")?
            .set_default("jwt.expires_in_hours", 24)?
            .set_default("storage.media_dir", "./static/media")?
            .set_default("storage.public_url", "/static/media")?
            .set_default("mail.smtp_port", 587)?
            .set_default("mail.from_email", "noreply@example.com")?
            .set_default("mail.from_name", "Event Orders")?
            .set_default("payment.gateway_url", "https://api.stripe.com")?
            .set_default("payment.timeout_seconds", 30)?
            .set_default("circuit_breaker.failure_threshold", 5)?
            .set_default("circuit_breaker.timeout_seconds", 60)?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("APP").prefix_separator("__").separator("__"))
            .set_override_option("app.host", env::var("HOST").ok())?
            .set_override_option("app.port", env::var("PORT").ok())?
            .set_override_option("app.environment", env::var("ENVIRONMENT").ok())?
            .set_override_option("app.rust_log", env::var("RUST_LOG").ok())?
            .set_override_option("app.log_format", env::var("LOG_FORMAT").ok())?
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("database.pool_size", env::var("DB_POOL_SIZE").ok())?
            .set_override_option("jwt.secret", env::var("JWT_SECRET").ok())?
            .set_override_option("jwt.expires_in_hours", env::var("JWT_EXPIRES_IN_HOURS").ok())?
            .set_override_option("storage.media_dir", env::var("MEDIA_DIR").ok())?
            .set_override_option("mail.smtp_host", env::var("SMTP_HOST").ok())?
            .set_override_option("mail.smtp_port", env::var("SMTP_PORT").ok())?
            .set_override_option("mail.smtp_username", env::var("SMTP_USERNAME").ok())?
            .set_override_option("mail.smtp_password", env::var("SMTP_PASSWORD").ok())?
            .set_override_option("mail.from_email", env::var("MAIL_FROM").ok())?
            .set_override_option("payment.stripe_secret_key", env::var("STRIPE_SECRET_KEY").ok())?
            .set_override_option("payment.gateway_url", env::var("PAYMENT_GATEWAY_URL").ok())?
            .build()?;

        settings.try_deserialize()
    }

    /// Defaults only, no file or environment lookups.
    pub fn for_tests() -> Self {
        Config {
            app: AppConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                environment: "test".to_string(),
                rust_log: "event_orders=debug".to_string(),
                log_format: "pretty".to_string(),
            },
            database: DatabaseConfig { url: None, pool_size: 1 },
            jwt: JwtConfig { secret: "test-secret".to_string(), expires_in_hours: 1 },
            storage: StorageConfig {
                media_dir: env::temp_dir().join("event_orders_media").display().to_string(),
                public_url: "/static/media".to_string(),
            },
            mail: MailConfig {
                smtp_host: None,
                smtp_port: 587,
                smtp_username: None,
                smtp_password: None,
                from_email: "noreply@example.com".to_string(),
                from_name: "Event Orders".to_string(),
            },
            payment: PaymentConfig {
                stripe_secret_key: None,
                gateway_url: "http://127.0.0.1:9".to_string(),
                timeout_seconds: 5,
            },
            circuit_breaker: CircuitBreakerConfig { failure_threshold: 3, timeout_seconds: 60 },
        }
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }
}
