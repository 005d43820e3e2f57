//! Layered service configuration.
//!
//! Sources, lowest precedence first: [`AppConfig::default`], `config/default.toml`,
//! `config/{RUN_ENV}.toml`, then `APP__*` environment variables.

use std::{collections::HashSet, env, path::Path};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const CONFIG_DIR: &str = "config";
const DEFAULT_ENV: &str = "development";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Secret shipped in `config/development.toml`; refused everywhere else.
const DEV_JWT_SECRET: &str =
    "stockroom_development_secret_key_please_replace_outside_of_local_dev";

const PLACEHOLDER_SECRETS: [&str; 4] = [
    "CHANGE_THIS_SECRET_IN_PRODUCTION",
    "your-secret-key",
    "default-secret-key",
    "secret",
];

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// `postgres://...` or `sqlite://...`
    pub database_url: String,
    /// HS256 key for bearer tokens.
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,
    /// Expected `iss` claim; unchecked when absent.
    pub jwt_issuer: Option<String>,

    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    pub environment: String,

    #[validate(custom = "validate_log_level")]
    pub log_level: String,
    pub log_json: bool,
    pub auto_migrate: bool,

    /// Comma separated.
    pub cors_allowed_origins: Option<String>,
    pub cors_allow_any_origin: bool,

    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_connect_timeout_secs: u64,
    pub db_idle_timeout_secs: u64,
    pub db_acquire_timeout_secs: u64,

    #[validate(range(min = 1))]
    pub rate_limit_requests_per_window: u32,
    #[validate(range(min = 1))]
    pub rate_limit_window_seconds: u64,
    pub rate_limit_enable_headers: bool,

    /// Bytes.
    pub max_body_size: usize,
    pub request_timeout_secs: u64,

    #[validate(range(min = 1))]
    pub default_page_size: u64,
    #[validate(range(min = 1))]
    pub max_page_size: u64,

    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://stockroom.db?mode=rwc".into(),
            jwt_secret: String::new(),
            jwt_issuer: None,
            host: "0.0.0.0".into(),
            port: 8080,
            environment: DEFAULT_ENV.into(),
            log_level: "info".into(),
            log_json: false,
            auto_migrate: true,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: 16,
            db_min_connections: 2,
            db_connect_timeout_secs: 30,
            db_idle_timeout_secs: 600,
            db_acquire_timeout_secs: 8,
            rate_limit_requests_per_window: 100,
            rate_limit_window_seconds: 60,
            rate_limit_enable_headers: true,
            max_body_size: 1024 * 1024,
            request_timeout_secs: 30,
            default_page_size: 10,
            max_page_size: 100,
            event_channel_capacity: 1024,
        }
    }
}

impl AppConfig {
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            host,
            port,
            environment,
            ..Self::default()
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case(DEFAULT_ENV)
    }

    /// Configured CORS origins, trimmed, blanks dropped.
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Cross-field rules that `#[validate]` attributes cannot express.
    fn check_deployment(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && self.cors_origins().is_empty() {
            errors.add(
                "cors_allowed_origins",
                invalid(
                    "cors_allowed_origins_required",
                    "set APP__CORS_ALLOWED_ORIGINS or opt in with APP__CORS_ALLOW_ANY_ORIGIN=true",
                ),
            );
        }
        if !self.is_development() && self.jwt_secret.trim() == DEV_JWT_SECRET {
            errors.add(
                "jwt_secret",
                invalid(
                    "jwt_secret_development_only",
                    "the bundled development secret cannot be used outside development",
                ),
            );
        }
        if self.default_page_size > self.max_page_size {
            errors.add(
                "default_page_size",
                invalid("default_page_size", "must not exceed max_page_size"),
            );
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(invalid(
            "log_level",
            "must be one of trace, debug, info, warn, error",
        ))
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let secret = secret.trim();
    if PLACEHOLDER_SECRETS
        .iter()
        .any(|placeholder| secret.eq_ignore_ascii_case(placeholder))
    {
        return Err(invalid("jwt_secret", "replace the placeholder secret"));
    }
    if secret.chars().collect::<HashSet<_>>().len() < 10 {
        return Err(invalid(
            "jwt_secret",
            "secret needs at least 10 distinct characters",
        ));
    }
    Ok(())
}

/// Installs the global fmt subscriber. `RUST_LOG` wins over `level`.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|directive| !directive.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(format!("stockroom_api={level},tower_http=debug")));

    let builder = fmt().with_env_filter(filter);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// [`load_config`] reading profile files from `config_dir`.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!(environment = %run_env, dir = %config_dir.display(), "loading configuration");

    let layered = Config::builder()
        .set_default("environment", run_env.as_str())?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if layered.get_string("jwt_secret").is_err() {
        error!("jwt_secret missing; set APP__JWT_SECRET");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret (set APP__JWT_SECRET)".into(),
        )));
    }

    let cfg: AppConfig = layered.try_deserialize()?;
    cfg.validate()
        .and_then(|()| cfg.check_deployment())
        .map_err(|e| {
            error!(error = %e, "configuration rejected");
            AppConfigError::Validation(e)
        })?;

    Ok(cfg)
}
