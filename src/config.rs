// src/config.rs

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use dotenvy::dotenv;

/// Default allowed browser origins for the examiner/participant frontends.
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

/// Default buffer size of the live fan-out channel.
pub const DEFAULT_LIVE_CHANNEL_CAPACITY: usize = 256;

/// What the engine does with a submission that arrives after its room was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CutoffPolicy {
    /// Closing a room is advisory: in-flight and late submissions are still graded.
    #[default]
    Advisory,
    /// Submissions to a finished room are refused before anything is persisted.
    Strict,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL. `None` runs the engine on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub port: u16,
    /// Optional upper bound on the number of questions in a paper.
    pub question_cap: Option<usize>,
    pub cutoff: CutoffPolicy,
    pub live_channel_capacity: usize,
    pub cors_origins: Vec<String>,
    /// JSON file of categories and questions loaded at startup.
    pub question_bank_path: Option<PathBuf>,
}

/// `RUST_LOG` directive. Read on its own so logging can start before the
/// rest of the configuration is parsed.
pub fn log_directive() -> String {
    env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        Self::from_lookup(jwt_secret, |key| env::var(key).ok())
    }

    /// Builds the configuration from `lookup`. Malformed values fall back to
    /// their defaults with a warning.
    pub fn from_lookup<F>(jwt_secret: String, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let rust_log = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        let port = parse_or(&lookup, "PORT", 3000);

        let question_cap = match lookup("EXAM_QUESTION_CAP") {
            Some(raw) if !raw.trim().is_empty() => match raw.trim().parse::<usize>() {
                Ok(0) => None,
                Ok(cap) => Some(cap),
                Err(_) => {
                    tracing::warn!("Ignoring malformed EXAM_QUESTION_CAP={:?}", raw);
                    None
                }
            },
            _ => None,
        };

        let cutoff = if parse_or(&lookup, "EXAM_STRICT_CUTOFF", false) {
            CutoffPolicy::Strict
        } else {
            CutoffPolicy::Advisory
        };

        let live_channel_capacity =
            parse_or(&lookup, "LIVE_CHANNEL_CAPACITY", DEFAULT_LIVE_CHANNEL_CAPACITY).max(1);

        let cors_origins = parse_origins(
            &lookup("CORS_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string()),
        );

        let question_bank_path = lookup("QUESTION_BANK_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Self {
            database_url,
            jwt_secret,
            rust_log,
            port,
            question_cap,
            cutoff,
            live_channel_capacity,
            cors_origins,
            question_bank_path,
        }
    }

    /// Configuration used by tests and local tooling: in-memory store, no cap, advisory cutoff.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            jwt_secret: jwt_secret.to_string(),
            rust_log: "error".to_string(),
            port: 0,
            question_cap: None,
            cutoff: CutoffPolicy::Advisory,
            live_channel_capacity: DEFAULT_LIVE_CHANNEL_CAPACITY,
            cors_origins: parse_origins(DEFAULT_CORS_ORIGINS),
            question_bank_path: None,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring malformed {}={:?}", key, raw);
            default
        }),
        None => default,
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
