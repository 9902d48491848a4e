use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use chrono::Utc;

use todo_crypto::HashParams;
use todo_crypto::keys::{SECRET_KEY_LEN, generate_secret_key, key_from_base64, key_to_base64};

/// Startup configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub pool_size: u32,
    pub secret_key: [u8; SECRET_KEY_LEN],
    pub session_ttl: chrono::Duration,
    pub purge_delay: Duration,
    pub purge_interval: Duration,
    pub hash_params: HashParams,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = get("TODO_HOST", "0.0.0.0");
        let port: u16 = parse(&lookup, "TODO_PORT", 3000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {host}:{port}"))?;

        let secret_key = match lookup("TODO_SECRET_KEY").filter(|v| !v.trim().is_empty()) {
            Some(encoded) => key_from_base64(&encoded).context("TODO_SECRET_KEY is not valid")?,
            None => {
                let suggestion = key_to_base64(&generate_secret_key()?);
                bail!(
                    "TODO_SECRET_KEY is unset. Set it in your .env file and restart, e.g.\n\
                     TODO_SECRET_KEY={suggestion}"
                );
            }
        };

        let ttl_hours: i64 = parse(&lookup, "TODO_SESSION_TTL_HOURS", 720)?;
        let session_ttl = chrono::Duration::try_hours(ttl_hours)
            .filter(|ttl| *ttl > chrono::Duration::zero())
            .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
            .with_context(|| format!("TODO_SESSION_TTL_HOURS={ttl_hours} is out of range"))?;

        let pool_size: u32 = parse(&lookup, "TODO_DB_POOL_SIZE", 10)?;
        if pool_size == 0 {
            bail!("TODO_DB_POOL_SIZE must be at least 1");
        }

        let purge_delay = Duration::from_secs(parse(&lookup, "TODO_PURGE_DELAY_SECS", 10)?);
        let purge_interval = Duration::from_secs(parse(&lookup, "TODO_PURGE_INTERVAL_SECS", 3600)?);
        if purge_interval.is_zero() {
            bail!("TODO_PURGE_INTERVAL_SECS must be positive");
        }
        let last_tick = purge_delay
            .checked_add(purge_interval)
            .and_then(|span| Instant::now().checked_add(span));
        if last_tick.is_none() {
            bail!("TODO_PURGE_DELAY_SECS and TODO_PURGE_INTERVAL_SECS are out of range");
        }

        Ok(Self {
            addr,
            db_path: get("TODO_DB_PATH", "todo.db").into(),
            pool_size,
            secret_key,
            session_ttl,
            purge_delay,
            purge_interval,
            hash_params: HashParams {
                memory_kib: parse(&lookup, "TODO_HASH_MEMORY_KIB", HashParams::default().memory_kib)?,
                ..HashParams::default()
            },
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key}={raw:?} is not valid")),
        None => Ok(default),
    }
}
