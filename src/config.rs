use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,
    pub db_max_connections: u32,
    pub run_migrations: bool,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub log_dir: String,
    pub log_level: String,

    /// Minutes after shift start before a check-in counts as late
    pub grace_minutes: u32,

    /// Created on startup when the users table is empty
    pub bootstrap_admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bootstrap_admin = match (
            get("BOOTSTRAP_ADMIN_USERNAME"),
            get("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(user), Some(pass)) if !user.trim().is_empty() && !pass.is_empty() => {
                Some((user.trim().to_string(), pass))
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(anyhow!(
                    "BOOTSTRAP_ADMIN_USERNAME and BOOTSTRAP_ADMIN_PASSWORD must be set together"
                ));
            }
            _ => None,
        };

        Ok(Self {
            server_addr: required(&get, "SERVER_ADDR")?,
            database_url: required(&get, "DATABASE_URL")?,
            jwt_secret: required(&get, "JWT_SECRET")?,
            access_token_ttl: parsed(&get, "ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parsed(&get, "REFRESH_TOKEN_TTL", 604_800)?, // 7 days
            db_max_connections: parsed(&get, "DB_MAX_CONNECTIONS", 10)?,
            run_migrations: parsed(&get, "RUN_MIGRATIONS", true)?,

            rate_login_per_min: parsed(&get, "RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: parsed(&get, "RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: parsed(&get, "RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed(&get, "RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: get("API_PREFIX").unwrap_or_else(|| "/api".to_string()),

            log_dir: get("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "debug".to_string()),

            grace_minutes: parsed(&get, "ATTENDANCE_GRACE_MINUTES", 15)?,
            bootstrap_admin,
        })
    }
}

fn required<F>(get: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key).ok_or_else(|| anyhow!("{key} must be set"))
}

fn parsed<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 3] = [
        ("SERVER_ADDR", "127.0.0.1:8080"),
        ("DATABASE_URL", "mysql://localhost/hr"),
        ("JWT_SECRET", "secret"),
    ];

    #[test]
    fn defaults_are_applied() {
        let config = Config::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(config.access_token_ttl, 900);
        assert_eq!(config.refresh_token_ttl, 604_800);
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.grace_minutes, 15);
        assert!(config.run_migrations);
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let err = Config::from_lookup(lookup(&BASE[..2])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn bad_number_names_the_key() {
        let mut pairs = BASE.to_vec();
        pairs.push(("ATTENDANCE_GRACE_MINUTES", "fifteen"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("ATTENDANCE_GRACE_MINUTES"));
    }

    #[test]
    fn bootstrap_admin_needs_both_halves() {
        let mut pairs = BASE.to_vec();
        pairs.push(("BOOTSTRAP_ADMIN_USERNAME", "admin"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());

        pairs.push(("BOOTSTRAP_ADMIN_PASSWORD", "pw"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.bootstrap_admin,
            Some(("admin".to_string(), "pw".to_string()))
        );
    }
}
