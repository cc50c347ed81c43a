use std::net::SocketAddr;

use anyhow::{ensure, Context};
use serde::Deserialize;

/// Ten years; longer lifetimes are treated as a configuration mistake.
const MAX_TTL_MINUTES: i64 = 10 * 365 * 24 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    /// Session tokens carry no `exp` unless this is set.
    pub session_ttl_minutes: Option<i64>,
    pub reset_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub jwt: JwtConfig,
    pub mail: Option<MailConfig>,
    pub app_base_url: String,
    pub reset_single_use: bool,
    pub cors_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET_KEY").context("JWT_SECRET_KEY not set")?,
            session_ttl_minutes: ttl_opt("SESSION_TTL_MINUTES")?,
            reset_ttl_minutes: ttl_opt("RESET_TTL_MINUTES")?.unwrap_or(60),
        };

        let mail = match (std::env::var("EMAIL_USER"), std::env::var("EMAIL_PASS")) {
            (Ok(username), Ok(password)) => Some(MailConfig {
                smtp_host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".into()),
                smtp_port: parse_opt("SMTP_PORT")?.unwrap_or(465),
                username,
                password,
            }),
            _ => None,
        };

        let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parse_opt("APP_PORT")?.unwrap_or(8080);
        let listen_addr = listen_addr(&host, port)?;

        Ok(Self {
            listen_addr,
            database_url: std::env::var("DATABASE_URL").ok(),
            max_connections: parse_opt("DB_MAX_CONNECTIONS")?.unwrap_or(10),
            jwt,
            mail,
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            reset_single_use: parse_opt("RESET_SINGLE_USE")?.unwrap_or(true),
            cors_origin: std::env::var("CORS_ORIGIN").ok(),
        })
    }
}

fn parse_opt<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn ttl_opt(key: &str) -> anyhow::Result<Option<i64>> {
    match std::env::var(key) {
        Ok(raw) => ttl_minutes(key, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn ttl_minutes(key: &str, raw: &str) -> anyhow::Result<i64> {
    let minutes: i64 = parse_value(key, raw)?;
    ensure!(
        (1..=MAX_TTL_MINUTES).contains(&minutes),
        "{key} must be between 1 and {MAX_TTL_MINUTES} minutes, got {minutes}"
    );
    Ok(minutes)
}

fn listen_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("APP_HOST/APP_PORT do not form a socket address: {host}:{port}"))
}

fn parse_value<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} has an invalid value: {raw:?}"))
}
