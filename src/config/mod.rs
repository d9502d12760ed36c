use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

/// Process configuration, sourced from the environment.
///
/// Required variables: `DB_PASSWORD`, `JWT_SECRET`. Everything else has a
/// development default so `pardaaf-core config` can run against a local
/// stack.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub request_timeout_secs: u64,

    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_password: String,
    /// Name of the master catalog database.
    pub main_db: String,
    pub pool_min_connections: u32,
    pub pool_max_connections: u32,
    pub pool_acquire_timeout_secs: u64,

    pub redis_url: String,

    pub jwt_secret: String,

    pub blob_account_id: String,
    pub blob_access_key_id: String,
    pub blob_secret_access_key: String,
    pub blob_bucket: String,
    /// Public base URL under which uploaded objects are served.
    pub blob_public_base: String,

    pub smtp_host: String,
    pub smtp_user: String,
    pub smtp_password: String,
    pub mail_from: String,
    pub admin_email: String,

    pub telegram_bot_token: String,
    pub telegram_api_base: String,

    pub fx_app_id: String,
    pub fx_api_base: String,

    /// Codename of the tenant that receives public online orders.
    pub sales_tenant: String,
    /// Where the website contact form redirects after submission.
    pub website_redirect_url: String,
    /// Base URL used in newsletter confirmation links.
    pub site_base_url: String,

    /// rclone remote name for backup uploads.
    pub rclone_remote: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv().ok();

        let db_password =
            env::var("DB_PASSWORD").map_err(|_| anyhow::anyhow!("DB_PASSWORD must be set"))?;
        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;

        Ok(Config {
            server_port: parse_or("SERVER_PORT", 8080),
            request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", 30),

            db_host: var_or("DB_HOST", "127.0.0.1"),
            db_port: parse_or("DB_PORT", 5432),
            db_user: var_or("DB_USER", "pardaaf"),
            db_password,
            main_db: var_or("MAIN_DB", crate::tenant::DEFAULT_MAIN_DB),
            pool_min_connections: parse_or("POOL_MIN_CONNECTIONS", 1),
            pool_max_connections: parse_or("POOL_MAX_CONNECTIONS", 10),
            pool_acquire_timeout_secs: parse_or("POOL_ACQUIRE_TIMEOUT_SECS", 5),

            redis_url: var_or("REDIS_URL", "redis://127.0.0.1:6379/1"),

            jwt_secret,

            blob_account_id: var_or("BLOB_ACCOUNT_ID", ""),
            blob_access_key_id: var_or("BLOB_ACCESS_KEY_ID", ""),
            blob_secret_access_key: var_or("BLOB_SECRET_ACCESS_KEY", ""),
            blob_bucket: var_or("BLOB_BUCKET", "curtaindb"),
            blob_public_base: var_or("BLOB_PUBLIC_BASE", "https://cdn.pardaaf.com"),

            smtp_host: var_or("SMTP_HOST", "smtp.mailgun.org"),
            smtp_user: var_or("SMTP_USER", ""),
            smtp_password: var_or("SMTP_PASSWORD", ""),
            mail_from: var_or("MAIL_FROM", "Pardaaf <no-reply@pardaaf.com>"),
            admin_email: var_or("ADMIN_EMAIL", "admin@pardaaf.com"),

            telegram_bot_token: var_or("TELEGRAM_BOT_TOKEN", ""),
            telegram_api_base: var_or("TELEGRAM_API_BASE", "https://api.telegram.org"),

            fx_app_id: var_or("FX_APP_ID", ""),
            fx_api_base: var_or("FX_API_BASE", "https://openexchangerates.org/api"),

            sales_tenant: var_or("SALES_TENANT", "sales"),
            website_redirect_url: var_or("WEBSITE_REDIRECT_URL", "https://pardaaf.com/thanks"),
            site_base_url: var_or("SITE_BASE_URL", "https://api.pardaaf.com"),

            rclone_remote: var_or("RCLONE_REMOTE", "backups"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_vars_error() {
        env::remove_var("DB_PASSWORD");
        env::remove_var("JWT_SECRET");
        assert!(Config::from_env().is_err());
    }
}
