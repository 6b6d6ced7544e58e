use std::path::PathBuf;
use std::time::Duration;

use sqlx::postgres::PgConnectOptions;

use crate::db::InsertMode;
use crate::target::TargetMode;

pub const DEFAULT_APP_ID: i32 = 220;
pub const DEFAULT_REVIEW_LIMIT: usize = 200;
pub const DEFAULT_SCROLL_DELAY_SECS: f64 = 1.5;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_STALL_LIMIT: u32 = 25;

pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub fn review_listing_url(app_id: i32) -> String {
    format!("https://steamcommunity.com/app/{app_id}/reviews/?browsefilter=toprated&snr=1_5_100010_")
}

pub fn store_page_url(app_id: i32) -> String {
    format!("https://store.steampowered.com/app/{app_id}/")
}

pub struct HarvestConfig {
    pub app_id: i32,
    pub target: TargetMode,
    pub scroll_delay: Duration,
    pub batch_size: usize,
    pub output_dir: PathBuf,
    /// Consecutive zero-acceptance scans before giving up; 0 disables the guard.
    pub stall_limit: u32,
    pub insert_mode: InsertMode,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("DB_HOST", "localhost"),
            port: std::env::var("DB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: env_or("DB_NAME", "steam"),
            user: env_or("DB_USER", "postgres"),
            password: env_or("DB_PASSWORD", ""),
        }
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
