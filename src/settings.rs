use std::path::PathBuf;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment};
use serde::Deserialize;

use crate::parser::extract::patterns::PatternOverrides;

const ENV_PREFIX: &str = "DONOR";
const DEFAULT_KEYWORDS: &str = "donate,contact,about,contribute,fund";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub user_agent: String,
    pub spider_api_key: Option<String>,
    pub pdf_max_bytes: usize,
    pub max_pdfs: Option<usize>,
    pub sitemap_keywords: String,
    pub email_pattern: Option<String>,
    pub phone_pattern: Option<String>,
    pub address_pattern: Option<String>,
    pub donation_pattern: Option<String>,
    pub name_pattern: Option<String>,
}

impl Settings {
    /// Defaults overridden by `DONOR_*` environment variables.
    pub fn load() -> Result<Self> {
        let builder = defaults()?.add_source(Environment::with_prefix(ENV_PREFIX));
        let mut settings = Self::from_builder(builder)?;
        if settings.spider_api_key.is_none() {
            settings.spider_api_key = std::env::var("SPIDER_API_KEY").ok();
        }
        Ok(settings)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to build settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn keywords(&self) -> Vec<String> {
        self.sitemap_keywords
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }

    pub fn pattern_overrides(&self) -> PatternOverrides {
        PatternOverrides {
            email: self.email_pattern.clone(),
            phone: self.phone_pattern.clone(),
            address: self.address_pattern.clone(),
            donation: self.donation_pattern.clone(),
            name: self.name_pattern.clone(),
        }
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    let builder = Config::builder()
        .set_default("data_dir", "data")?
        .set_default("db_path", "data/donor_scraper.sqlite")?
        .set_default("timeout_secs", 30_i64)?
        .set_default("max_retries", 3_i64)?
        .set_default(
            "user_agent",
            concat!("donor_scraper/", env!("CARGO_PKG_VERSION")),
        )?
        .set_default("pdf_max_bytes", 25_i64 * 1024 * 1024)?
        .set_default("sitemap_keywords", DEFAULT_KEYWORDS)?;
    Ok(builder)
}
