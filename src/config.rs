use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Public origin of the site, used to build share links
    pub site_url: String,
    #[serde(default = "default_fallback_image")]
    pub fallback_image: String,
    #[serde(default = "default_fallback_category")]
    pub fallback_category: String,
    /// Background import interval in minutes, 0 disables it
    #[serde(default)]
    pub import_interval: u64,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

fn default_fallback_image() -> String {
    "/img/logo-share.png".to_string()
}

fn default_fallback_category() -> String {
    "Notícias".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Seconds a CDN may keep the rendered share page
    #[serde(default = "default_edge_max_age")]
    pub edge_max_age: u64,
    /// Seconds a browser may keep it
    #[serde(default = "default_browser_max_age")]
    pub browser_max_age: u64,
}

fn default_edge_max_age() -> u64 {
    300
}

fn default_browser_max_age() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            edge_max_age: default_edge_max_age(),
            browser_max_age: default_browser_max_age(),
        }
    }
}

impl CacheConfig {
    pub fn header_value(&self) -> String {
        format!(
            "public, max-age={}, s-maxage={}",
            self.browser_max_age, self.edge_max_age
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Canonical link shared on social networks for an article
    pub fn share_url(&self, article_id: &str) -> String {
        format!(
            "{}/noticia.html?id={}",
            self.site_url.trim_end_matches('/'),
            article_id
        )
    }

    /// Resolves a site-relative path such as `/img/logo.png` against `site_url`.
    /// Absolute URLs are returned unchanged.
    pub fn absolute_url(&self, href: &str) -> String {
        if Url::parse(href).is_ok() {
            return href.to_string();
        }
        Url::parse(&self.site_url)
            .and_then(|base| base.join(href))
            .map(|url| url.to_string())
            .unwrap_or_else(|_| href.to_string())
    }
}

/// Where articles live, resolved from the environment at startup.
#[derive(Debug)]
pub enum DatabaseConfig {
    /// Local SQLite file, for development
    Sqlite { url: String },
    /// Hosted REST backend, accessed with the service role key
    Supabase {
        url: String,
        service_key: SecretString,
    },
}

impl DatabaseConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `DATABASE_URL` wins when set; otherwise both hosted settings are required.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
            return Ok(DatabaseConfig::Sqlite { url });
        }

        let url = lookup("SUPABASE_URL")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("SUPABASE_URL is not set"))?;
        let service_key = lookup("SUPABASE_SERVICE_ROLE_KEY")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow::anyhow!("SUPABASE_SERVICE_ROLE_KEY is not set"))?;

        Ok(DatabaseConfig::Supabase {
            url,
            service_key: SecretString::from(service_key),
        })
    }
}
