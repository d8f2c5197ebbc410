use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use url::Url;

/// Returned in place of the rewritten article until extraction exists
pub const PLACEHOLDER_CONTENT: &str = "Conteúdo reescrito indisponível no momento.";

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Corpo da requisição inválido: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("Campo urlParaScrape é obrigatório")]
    MissingUrl,
    #[error("URL inválida: {0}")]
    InvalidUrl(String),
    #[error("Falha ao buscar URL: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Falha ao buscar URL: status {0}")]
    HttpStatus(u16),
}

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    #[serde(rename = "urlParaScrape")]
    pub url_para_scrape: Option<String>,
}

impl ScrapeRequest {
    /// Parses the raw JSON body and pulls out the target URL.
    pub fn target_from_body(body: &[u8]) -> Result<Url, ScrapeError> {
        let request: ScrapeRequest = serde_json::from_slice(body)?;
        let raw = request
            .url_para_scrape
            .filter(|u| !u.trim().is_empty())
            .ok_or(ScrapeError::MissingUrl)?;
        parse_target(raw.trim())
    }
}

/// Only absolute http(s) URLs can be fetched.
pub fn parse_target(raw: &str) -> Result<Url, ScrapeError> {
    let url = Url::parse(raw).map_err(|e| ScrapeError::InvalidUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ScrapeError::InvalidUrl(format!(
            "esquema não suportado: {}",
            scheme
        ))),
    }
}

pub struct Scraper {
    client: Client,
}

impl Scraper {
    /// `user_agent` should look like a desktop browser; some sites turn away obvious bots.
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }

    pub async fn fetch_html(&self, url: &Url) -> Result<String, ScrapeError> {
        info!(url = %url, "Scraping page");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::HttpStatus(status.as_u16()));
        }

        let html = response.text().await?;
        info!(url = %url, bytes = html.len(), "Page fetched");
        Ok(html)
    }

    /// Fetches the page and returns its rewritten content.
    pub async fn scrape_and_rewrite(&self, url: &Url) -> Result<String, ScrapeError> {
        let _html = self.fetch_html(url).await?;
        Ok(PLACEHOLDER_CONTENT.to_string())
    }
}
