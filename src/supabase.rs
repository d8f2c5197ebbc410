//! Minimal client for the hosted database's REST interface.
//!
//! Only the calls the handlers need: fetch one article, check a source URL,
//! insert an article. Every request carries the service role key, both as
//! `apikey` and as a bearer token.

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::db::{id_from_string_or_number, Article, NewArticle, NEWS_TABLE};

const ARTICLE_COLUMNS: &str = "id,title,content,category,image_url,created_at";

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct InsertedRow {
    #[serde(deserialize_with = "id_from_string_or_number")]
    id: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, service_key: SecretString) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, NEWS_TABLE)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = self.service_key.expose_secret();
        request
            .header("apikey", key)
            .header(header::AUTHORIZATION, format!("Bearer {}", key))
    }

    pub async fn get_article(&self, id: &str) -> anyhow::Result<Option<Article>> {
        debug!(article_id = %id, "Fetching article from hosted database");

        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", ARTICLE_COLUMNS.to_string()),
                ("id", format!("eq.{}", id)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("article query failed with status {}", status);
        }

        let mut rows: Vec<Article> = response.json().await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    pub async fn article_exists(&self, source_url: &str) -> anyhow::Result<bool> {
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", "id".to_string()),
                ("source_url", format!("eq.{}", source_url)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("source lookup failed with status {}", status);
        }

        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(!rows.is_empty())
    }

    pub async fn insert_article(&self, article: &NewArticle) -> anyhow::Result<String> {
        let response = self
            .authorized(self.client.post(self.table_url()))
            .header("Prefer", "return=representation")
            .query(&[("select", "id")])
            .json(article)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            anyhow::bail!("article already stored: {}", article.source_url);
        }
        if !status.is_success() {
            anyhow::bail!("insert failed with status {}", status);
        }

        let rows: Vec<InsertedRow> = response.json().await?;
        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| anyhow::anyhow!("insert returned no rows"))
    }
}
