use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::FeedConfig;
use crate::db::{Database, NewArticle};

const UNTITLED: &str = "Sem título";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Importação já em andamento")]
    AlreadyRunning,
    #[error("Corpo da requisição inválido: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("URL do feed inválida: {0}")]
    InvalidUrl(String),
    #[error("Falha ao buscar feed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Falha ao buscar feed: status {0}")]
    HttpStatus(u16),
    #[error("Feed inválido: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
    #[error("Erro no banco de dados: {0}")]
    Database(#[from] anyhow::Error),
}

/// Optional body of an import request; an empty body means "all configured feeds"
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(rename = "feedUrl")]
    pub feed_url: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

impl std::ops::AddAssign for ImportReport {
    fn add_assign(&mut self, other: Self) {
        self.imported += other.imported;
        self.skipped += other.skipped;
    }
}

pub struct Importer {
    client: Client,
    db: Arc<Database>,
    feeds: Vec<FeedConfig>,
    running: Arc<Mutex<()>>,
}

impl Importer {
    pub fn new(db: Arc<Database>, feeds: Vec<FeedConfig>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("MunicipalNews/1.0 (RSS Importer)")
            .build()?;

        Ok(Self {
            client,
            db,
            feeds,
            running: Arc::new(Mutex::new(())),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Imports every configured feed. A feed that cannot be fetched or parsed is
    /// logged and does not stop the rest; a storage failure aborts the run.
    pub async fn import_all(&self) -> Result<ImportReport, ImportError> {
        self.exclusive(async {
            let mut report = ImportReport::default();
            info!("Importing {} feeds", self.feeds.len());

            for feed in &self.feeds {
                match self.do_import(feed).await {
                    Ok(feed_report) => report += feed_report,
                    Err(e @ ImportError::Database(_)) => return Err(e),
                    Err(e) => error!("Failed to import feed '{}': {}", feed.name, e),
                }
            }

            info!(
                imported = report.imported,
                skipped = report.skipped,
                "Feed import complete"
            );
            Ok(report)
        })
        .await
    }

    /// Imports a single feed, typically one named in a request.
    pub async fn import_feed(&self, feed: &FeedConfig) -> Result<ImportReport, ImportError> {
        self.exclusive(self.do_import(feed)).await
    }

    /// Runs `work` while holding the import lock. The lock is released when the
    /// guard drops, including when the caller abandons the future.
    async fn exclusive<F>(&self, work: F) -> Result<ImportReport, ImportError>
    where
        F: std::future::Future<Output = Result<ImportReport, ImportError>>,
    {
        let Ok(_guard) = self.running.try_lock() else {
            info!("Import already in progress, skipping");
            return Err(ImportError::AlreadyRunning);
        };

        work.await
    }

    async fn do_import(&self, feed: &FeedConfig) -> Result<ImportReport, ImportError> {
        info!("Fetching feed: {} ({})", feed.name, feed.url);

        url::Url::parse(&feed.url).map_err(|e| ImportError::InvalidUrl(e.to_string()))?;

        let response = self.client.get(&feed.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImportError::HttpStatus(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        let parsed = parser::parse(&bytes[..])?;

        let mut report = ImportReport::default();
        for entry in &parsed.entries {
            let Some(article) = Self::entry_to_article(entry, feed.category.as_deref()) else {
                warn!("Skipping entry with no link in feed '{}'", feed.name);
                report.skipped += 1;
                continue;
            };

            if self.db.article_exists(&article.source_url).await? {
                report.skipped += 1;
                continue;
            }

            self.db.insert_article(&article).await?;
            report.imported += 1;
        }

        info!(
            "Imported {} items from feed '{}' ({} skipped)",
            report.imported, feed.name, report.skipped
        );
        Ok(report)
    }

    /// Maps a feed entry to an article row. Entries without a link have no
    /// stable identity and are dropped.
    pub fn entry_to_article(entry: &Entry, feed_category: Option<&str>) -> Option<NewArticle> {
        let source_url = entry.links.first().map(|l| l.href.clone())?;
        if source_url.is_empty() {
            return None;
        }

        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let content = entry
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
            .filter(|c| !c.trim().is_empty());

        let category = feed_category
            .map(str::to_string)
            .or_else(|| entry.categories.first().map(|c| c.term.clone()));

        let created_at = entry.published.or(entry.updated).unwrap_or_else(Utc::now);

        Some(NewArticle {
            title,
            content,
            category,
            image_url: Self::extract_image(entry),
            source_url,
            created_at,
        })
    }

    /// Thumbnail first, then image media content, then an image enclosure link
    pub fn extract_image(entry: &Entry) -> Option<String> {
        let thumbnail = entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.iter())
            .map(|t| t.image.uri.clone())
            .next();
        if thumbnail.is_some() {
            return thumbnail;
        }

        let media_image = entry
            .media
            .iter()
            .flat_map(|m| m.content.iter())
            .find(|c| {
                c.content_type
                    .as_ref()
                    .map(|mime| mime.ty() == "image")
                    .unwrap_or(false)
            })
            .and_then(|c| c.url.as_ref().map(|u| u.to_string()));
        if media_image.is_some() {
            return media_image;
        }

        entry
            .links
            .iter()
            .find(|l| {
                l.rel.as_deref() == Some("enclosure")
                    && l.media_type
                        .as_deref()
                        .map(|t| t.starts_with("image/"))
                        .unwrap_or(false)
            })
            .map(|l| l.href.clone())
    }
}

pub async fn start_background_import(importer: Arc<Importer>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes * 60);

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled feed import");
        if let Err(e) = importer.import_all().await {
            error!("Scheduled feed import failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_entries(xml: &str) -> Vec<Entry> {
        parser::parse(xml.as_bytes()).unwrap().entries
    }

    const RSS_WITH_ENCLOSURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
            <channel>
                <title>Agência</title>
                <link>https://agencia.example.gov</link>
                <description>Notícias</description>
                <item>
                    <title>Nova unidade de saúde</title>
                    <link>https://agencia.example.gov/noticia/1</link>
                    <guid>https://agencia.example.gov/noticia/1</guid>
                    <description>&lt;p&gt;A unidade abre segunda&lt;/p&gt;</description>
                    <category>Saúde</category>
                    <enclosure url="https://agencia.example.gov/img/1.jpg" length="1000" type="image/jpeg"/>
                    <pubDate>Mon, 09 Dec 2024 12:00:00 GMT</pubDate>
                </item>
                <item>
                    <title></title>
                    <link>https://agencia.example.gov/noticia/2</link>
                    <guid>https://agencia.example.gov/noticia/2</guid>
                </item>
            </channel>
        </rss>
    "#;

    mod entry_mapping_tests {
        use super::*;

        #[test]
        fn test_maps_rss_item() {
            let entries = parse_entries(RSS_WITH_ENCLOSURE);
            let article = Importer::entry_to_article(&entries[0], None).unwrap();

            assert_eq!(article.title, "Nova unidade de saúde");
            assert_eq!(article.source_url, "https://agencia.example.gov/noticia/1");
            assert_eq!(
                article.content.as_deref(),
                Some("<p>A unidade abre segunda</p>")
            );
            assert_eq!(article.category.as_deref(), Some("Saúde"));
            assert_eq!(
                article.image_url.as_deref(),
                Some("https://agencia.example.gov/img/1.jpg")
            );
            assert_eq!(article.created_at.to_rfc3339(), "2024-12-09T12:00:00+00:00");
        }

        #[test]
        fn test_feed_category_wins_over_entry_category() {
            let entries = parse_entries(RSS_WITH_ENCLOSURE);
            let article = Importer::entry_to_article(&entries[0], Some("Estado")).unwrap();
            assert_eq!(article.category.as_deref(), Some("Estado"));
        }

        #[test]
        fn test_untitled_and_bare_item() {
            let entries = parse_entries(RSS_WITH_ENCLOSURE);
            let article = Importer::entry_to_article(&entries[1], None).unwrap();

            assert_eq!(article.title, UNTITLED);
            assert!(article.content.is_none());
            assert!(article.category.is_none());
            assert!(article.image_url.is_none());
        }

        const RSS_WITH_MEDIA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
            <rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
                <channel>
                    <title>Agência</title>
                    <link>https://agencia.example.gov</link>
                    <description>Notícias</description>
                    <item>
                        <title>Com miniatura</title>
                        <link>https://agencia.example.gov/noticia/10</link>
                        <media:content url="https://agencia.example.gov/img/grande.jpg" type="image/jpeg" medium="image"/>
                        <media:thumbnail url="https://agencia.example.gov/img/mini.jpg"/>
                    </item>
                    <item>
                        <title>Só mídia</title>
                        <link>https://agencia.example.gov/noticia/11</link>
                        <media:content url="https://agencia.example.gov/video/11.mp4" type="video/mp4"/>
                        <media:content url="https://agencia.example.gov/img/11.png" type="image/png"/>
                    </item>
                </channel>
            </rss>
        "#;

        #[test]
        fn test_thumbnail_wins_over_media_content() {
            let entries = parse_entries(RSS_WITH_MEDIA);
            let article = Importer::entry_to_article(&entries[0], None).unwrap();
            assert_eq!(
                article.image_url.as_deref(),
                Some("https://agencia.example.gov/img/mini.jpg")
            );
        }

        #[test]
        fn test_first_image_media_content_is_used() {
            let entries = parse_entries(RSS_WITH_MEDIA);
            let article = Importer::entry_to_article(&entries[1], None).unwrap();
            assert_eq!(
                article.image_url.as_deref(),
                Some("https://agencia.example.gov/img/11.png")
            );
        }

        #[test]
        fn test_entry_without_link_is_dropped() {
            let entry = Entry {
                id: "no-link".to_string(),
                ..Default::default()
            };
            assert!(Importer::entry_to_article(&entry, Some("Geral")).is_none());
        }

        #[test]
        fn test_atom_content_preferred_over_summary() {
            let atom = r#"<?xml version="1.0" encoding="utf-8"?>
                <feed xmlns="http://www.w3.org/2005/Atom">
                    <title>Câmara</title>
                    <id>urn:camara</id>
                    <updated>2024-12-01T08:00:00Z</updated>
                    <entry>
                        <title>Sessão ordinária</title>
                        <id>urn:camara:1</id>
                        <link href="https://camara.example.gov/sessao/1"/>
                        <updated>2024-12-01T08:00:00Z</updated>
                        <summary>Resumo</summary>
                        <content type="html">&lt;p&gt;Pauta completa&lt;/p&gt;</content>
                    </entry>
                </feed>
            "#;

            let entries = parse_entries(atom);
            let article = Importer::entry_to_article(&entries[0], None).unwrap();

            assert_eq!(article.content.as_deref(), Some("<p>Pauta completa</p>"));
            assert_eq!(article.created_at.to_rfc3339(), "2024-12-01T08:00:00+00:00");
        }
    }

    mod import_tests {
        use super::*;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        async fn create_test_db() -> Arc<Database> {
            let db = Database::new("sqlite::memory:").await.unwrap();
            db.initialize().await.unwrap();
            Arc::new(db)
        }

        fn feed_config(url: String) -> FeedConfig {
            FeedConfig {
                name: "Agência".to_string(),
                url,
                category: Some("Estado".to_string()),
            }
        }

        #[tokio::test]
        async fn test_import_feed_inserts_then_skips_duplicates() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/rss"))
                .respond_with(ResponseTemplate::new(200).set_body_string(RSS_WITH_ENCLOSURE))
                .mount(&server)
                .await;

            let db = create_test_db().await;
            let feed = feed_config(format!("{}/rss", server.uri()));
            let importer = Importer::new(db.clone(), vec![feed.clone()]).unwrap();

            let first = importer.import_feed(&feed).await.unwrap();
            assert_eq!(first, ImportReport { imported: 2, skipped: 0 });

            let second = importer.import_all().await.unwrap();
            assert_eq!(second, ImportReport { imported: 0, skipped: 2 });

            assert!(db
                .article_exists("https://agencia.example.gov/noticia/1")
                .await
                .unwrap());
            assert!(!importer.is_running());
        }

        #[tokio::test]
        async fn test_import_feed_error_status() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&server)
                .await;

            let db = create_test_db().await;
            let feed = feed_config(server.uri());
            let importer = Importer::new(db, vec![]).unwrap();

            let result = importer.import_feed(&feed).await;
            assert!(matches!(result, Err(ImportError::HttpStatus(500))));
            assert!(!importer.is_running());
        }

        #[tokio::test]
        async fn test_import_feed_unparseable_body() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_string("definitely not xml"))
                .mount(&server)
                .await;

            let db = create_test_db().await;
            let importer = Importer::new(db, vec![]).unwrap();

            let result = importer.import_feed(&feed_config(server.uri())).await;
            assert!(matches!(result, Err(ImportError::Parse(_))));
        }

        #[tokio::test]
        async fn test_import_all_continues_past_broken_feed() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/broken"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/rss"))
                .respond_with(ResponseTemplate::new(200).set_body_string(RSS_WITH_ENCLOSURE))
                .mount(&server)
                .await;

            let db = create_test_db().await;
            let importer = Importer::new(
                db,
                vec![
                    feed_config(format!("{}/broken", server.uri())),
                    feed_config(format!("{}/rss", server.uri())),
                ],
            )
            .unwrap();

            let report = importer.import_all().await.unwrap();
            assert_eq!(report.imported, 2);
        }

        #[tokio::test]
        async fn test_invalid_feed_url() {
            let db = create_test_db().await;
            let importer = Importer::new(db, vec![]).unwrap();

            let result = importer
                .import_feed(&feed_config("not a url".to_string()))
                .await;
            assert!(matches!(result, Err(ImportError::InvalidUrl(_))));
        }

        #[tokio::test]
        async fn test_concurrent_import_is_refused() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(RSS_WITH_ENCLOSURE)
                        .set_delay(Duration::from_millis(500)),
                )
                .mount(&server)
                .await;

            let db = create_test_db().await;
            let feed = feed_config(server.uri());
            let importer = Arc::new(Importer::new(db, vec![feed.clone()]).unwrap());

            let background = {
                let importer = importer.clone();
                let feed = feed.clone();
                tokio::spawn(async move { importer.import_feed(&feed).await })
            };
            while !importer.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let result = importer.import_all().await;
            assert!(matches!(result, Err(ImportError::AlreadyRunning)));

            let first = background.await.unwrap().unwrap();
            assert_eq!(first.imported, 2);
            assert!(!importer.is_running());
        }

        #[tokio::test]
        async fn test_abandoned_import_releases_lock() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(RSS_WITH_ENCLOSURE)
                        .set_delay(Duration::from_secs(5)),
                )
                .mount(&server)
                .await;

            let db = create_test_db().await;
            let importer = Importer::new(db, vec![]).unwrap();

            let abandoned = tokio::time::timeout(
                Duration::from_millis(200),
                importer.import_feed(&feed_config(server.uri())),
            )
            .await;
            assert!(abandoned.is_err());

            assert!(!importer.is_running());
            let report = importer.import_all().await.unwrap();
            assert_eq!(report, ImportReport::default());
        }

        #[tokio::test]
        async fn test_import_all_reports_storage_failure() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_string(RSS_WITH_ENCLOSURE))
                .mount(&server)
                .await;

            // no schema: every lookup against `news` fails
            let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
            let importer = Importer::new(db, vec![feed_config(server.uri())]).unwrap();

            let result = importer.import_all().await;
            assert!(matches!(result, Err(ImportError::Database(_))));
            assert!(!importer.is_running());
        }

        #[test]
        fn test_import_request_parsing() {
            let request: ImportRequest =
                serde_json::from_str(r#"{"feedUrl": "https://a.example/rss"}"#).unwrap();
            assert_eq!(request.feed_url, "https://a.example/rss");
            assert!(request.category.is_none());
        }
    }
}
