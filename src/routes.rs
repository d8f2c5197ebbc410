use std::sync::Arc;

use askama::Template;
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderName, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::config::{Config, FeedConfig};
use crate::db::{Article, Database};
use crate::importer::{ImportError, ImportReport, ImportRequest, Importer};
use crate::scraper::{ScrapeError, ScrapeRequest, Scraper};
use crate::text;

pub struct AppState {
    pub db: Arc<Database>,
    pub importer: Arc<Importer>,
    pub scraper: Arc<Scraper>,
    pub config: Arc<Config>,
}

/// Builds the full application: handlers, CORS, request tracing, and the
/// static front end as fallback.
pub fn app(state: Arc<AppState>, static_dir: &str) -> Router {
    Router::new()
        .route("/render-article", get(render_article))
        .route("/scrape-rewrite", post(scrape_rewrite))
        .route("/import-rss", post(import_rss))
        .route("/health", get(health))
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin may call the handlers; pre-flight requests are answered here.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("apikey"),
            HeaderName::from_static("x-client-info"),
        ])
}

// Template structs
#[derive(Template)]
#[template(path = "article_share.html")]
pub struct SharePageTemplate {
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub share_url: String,
    pub category: String,
    pub article_id: String,
}

impl SharePageTemplate {
    pub fn from_article(article: &Article, config: &Config) -> Self {
        let description = text::excerpt(article.content.as_deref().unwrap_or_default());
        let image_url = config.absolute_url(
            non_empty(article.image_url.as_deref()).unwrap_or(&config.fallback_image),
        );
        let category = non_empty(article.category.as_deref())
            .unwrap_or(&config.fallback_category)
            .to_string();

        Self {
            title: article.title.clone(),
            description,
            image_url,
            share_url: config.share_url(&article.id),
            category,
            article_id: article.id.clone(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Template)]
#[template(path = "article_not_found.html")]
pub struct NotFoundTemplate;

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn json_error(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorBody { error: message })).into_response()
}

impl IntoResponse for ScrapeError {
    fn into_response(self) -> Response {
        warn!("Scrape request rejected: {}", self);
        json_error(StatusCode::BAD_REQUEST, self.to_string())
    }
}

impl IntoResponse for ImportError {
    fn into_response(self) -> Response {
        let status = match &self {
            ImportError::AlreadyRunning => StatusCode::CONFLICT,
            ImportError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        warn!("Import request failed: {}", self);
        json_error(status, self.to_string())
    }
}

// Route handlers
#[derive(Debug, Deserialize)]
pub struct ArticleQuery {
    #[serde(default)]
    pub id: Option<String>,
}

pub async fn render_article(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ArticleQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            warn!("Unreadable article query: {}", rejection);
            ArticleQuery { id: None }
        }
    };
    let Some(id) = non_empty(query.id.as_deref()) else {
        return Ok((StatusCode::NOT_FOUND, "ID do artigo não especificado").into_response());
    };

    let article = match state.db.get_article(id).await {
        Ok(Some(article)) => article,
        Ok(None) => {
            info!(article_id = %id, "Article not found");
            return Ok((StatusCode::NOT_FOUND, HtmlTemplate(NotFoundTemplate)).into_response());
        }
        Err(e) => {
            error!(article_id = %id, "Failed to fetch article: {}", e);
            return Ok((StatusCode::NOT_FOUND, HtmlTemplate(NotFoundTemplate)).into_response());
        }
    };

    let html = SharePageTemplate::from_article(&article, &state.config).render()?;

    Ok((
        StatusCode::OK,
        [(header::CACHE_CONTROL, state.config.cache.header_value())],
        Html(html),
    )
        .into_response())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub content: String,
}

pub async fn scrape_rewrite(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ScrapeResponse>, ScrapeError> {
    let url = ScrapeRequest::target_from_body(&body)?;
    let content = state.scraper.scrape_and_rewrite(&url).await?;
    Ok(Json(ScrapeResponse { content }))
}

pub async fn import_rss(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ImportReport>, ImportError> {
    let report = if body.iter().all(u8::is_ascii_whitespace) {
        state.importer.import_all().await?
    } else {
        let request: ImportRequest = serde_json::from_slice(&body)?;
        let feed = FeedConfig {
            name: request.feed_url.clone(),
            url: request.feed_url,
            category: request.category,
        };
        state.importer.import_feed(&feed).await?
    };

    Ok(Json(report))
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
