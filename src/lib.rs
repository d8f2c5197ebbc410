//! Municipal News - share pages, feed import and scraping for a city news site
//!
//! This crate serves the dynamic parts of a static news site: social-sharing
//! pages rendered from the article database, an RSS importer that fills the
//! database, and a scrape endpoint for external pages.

pub mod config;
pub mod db;
pub mod importer;
pub mod nav;
pub mod routes;
pub mod scraper;
pub mod supabase;
pub mod text;
pub mod theme;
