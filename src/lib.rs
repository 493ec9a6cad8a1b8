//! Inkpost: a self-hosted blog with tagged caching, request deduplication,
//! sitemaps and search-engine indexing.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
pub mod util;
