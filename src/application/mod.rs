//! Application services layer.

pub mod admin;
pub mod blog;
pub mod dashboard;
pub mod error;
pub mod indexing;
pub mod repos;
pub mod sitemap;
