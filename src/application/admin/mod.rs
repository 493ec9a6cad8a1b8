//! Application services for the administrative surface.

pub mod categories;
pub mod posts;
pub mod settings;
pub mod users;
