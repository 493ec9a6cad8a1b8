//! Server-rendered public pages.

pub mod views;
