//! Outbound search integrations.

pub mod web;

pub use web::WebSearchClient;
