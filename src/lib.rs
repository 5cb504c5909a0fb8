//! Car recognition relay: turns uploaded photos into data URLs, forwards them to an
//! external classifier and normalizes the make/model/year predictions it returns.

pub mod client;
pub mod compress;
pub mod config;
pub mod data_url;
pub mod error;
pub mod model;
pub mod relay;
pub mod routes;
pub mod types;
pub mod upload;
