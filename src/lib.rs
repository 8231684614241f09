pub mod browser;
pub mod collector;
pub mod config;
pub mod constants;
pub mod enrich;
pub mod error;
pub mod export;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod scrapers;
pub mod selectors;
pub mod types;
pub mod wait;
