pub mod api;
pub mod catalog;
pub mod config;
pub mod fetcher;
pub mod normalize;
pub mod observability;
pub mod store;
pub mod worker;
