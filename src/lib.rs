pub mod app;
pub mod catalog;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod http;
pub mod output;
pub mod progress;
pub mod space;
pub mod store;
pub mod tabular;
pub mod validate;
