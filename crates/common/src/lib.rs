pub mod config;
pub mod db;
pub mod observability;
pub mod store;
pub mod types;
