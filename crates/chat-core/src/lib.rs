pub mod assistant;
pub mod config;
mod config_env;
pub mod error;
pub mod models;
pub mod openai;
pub mod store;
