pub mod brands;
pub mod config;
mod config_env;
pub mod identity;
pub mod intake;
pub mod llm;
pub mod models;
pub mod registry;
pub mod repos;
pub mod search;
pub mod timezone;
