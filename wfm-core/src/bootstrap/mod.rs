//! Bootstrap module for initializing the WFM server
//!
//! This module handles:
//! - Configuration loading
//! - Database cluster initialization

pub mod config;
pub mod database;

pub use config::load_config;
pub use database::init_database_cluster;
