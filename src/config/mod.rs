/// Database configuration and connection management
pub mod database;

/// Deployment settings and user roster loaded from config.toml
pub mod settings;
