//! Environment-driven configuration, loaded once at startup.
//!
//! Mirrors `app/config.py`'s `pydantic_settings.BaseSettings` with env
//! prefix `rss_server_`: every field has a sane local-dev default so the
//! server boots without an `.env` file, but every value can be overridden.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub mongo_connection_string: String,
    pub mongo_database: String,
    pub auth_private_key_path: String,
    pub auth_public_key_path: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub port: u16,
    pub cors_origins: String,
    pub flush_interval: Duration,
    pub min_head_time: chrono::Duration,
    pub default_head_time: chrono::Duration,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            mongo_connection_string: env_or(
                "RSS_SERVER_CONNECTION_STRING",
                "mongodb://localhost:27017",
            ),
            mongo_database: env_or("RSS_SERVER_DATABASE", "flight_platform"),
            auth_private_key_path: env_or("AUTH_PRIVATE_KEY_PATH", "private.pem"),
            auth_public_key_path: env_or("AUTH_PUBLIC_KEY_PATH", "public.pem"),
            mqtt_host: env_or("RSS_SERVER_MQTT_HOST", "localhost"),
            mqtt_port: env_parse("RSS_SERVER_MQTT_PORT", 1883),
            port: env_parse("PORT", 3001),
            cors_origins: env_or("CORS_ORIGINS", "http://localhost:3000,http://localhost:5173"),
            flush_interval: Duration::from_millis(500),
            min_head_time: chrono::Duration::seconds(60),
            default_head_time: chrono::Duration::seconds(120),
        }
    }
}
