use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Settings for the `server` binary. Field names mirror the environment
/// variables from which they ultimately come, lower-cased by the
/// `Environment` source.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_grpc_address")]
    pub grpc_address: String,
    #[serde(default)]
    pub store_interval: u64,
    #[serde(default)]
    pub store_file: String,
    #[serde(default)]
    pub restore: bool,
    #[serde(default)]
    pub crypto_key: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub database_dsn: String,
    #[serde(default)]
    pub trusted_subnet: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Settings for the `agent` binary.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_grpc_address")]
    pub grpc_address: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
    #[serde(default = "default_server_timeout")]
    pub server_timeout: u64,
    #[serde(default)]
    pub crypto_key: String,
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_grpc_address() -> String {
    "127.0.0.1:8081".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_server_timeout() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServerSettings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(Environment::default().separator("__"))
            .set_default("address", default_address())?
            .set_default("grpc_address", default_grpc_address())?
            .set_default("log_level", default_log_level())?
            .build()?;

        config.try_deserialize()
    }
}

impl AgentSettings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(Environment::default().separator("__"))
            .set_default("address", default_address())?
            .set_default("grpc_address", default_grpc_address())?
            .set_default("poll_interval", default_poll_interval())?
            .set_default("report_interval", default_report_interval())?
            .set_default("server_timeout", default_server_timeout())?
            .set_default("log_level", default_log_level())?
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_settings_load_with_no_env_uses_defaults() {
        let settings = ServerSettings::load().unwrap();
        assert_eq!(settings.address, "127.0.0.1:8080");
        assert!(!settings.restore);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn agent_settings_load_with_no_env_uses_defaults() {
        let settings = AgentSettings::load().unwrap();
        assert_eq!(settings.poll_interval, 2);
        assert_eq!(settings.report_interval, 10);
    }
}
