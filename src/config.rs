use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub server_host: String,
    pub server_port: u16,
    /// Upper bound on a single status-store fetch or append during
    /// reconciliation. A timed-out call drops that reconciliation attempt.
    pub store_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            mqtt_host: optional("MQTT_HOST", "localhost"),
            mqtt_port: optional("MQTT_PORT", "1883")
                .parse()
                .context("MQTT_PORT must be a valid port number")?,
            mqtt_client_id: optional("MQTT_CLIENT_ID", "greenhouse-service"),
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            store_timeout_secs: optional("STORE_TIMEOUT_SECS", "5")
                .parse()
                .context("STORE_TIMEOUT_SECS must be a positive integer")?,
        })
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_falls_back_to_default() {
        assert_eq!(optional("GREENHOUSE_TEST_UNSET_VAR", "1883"), "1883");
    }

    #[test]
    fn required_missing_var_errors() {
        let err = required("GREENHOUSE_TEST_UNSET_VAR").unwrap_err();
        assert!(err.to_string().contains("missing required env var"));
    }
}
