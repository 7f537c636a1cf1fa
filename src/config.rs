//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::chatbot::Pacing;
use crate::error::ConfigError;

/// One year.
const MAX_SESSION_TTL_HOURS: u64 = 24 * 365;

/// Server configuration, read from `EFIKA_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP/WebSocket listen port.
    pub port: u16,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Credential for the privileged user-creation operation.
    pub service_role_key: SecretString,
    /// How long a sign-in session stays valid.
    pub session_ttl: Duration,
    /// Display pacing for chat bot replies.
    pub chat_pacing: Pacing,
    /// Optional directory for daily-rolling log files.
    pub log_dir: Option<PathBuf>,
    /// Allowed CORS origin; `None` allows any origin.
    pub cors_origin: Option<String>,
}

impl ServerConfig {
    /// Build the configuration from the environment.
    ///
    /// Only `EFIKA_SERVICE_ROLE_KEY` is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port: u16 = match lookup("EFIKA_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "EFIKA_PORT".to_string(),
                message: format!("not a port number: {raw}"),
            })?,
            None => 8080,
        };

        let db_path = lookup("EFIKA_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/efika.db"));

        let service_role_key = lookup("EFIKA_SERVICE_ROLE_KEY")
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("EFIKA_SERVICE_ROLE_KEY".to_string()))?;

        let session_ttl_hours: u64 = match lookup("EFIKA_SESSION_TTL_HOURS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|hours| (1..=MAX_SESSION_TTL_HOURS).contains(hours))
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "EFIKA_SESSION_TTL_HOURS".to_string(),
                    message: format!("expected 1 to {MAX_SESSION_TTL_HOURS} hours, got `{raw}`"),
                })?,
            None => 12,
        };

        let chat_pacing = match lookup("EFIKA_CHAT_PACING").as_deref() {
            None | Some("ui") => Pacing::Ui,
            Some("instant") => Pacing::Instant,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "EFIKA_CHAT_PACING".to_string(),
                    message: format!("expected `ui` or `instant`, got `{other}`"),
                });
            }
        };

        let log_dir = lookup("EFIKA_LOG_DIR")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let cors_origin = lookup("EFIKA_CORS_ORIGIN").filter(|s| !s.is_empty() && s != "*");

        Ok(Self {
            port,
            db_path,
            service_role_key,
            session_ttl: Duration::from_secs(session_ttl_hours * 3600),
            chat_pacing,
            log_dir,
            cors_origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_with_only_service_key() {
        let config = ServerConfig::from_lookup(lookup(&[("EFIKA_SERVICE_ROLE_KEY", "srk")])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_path, PathBuf::from("./data/efika.db"));
        assert_eq!(config.session_ttl, Duration::from_secs(12 * 3600));
        assert_eq!(config.chat_pacing, Pacing::Ui);
        assert_eq!(config.service_role_key.expose_secret(), "srk");
        assert!(config.log_dir.is_none());
        assert!(config.cors_origin.is_none());
    }

    #[test]
    fn missing_service_key_is_an_error() {
        let err = ServerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "EFIKA_SERVICE_ROLE_KEY"));
    }

    #[test]
    fn overrides_are_applied() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("EFIKA_SERVICE_ROLE_KEY", "srk"),
            ("EFIKA_PORT", "9000"),
            ("EFIKA_DB_PATH", "/tmp/x.db"),
            ("EFIKA_SESSION_TTL_HOURS", "1"),
            ("EFIKA_CHAT_PACING", "instant"),
            ("EFIKA_CORS_ORIGIN", "https://efikacorretora.com.br"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.chat_pacing, Pacing::Instant);
        assert_eq!(
            config.cors_origin.as_deref(),
            Some("https://efikacorretora.com.br")
        );
    }

    #[test]
    fn session_ttl_out_of_range_is_rejected() {
        for raw in ["0", "doze", "-3", "8761", "18446744073709551615"] {
            let err = ServerConfig::from_lookup(lookup(&[
                ("EFIKA_SERVICE_ROLE_KEY", "srk"),
                ("EFIKA_SESSION_TTL_HOURS", raw),
            ]))
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "EFIKA_SESSION_TTL_HOURS"),
                "{raw} should be rejected"
            );
        }

        let config = ServerConfig::from_lookup(lookup(&[
            ("EFIKA_SERVICE_ROLE_KEY", "srk"),
            ("EFIKA_SESSION_TTL_HOURS", "8760"),
        ]))
        .unwrap();
        assert_eq!(config.session_ttl, Duration::from_secs(8760 * 3600));
    }

    #[test]
    fn bad_port_and_pacing_are_rejected() {
        assert!(
            ServerConfig::from_lookup(lookup(&[
                ("EFIKA_SERVICE_ROLE_KEY", "srk"),
                ("EFIKA_PORT", "http"),
            ]))
            .is_err()
        );
        assert!(
            ServerConfig::from_lookup(lookup(&[
                ("EFIKA_SERVICE_ROLE_KEY", "srk"),
                ("EFIKA_CHAT_PACING", "slow"),
            ]))
            .is_err()
        );
    }
}
