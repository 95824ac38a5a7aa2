//! Loading the Gateway's YAML configuration with `${VAR}` environment substitution.

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use thiserror::Error;

use crate::model::GatewayConfig;

pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG_PATH";
pub const HOST_ENV: &str = "GATEWAY_HOST";
pub const PORT_ENV: &str = "GATEWAY_PORT";
pub const AUTH_TOKEN_ENV: &str = "GATEWAY_AUTH_TOKEN";
const DEFAULT_CONFIG_PATH: &str = "config/gateway.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Resolves the config file path: explicit parameter, then `GATEWAY_CONFIG_PATH`, then the default.
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(p);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Loads and fully resolves the Gateway configuration: read YAML, substitute `${VAR}` tokens
/// from the process environment (recursively, through lists and maps), deserialize, then apply
/// the env overrides for listen host/port/auth token.
pub fn load(explicit_path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let path = resolve_path(explicit_path);
    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    load_str(&raw)
}

/// Parses a YAML string directly — split out from [`load`] so tests don't need real files.
pub fn load_str(raw: &str) -> Result<GatewayConfig, ConfigError> {
    let mut value: Value = serde_yaml::from_str(raw)?;
    substitute_env(&mut value);
    let mut config: GatewayConfig = serde_yaml::from_value(value)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Recursively walks a YAML value, replacing any scalar string of the literal form `${NAME}`
/// with the value of the `NAME` environment variable. Tokens whose variable is unset are left
/// untouched so a missing override is visible rather than silently blanked.
fn substitute_env(value: &mut Value) {
    match value {
        Value::String(s) => {
            if let Some(name) = env_var_name(s) {
                if let Ok(resolved) = std::env::var(name) {
                    *s = resolved;
                }
            }
        }
        Value::Sequence(seq) => {
            for item in seq {
                substitute_env(item);
            }
        }
        Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_env(v);
            }
        }
        _ => {}
    }
}

fn env_var_name(s: &str) -> Option<&str> {
    s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}'))
}

/// Applies the listen host/port/auth-token overrides named in §6 after typed deserialization,
/// since those three are env-overridable independent of whether the YAML used a `${VAR}` token.
fn apply_env_overrides(config: &mut GatewayConfig) {
    if let Ok(host) = std::env::var(HOST_ENV) {
        config.gateway.host = host;
    }
    if let Ok(port) = std::env::var(PORT_ENV) {
        if let Ok(port) = port.parse() {
            config.gateway.port = port;
        }
    }
    if let Ok(token) = std::env::var(AUTH_TOKEN_ENV) {
        config.gateway.auth.token = Some(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const SAMPLE: &str = r#"
gateway:
  host: 0.0.0.0
  port: 9000
channels:
  telegram:
    enabled: true
    token: "${TELEGRAM_TOKEN_TEST}"
    whitelist: ["U1", "${WHITELIST_EXTRA_TEST}"]
    rate_limit:
      max_requests: 5
      window_seconds: 30
"#;

    #[test]
    fn substitutes_scalar_and_list_entries() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("TELEGRAM_TOKEN_TEST", "secret-token");
        std::env::set_var("WHITELIST_EXTRA_TEST", "U2");
        let cfg = load_str(SAMPLE).unwrap();
        std::env::remove_var("TELEGRAM_TOKEN_TEST");
        std::env::remove_var("WHITELIST_EXTRA_TEST");

        let tg = cfg.channel("telegram").unwrap();
        assert_eq!(tg.token, "secret-token");
        assert_eq!(tg.whitelist, vec!["U1".to_string(), "U2".to_string()]);
        assert_eq!(tg.rate_limit.max_requests, 5);
    }

    #[test]
    fn missing_env_var_leaves_token_literal() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("TELEGRAM_TOKEN_TEST");
        std::env::remove_var("WHITELIST_EXTRA_TEST");
        let cfg = load_str(SAMPLE).unwrap();
        assert_eq!(cfg.channel("telegram").unwrap().token, "${TELEGRAM_TOKEN_TEST}");
    }

    #[test]
    fn host_port_token_env_overrides_apply_after_parse() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(HOST_ENV, "10.0.0.1");
        std::env::set_var(PORT_ENV, "7777");
        std::env::set_var(AUTH_TOKEN_ENV, "override-token");
        let cfg = load_str(SAMPLE).unwrap();
        std::env::remove_var(HOST_ENV);
        std::env::remove_var(PORT_ENV);
        std::env::remove_var(AUTH_TOKEN_ENV);

        assert_eq!(cfg.gateway.host, "10.0.0.1");
        assert_eq!(cfg.gateway.port, 7777);
        assert_eq!(cfg.gateway.auth.token.as_deref(), Some("override-token"));
    }

    #[test]
    fn defaults_fill_in_missing_sections() {
        let cfg = load_str("gateway: {}\nchannels: {}\n").unwrap();
        assert_eq!(cfg.gateway.host, "127.0.0.1");
        assert_eq!(cfg.gateway.port, 18900);
        assert!(cfg.gateway.hot_reload);
        assert_eq!(cfg.gateway.session.max_idle_hours, 24);
    }

    #[test]
    fn resolve_path_prefers_explicit_over_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(CONFIG_PATH_ENV, "/tmp/from-env.yaml");
        let p = resolve_path(Some(Path::new("/tmp/explicit.yaml")));
        std::env::remove_var(CONFIG_PATH_ENV);
        assert_eq!(p, PathBuf::from("/tmp/explicit.yaml"));
    }

    #[test]
    fn resolve_path_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var(CONFIG_PATH_ENV);
        assert_eq!(resolve_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));
    }
}
