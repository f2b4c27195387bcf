use std::path::{Path, PathBuf};

use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use eyre::{Result, WrapErr};

use crate::config::models::ProxyConfig;

/// Prefix for environment variables, e.g. `GXPROXY_SESSIONS`.
pub const ENV_PREFIX: &str = "GXPROXY";

/// Values given explicitly on the command line; they beat every other layer.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub cookie: Option<String>,
    pub sessions: Option<PathBuf>,
    pub reverse_proxy: bool,
    pub verbose: bool,
    pub upstream_timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub log_json: bool,
}

/// Load configuration: defaults, then the optional file, then `GXPROXY_*`
/// environment variables, then command line overrides.
pub fn load_config(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<ProxyConfig> {
    load_config_with_env(
        config_path,
        overrides,
        Environment::with_prefix(ENV_PREFIX).try_parsing(true),
    )
}

fn load_config_with_env(
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
    environment: Environment,
) -> Result<ProxyConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        // Determine file format based on extension
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        };
        let name = path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?;
        builder = builder.add_source(File::new(name, format).required(true));
    }

    builder = apply_overrides(builder.add_source(environment), overrides)
        .wrap_err("Failed to apply command line overrides")?;

    let settings = builder.build().wrap_err_with(|| match config_path {
        Some(path) => format!("Failed to build config from {}", path.display()),
        None => "Failed to build config".to_string(),
    })?;

    settings
        .try_deserialize()
        .wrap_err("Failed to deserialize proxy configuration")
}

fn apply_overrides(
    builder: ConfigBuilder<DefaultState>,
    overrides: &ConfigOverrides,
) -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    let secs = |v: Option<u64>| v.map(|s| i64::try_from(s).unwrap_or(i64::MAX));

    builder
        .set_override_option("ip", overrides.ip.clone())?
        .set_override_option("port", overrides.port.map(i64::from))?
        .set_override_option("cookie", overrides.cookie.clone())?
        .set_override_option(
            "sessions",
            overrides
                .sessions
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )?
        .set_override_option("reverse_proxy", overrides.reverse_proxy.then_some(true))?
        .set_override_option("verbose", overrides.verbose.then_some(true))?
        .set_override_option(
            "upstream_timeout_secs",
            secs(overrides.upstream_timeout_secs),
        )?
        .set_override_option("poll_interval_secs", secs(overrides.poll_interval_secs))?
        .set_override_option("log_json", overrides.log_json.then_some(true))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn empty_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(config::Map::new()))
    }

    fn env_with(vars: &[(&str, &str)]) -> Environment {
        let mut map = config::Map::new();
        for (k, v) in vars {
            map.insert(k.to_string(), v.to_string());
        }
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(Some(map))
    }

    #[test]
    fn test_defaults_without_file() {
        let config =
            load_config_with_env(None, &ConfigOverrides::default(), empty_env()).unwrap();
        assert_eq!(config, ProxyConfig::default());
    }

    #[test]
    fn test_load_toml_config() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(
            file,
            r#"
ip = "0.0.0.0"
port = 8800
sessions = "/srv/galaxy/sessions.sqlite"
reverse_proxy = true
upstream_timeout_secs = 30
"#
        )
        .unwrap();

        let config =
            load_config_with_env(Some(file.path()), &ConfigOverrides::default(), empty_env())
                .unwrap();
        assert_eq!(config.ip, "0.0.0.0");
        assert_eq!(config.port, 8800);
        assert!(config.reverse_proxy);
        assert_eq!(config.upstream_timeout_secs, Some(30));
        assert_eq!(config.cookie, "galaxysession");
    }

    #[test]
    fn test_load_json_config() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        write!(file, r#"{{"cookie": "mysession", "verbose": true}}"#).unwrap();

        let config =
            load_config_with_env(Some(file.path()), &ConfigOverrides::default(), empty_env())
                .unwrap();
        assert_eq!(config.cookie, "mysession");
        assert!(config.verbose);
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(
            load_config_with_env(Some(&path), &ConfigOverrides::default(), empty_env()).is_err()
        );
    }

    #[test]
    fn test_layer_precedence() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(file, "port = 8100\ncookie = \"from_file\"\nip = \"10.0.0.1\"\n").unwrap();

        let env = env_with(&[("GXPROXY_PORT", "8200"), ("GXPROXY_COOKIE", "from_env")]);
        let overrides = ConfigOverrides {
            port: Some(8300),
            ..Default::default()
        };

        let config = load_config_with_env(Some(file.path()), &overrides, env).unwrap();
        assert_eq!(config.port, 8300);
        assert_eq!(config.cookie, "from_env");
        assert_eq!(config.ip, "10.0.0.1");
    }

    #[test]
    fn test_cli_flags_override() {
        let overrides = ConfigOverrides {
            sessions: Some(PathBuf::from("sessions.json")),
            reverse_proxy: true,
            poll_interval_secs: Some(10),
            ..Default::default()
        };

        let config = load_config_with_env(None, &overrides, empty_env()).unwrap();
        assert_eq!(config.sessions, Some(PathBuf::from("sessions.json")));
        assert!(config.reverse_proxy);
        assert_eq!(config.poll_interval_secs, Some(10));
        assert!(!config.verbose);
    }
}
