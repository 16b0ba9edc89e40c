//! Configuration types for troupe

use crate::error::{Result, TroupeError};
use crate::identity::AgentIdentity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "troupe.toml";

/// Environment variable naming an extra configuration file
pub const CONFIG_PATH_ENV: &str = "TROUPE_CONFIG_PATH";

/// Prefix for environment overrides, nested keys separated by `__`
pub const ENV_PREFIX: &str = "TROUPE_";

/// Placeholder in launch arguments replaced by the agent identity
pub const IDENTITY_PLACEHOLDER: &str = "{identity}";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TroupeConfig {
    /// Supervisor settings
    pub daemon: DaemonConfig,

    /// Settings for the agent loop running inside each child
    pub agent: AgentConfig,

    /// How agent children are launched
    pub launch: LaunchConfig,
}

/// Supervisor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Identities to spawn, one process each
    pub identities: Vec<AgentIdentity>,

    /// Delay between health-check cycles
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,

    /// Automatic restarts allowed per identity before giving up
    pub max_restarts: u32,

    /// Grace period between SIGTERM and SIGKILL on shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            identities: AgentIdentity::all().to_vec(),
            health_check_interval: Duration::from_secs(2),
            max_restarts: 3,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Agent loop settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Delay between heartbeats
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,

    /// Priority stamped on outgoing heartbeats
    pub heartbeat_priority: i32,

    /// How long each poll of the own mailbox may wait
    #[serde(with = "humantime_serde")]
    pub poll_timeout: Duration,

    /// Stop after this many heartbeats (runs until cancelled when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            heartbeat_priority: crate::message::DEFAULT_PRIORITY,
            poll_timeout: Duration::ZERO,
            max_iterations: None,
        }
    }
}

/// Child launch settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LaunchConfig {
    /// Program to run (the current executable when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,

    /// Arguments; `{identity}` is replaced by the agent identity
    pub args: Vec<String>,

    /// Extra environment variables for every child
    pub env: BTreeMap<String, String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: vec![
                "agent".to_string(),
                "--identity".to_string(),
                IDENTITY_PLACEHOLDER.to_string(),
            ],
            env: BTreeMap::new(),
        }
    }
}

impl LaunchConfig {
    /// Program to launch, falling back to the running executable
    pub fn resolve_program(&self) -> Result<PathBuf> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => Ok(std::env::current_exe()?),
        }
    }

    /// Arguments for one identity, placeholders substituted
    pub fn args_for(&self, identity: AgentIdentity) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(IDENTITY_PLACEHOLDER, identity.as_str()))
            .collect()
    }
}

impl TroupeConfig {
    /// Load configuration from files and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `troupe.toml` in the working directory
    /// 3. File named by `TROUPE_CONFIG_PATH`
    /// 4. `TROUPE_` environment overrides (`TROUPE_DAEMON__MAX_RESTARTS=5`)
    ///
    /// # Errors
    ///
    /// Returns an error if a file is invalid or the result fails validation.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`TroupeConfig::load`], but an explicit path replaces steps 2 and 3.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit file is missing or invalid.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(TroupeConfig::default()));

        match path {
            Some(path) => {
                ensure_exists(path)?;
                figment = figment.merge(Toml::file(path));
            }
            None => {
                figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
                if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
                    figment = figment.merge(Toml::file(path));
                }
            }
        }

        let config: TroupeConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| {
                TroupeError::Configuration(format!("Failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let path = path.as_ref();
        ensure_exists(path)?;

        let config: TroupeConfig = Figment::from(Serialized::defaults(TroupeConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                TroupeError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.daemon.identities.is_empty() {
            return Err(TroupeError::Configuration(
                "daemon.identities must name at least one agent".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for identity in &self.daemon.identities {
            if !seen.insert(identity) {
                return Err(TroupeError::Configuration(format!(
                    "daemon.identities lists {} more than once",
                    identity
                )));
            }
        }

        let non_zero = [
            ("daemon.health_check_interval", self.daemon.health_check_interval),
            ("daemon.shutdown_timeout", self.daemon.shutdown_timeout),
            ("agent.tick_interval", self.agent.tick_interval),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(TroupeError::Configuration(format!("{} must be non-zero", name)));
            }
        }

        Ok(())
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(TroupeError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = TroupeConfig::default();
        assert_eq!(
            config.daemon.identities,
            vec![AgentIdentity::Agent1, AgentIdentity::Agent2]
        );
        assert_eq!(config.daemon.health_check_interval, Duration::from_secs(2));
        assert_eq!(config.daemon.max_restarts, 3);
        assert_eq!(config.daemon.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.agent.tick_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_args_substitute_identity() {
        let launch = LaunchConfig::default();
        assert_eq!(
            launch.args_for(AgentIdentity::Agent2),
            vec!["agent", "--identity", "agent2"]
        );
    }

    #[test]
    fn test_load_merges_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                [daemon]
                identities = ["agent2"]
                health_check_interval = "250ms"

                [agent]
                max_iterations = 4
                "#,
            )?;
            jail.set_env("TROUPE_DAEMON__MAX_RESTARTS", "7");
            jail.set_env("TROUPE_AGENT__TICK_INTERVAL", "50ms");

            let config = TroupeConfig::load().map_err(|e| e.to_string())?;

            assert_eq!(config.daemon.identities, vec![AgentIdentity::Agent2]);
            assert_eq!(config.daemon.health_check_interval, Duration::from_millis(250));
            assert_eq!(config.daemon.max_restarts, 7);
            assert_eq!(config.daemon.shutdown_timeout, Duration::from_secs(5));
            assert_eq!(config.agent.tick_interval, Duration::from_millis(50));
            assert_eq!(config.agent.max_iterations, Some(4));
            Ok(())
        });
    }

    #[test]
    fn test_config_path_env_is_honored() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[daemon]\nmax_restarts = 1\n")?;
            jail.set_env(CONFIG_PATH_ENV, "custom.toml");

            let config = TroupeConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.daemon.max_restarts, 1);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let err = TroupeConfig::load_from(Some(Path::new("/definitely/not/here.toml")))
            .unwrap_err();
        assert!(matches!(err, TroupeError::Configuration(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("troupe.toml");
        std::fs::write(
            &path,
            "[launch]\nprogram = \"/bin/sleep\"\nargs = [\"30\"]\n[launch.env]\nFOO = \"bar\"\n",
        )
        .unwrap();

        let config = TroupeConfig::from_file(&path).unwrap();
        assert_eq!(config.launch.program, Some(PathBuf::from("/bin/sleep")));
        assert_eq!(config.launch.args, vec!["30"]);
        assert_eq!(config.launch.env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(config.daemon.max_restarts, 3);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = TroupeConfig::default();
        config.daemon.identities.clear();
        assert!(config.validate().is_err());

        let mut config = TroupeConfig::default();
        config.daemon.identities = vec![AgentIdentity::Agent1, AgentIdentity::Agent1];
        assert!(config.validate().is_err());

        let mut config = TroupeConfig::default();
        config.daemon.health_check_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
