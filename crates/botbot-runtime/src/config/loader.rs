//! Layered configuration loading with figment.
//!
//! Sources, lowest to highest priority:
//!
//! 1. Built-in defaults
//! 2. Profile file (`botbot.{profile}.toml`)
//! 3. Main file (`botbot.toml`)
//! 4. `BOTBOT_*` environment variables, `__` separating nested keys
//! 5. Programmatic overrides passed to [`ConfigLoader::merge`]
//!
//! `BOTBOT_QUEUE__POP_TIMEOUT_MS=250` sets `queue.pop_timeout_ms`.
//!
//! YAML files (`botbot.yaml`, `botbot.yml`) are searched as well when the
//! `yaml-config` feature is enabled.
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("/etc/botbot/botbot.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::BotbotConfig;

const ENV_PREFIX: &str = "BOTBOT_";
const PROFILE_VAR: &str = "BOTBOT_PROFILE";
const APP_DIR: &str = "botbot";

/// Configuration profile, selecting `botbot.{profile}.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `BOTBOT_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder collecting configuration sources.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory searched for `botbot.toml`.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `$XDG_CONFIG_HOME/botbot` (or the platform equivalent).
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join(APP_DIR)),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching. Its profile variant
    /// next to it is still honored.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Overrides every other source with `config`.
    pub fn merge(mut self, config: BotbotConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Merges all sources and extracts the configuration.
    ///
    /// The result is not validated; see
    /// [`validate_config`](super::validate_config).
    pub fn load(self) -> ConfigResult<BotbotConfig> {
        let profile = self.profile.clone();
        let config: BotbotConfig = self.build_figment()?.extract()?;

        debug!(
            profile = %profile,
            chatbots = config.chatbots.len(),
            log_level = %config.logging.level,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(BotbotConfig::default()));

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            figment = self.merge_profile_variant(figment, &path)?;
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment)?;
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["PROFILE"])
                    .split("__"),
            );
        }

        // Programmatic overrides come last.
        let overrides = std::mem::take(&mut self.figment);
        Ok(figment.merge(overrides))
    }

    /// Merges one file, dispatching on its extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    /// `dir/botbot.production.toml` for `dir/botbot.toml`.
    fn profile_variant(&self, path: &Path) -> Option<PathBuf> {
        let stem = path.file_stem()?.to_str()?;
        let ext = path.extension()?.to_str()?;
        Some(path.with_file_name(format!("{stem}.{}.{ext}", self.profile)))
    }

    fn merge_profile_variant(&self, figment: Figment, path: &Path) -> ConfigResult<Figment> {
        match self.profile_variant(path) {
            Some(variant) if variant.exists() => {
                debug!(path = %variant.display(), "Loading profile-specific config");
                Self::merge_config_file(figment, &variant)
            }
            _ => Ok(figment),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(APP_DIR));
        }
        paths
    }

    /// Loads the first main file found in the search paths, with its
    /// profile variant.
    fn load_config_files(&self, figment: Figment) -> ConfigResult<Figment> {
        let mut names: Vec<&str> = Vec::new();
        #[cfg(feature = "toml-config")]
        names.push("botbot.toml");
        #[cfg(feature = "yaml-config")]
        names.extend(["botbot.yaml", "botbot.yml"]);

        for dir in self.resolve_search_paths() {
            for name in &names {
                let path = dir.join(name);
                if path.exists() {
                    let figment = self.merge_profile_variant(figment, &path)?;
                    info!(path = %path.display(), "Loading configuration file");
                    return Self::merge_config_file(figment, &path);
                }
            }
        }

        warn!("No configuration file found, using defaults");
        Ok(figment)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(all(test, feature = "toml-config"))]
mod tests {
    use super::*;
    use crate::config::{LogOutput, validate_config};
    #[cfg(feature = "redis-backend")]
    use crate::config::{KvBackendKind, QueueBackend};
    use figment::Jail;

    fn load(loader: ConfigLoader) -> figment::Result<BotbotConfig> {
        loader.load().map_err(|e| e.to_string().into())
    }

    const MAIN: &str = r##"
        [queue]
        pop_timeout_ms = 250

        [[chatbots]]
        id = 1
        nick = "botbot"
        server = "chat.freenode.net:6697"

        [[chatbots.channels]]
        id = 10
        name = "#test"
        slug = "test"

        [chatbots.channels.plugins.help]

        [chatbots.channels.plugins.brain]
        max_keys = 5
    "##;

    #[test]
    fn test_defaults_without_files() {
        Jail::expect_with(|jail| {
            let config = load(
                ConfigLoader::new()
                    .search_path(jail.directory())
                    .without_env(),
            )?;
            assert_eq!(config.logging.level, "info");
            assert_eq!(config.queue.pop_timeout_ms, 1000);
            assert_eq!(config.dispatch.handler_timeout(), None);
            assert!(config.chatbots.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_main_file_with_channels() {
        Jail::expect_with(|jail| {
            jail.create_file("botbot.toml", MAIN)?;
            let config = load(
                ConfigLoader::new()
                    .search_path(jail.directory())
                    .without_env(),
            )?;

            assert_eq!(config.queue.pop_timeout_ms, 250);
            let channel = &config.chatbots[0].channels[0];
            assert!(channel.is_public);
            assert_eq!(
                channel.plugins.keys().collect::<Vec<_>>(),
                ["brain", "help"]
            );
            assert_eq!(channel.plugins["brain"]["max_keys"], 5);
            Ok(())
        });
    }

    #[test]
    fn test_main_file_overrides_profile_file() {
        Jail::expect_with(|jail| {
            jail.create_file("botbot.toml", "[dispatch]\nhandler_timeout_ms = 100")?;
            jail.create_file(
                "botbot.production.toml",
                "[dispatch]\nhandler_timeout_ms = 900\nconfig_ttl_secs = 60",
            )?;
            let config = load(
                ConfigLoader::new()
                    .profile("prod")
                    .file(jail.directory().join("botbot.toml"))
                    .without_env(),
            )?;
            assert_eq!(config.dispatch.handler_timeout_ms, 100);
            assert_eq!(config.dispatch.config_ttl_secs, 60);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("botbot.toml", MAIN)?;
            jail.set_env("BOTBOT_QUEUE__POP_TIMEOUT_MS", "50");
            jail.set_env("BOTBOT_LOGGING__LEVEL", "debug");
            let config = load(ConfigLoader::new().search_path(jail.directory()))?;
            assert_eq!(config.queue.pop_timeout_ms, 50);
            assert_eq!(config.logging.level, "debug");
            Ok(())
        });
    }

    #[test]
    fn test_stdout_logging_rejected_with_stdio_queue() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "botbot.toml",
                r#"
                [logging]
                output = "stdout"
                "#,
            )?;
            let config = load(ConfigLoader::new().search_path(jail.directory()))?;
            assert_eq!(config.logging.output, LogOutput::Stdout);
            assert!(matches!(
                validate_config(&config),
                Err(ConfigError::ValidationError { .. })
            ));
            Ok(())
        });
    }

    #[cfg(feature = "redis-backend")]
    #[test]
    fn test_redis_backends_from_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "botbot.toml",
                r#"
                [logging]
                output = "stdout"

                [queue]
                backend = "redis"

                [storage]
                kv = "redis"
                "#,
            )?;
            jail.set_env("BOTBOT_QUEUE__URL", "redis://127.0.0.1/0");
            jail.set_env("BOTBOT_STORAGE__KV_URL", "redis://127.0.0.1/1");
            let config = load(ConfigLoader::new().search_path(jail.directory()))?;
            assert_eq!(config.queue.backend, QueueBackend::Redis);
            assert_eq!(config.queue.inbound_key, "q");
            assert_eq!(config.queue.outbound_key, "bot");
            assert_eq!(config.storage.kv, KvBackendKind::Redis);
            assert_eq!(config.storage.kv_url.as_deref(), Some("redis://127.0.0.1/1"));
            assert!(validate_config(&config).is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|jail| {
            let err = ConfigLoader::new()
                .file(jail.directory().join("nope.toml"))
                .without_env()
                .load()
                .unwrap_err();
            assert!(matches!(err, ConfigError::FileNotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging").as_str(), "staging");
    }
}
