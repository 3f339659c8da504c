//! Configuration validation.

use std::collections::HashSet;

use botbot_core::is_channel_name;

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    BotbotConfig, ChatBotConfig, KvBackendKind, LogOutput, LoggingConfig, QueueBackend,
    QueueConfig, StorageConfig,
};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Checks the loaded configuration before anything is started.
pub fn validate_config(config: &BotbotConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_queue(&config.queue)?;
    validate_storage(&config.storage)?;

    if config.logging.output == LogOutput::Stdout && config.queue.backend == QueueBackend::Stdio {
        return Err(ConfigError::validation(
            "logging.output = \"stdout\" would interleave log lines with outbound commands \
             of the stdio queue",
        ));
    }

    validate_chatbots(&config.chatbots)
}

fn validate_queue(queue: &QueueConfig) -> ConfigResult<()> {
    if queue.pop_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "queue.pop_timeout_ms must be greater than 0",
        ));
    }
    match queue.backend {
        QueueBackend::Stdio => Ok(()),
        #[cfg(feature = "redis-backend")]
        QueueBackend::Redis => {
            require_url(queue.url.as_deref(), "queue.url")?;
            if queue.inbound_key.is_empty() || queue.outbound_key.is_empty() {
                return Err(ConfigError::validation("queue list keys must not be empty"));
            }
            Ok(())
        }
    }
}

fn validate_storage(storage: &StorageConfig) -> ConfigResult<()> {
    match storage.kv {
        KvBackendKind::Memory => Ok(()),
        #[cfg(feature = "redis-backend")]
        KvBackendKind::Redis => require_url(storage.kv_url.as_deref(), "storage.kv_url"),
    }
}

#[cfg(feature = "redis-backend")]
fn require_url(url: Option<&str>, field: &str) -> ConfigResult<()> {
    match url {
        Some(url) if !url.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::missing_field(field)),
    }
}

fn validate_level(level: &str, field: &str) -> ConfigResult<()> {
    if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ConfigError::validation(format!(
            "invalid log level '{level}' for {field}, expected one of {LOG_LEVELS:?}"
        )))
    }
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    validate_level(&logging.level, "logging.level")?;
    for (target, level) in &logging.filters {
        validate_level(level, &format!("logging.filters.{target}"))?;
    }
    Ok(())
}

fn validate_chatbots(chatbots: &[ChatBotConfig]) -> ConfigResult<()> {
    let mut chatbot_ids = HashSet::new();
    let mut channel_ids = HashSet::new();

    for chatbot in chatbots {
        if !chatbot_ids.insert(chatbot.id) {
            return Err(ConfigError::DuplicateChatBotId(chatbot.id));
        }
        if chatbot.nick.trim().is_empty() {
            return Err(ConfigError::missing_field(format!(
                "chatbots[{}].nick",
                chatbot.id
            )));
        }
        if chatbot.server.trim().is_empty() {
            return Err(ConfigError::missing_field(format!(
                "chatbots[{}].server",
                chatbot.id
            )));
        }

        for channel in &chatbot.channels {
            if !channel_ids.insert(channel.id) {
                return Err(ConfigError::DuplicateChannelId(channel.id));
            }
            if !is_channel_name(&channel.name) {
                return Err(ConfigError::validation(format!(
                    "channel {} name '{}' does not start with a channel prefix",
                    channel.id, channel.name
                )));
            }
        }
    }
    Ok(())
}
