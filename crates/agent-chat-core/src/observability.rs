use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENABLED_VAR: &str = "AGENT_CHAT_OBSERVABILITY";
const LEVEL_VAR: &str = "AGENT_CHAT_LOG_LEVEL";
const JSON_PATH_VAR: &str = "AGENT_CHAT_JSON_LOG_PATH";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn observability_enabled() -> bool {
    std::env::var(ENABLED_VAR)
        .map(|value| parse_bool_env(&value).unwrap_or(true))
        .unwrap_or(true)
}

fn resolve_env_filter(default_level: &str) -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var(LEVEL_VAR)
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
}

/// Where log records go.
#[derive(Debug, PartialEq, Eq)]
enum LogSink {
    /// JSON lines appended to `dir/file_name`.
    JsonFile { dir: PathBuf, file_name: String },
    /// Compact human-readable lines on stderr.
    Console,
}

fn resolve_sink(json_path: Option<&str>) -> LogSink {
    let Some(raw) = json_path.map(str::trim).filter(|p| !p.is_empty()) else {
        return LogSink::Console;
    };
    let path = Path::new(raw);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("agent-chat.logs.jsonl")
        .to_string();
    LogSink::JsonFile { dir, file_name }
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `AGENT_CHAT_OBSERVABILITY`: optional enable/disable flag (default enabled).
/// - `AGENT_CHAT_LOG_LEVEL`: optional level/filter override (`info`, `debug`, etc.).
/// - `AGENT_CHAT_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs go to stderr in a compact console format so stdout stays free
///   for conversation output.
/// - `RUST_LOG`: optional filter override.
///
/// `default_level` applies when neither filter variable is set.
pub fn init_observability(default_level: &str) {
    INIT.get_or_init(|| {
        if !observability_enabled() {
            return;
        }

        let env_filter = resolve_env_filter(default_level);
        let filter_text = env_filter.to_string();
        let sink = resolve_sink(std::env::var(JSON_PATH_VAR).ok().as_deref());
        let installed = match &sink {
            LogSink::JsonFile { dir, file_name } => {
                let _ = std::fs::create_dir_all(dir);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(writer);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init()
            }
            LogSink::Console => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init()
            }
        };
        match installed {
            Ok(()) => tracing::debug!(?sink, filter = %filter_text, "logging initialized"),
            // Another subscriber is already installed; keep it.
            Err(e) => tracing::debug!(error = %e, "logging left to existing subscriber"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_boolean_spellings() {
        assert_eq!(parse_bool_env(" On "), Some(true));
        assert_eq!(parse_bool_env("disabled"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn json_path_selects_file_sink_in_its_directory() {
        assert_eq!(
            resolve_sink(Some("logs/chat.jsonl")),
            LogSink::JsonFile {
                dir: PathBuf::from("logs"),
                file_name: "chat.jsonl".into(),
            }
        );
        assert_eq!(
            resolve_sink(Some("chat.jsonl")),
            LogSink::JsonFile {
                dir: PathBuf::from("."),
                file_name: "chat.jsonl".into(),
            }
        );
    }

    #[test]
    fn missing_or_blank_path_selects_console() {
        assert_eq!(resolve_sink(None), LogSink::Console);
        assert_eq!(resolve_sink(Some("  ")), LogSink::Console);
    }

    #[test]
    fn init_is_idempotent() {
        init_observability("warn");
        init_observability("debug");
    }
}
