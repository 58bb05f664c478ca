//! Logging bootstrap.
//!
//! # Responsibility
//! - Start file-based rolling logs exactly once per process.
//!
//! # Invariants
//! - Repeated initialization with the same settings is a no-op;
//!   conflicting settings are rejected, never applied.
//! - Initialization never panics; failures come back as strings.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_BASENAME: &str = "findby";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEPT_LOG_FILES: usize = 5;
const PANIC_SUMMARY_CHARS: usize = 160;

static ACTIVE: OnceCell<ActiveLogging> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Validated logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    level: &'static str,
    directory: PathBuf,
}

impl LogSettings {
    /// Validates a level string and an absolute log directory.
    ///
    /// # Errors
    /// - Unsupported level names.
    /// - Empty or relative directory paths.
    pub fn new(level: &str, directory: &str) -> Result<Self, String> {
        let level = match level.trim().to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" => "error",
            other => {
                return Err(format!(
                    "unsupported log level `{other}`; expected trace|debug|info|warn|error"
                ));
            }
        };

        let trimmed = directory.trim();
        if trimmed.is_empty() {
            return Err("log directory cannot be empty".to_string());
        }
        let path = Path::new(trimmed);
        if !path.is_absolute() {
            return Err(format!("log directory must be absolute, got `{trimmed}`"));
        }

        Ok(Self {
            level,
            directory: path.to_path_buf(),
        })
    }

    pub fn level(&self) -> &'static str {
        self.level
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

struct ActiveLogging {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Starts rolling file logging.
///
/// The first successful call wins for the whole process. Later calls
/// with equal settings succeed quietly; later calls with different
/// settings fail without touching the active logger.
///
/// # Errors
/// - Invalid settings, an uncreatable directory, or backend startup
///   failure, all as human-readable strings.
pub fn init_logging(level: &str, directory: &str) -> Result<(), String> {
    let settings = LogSettings::new(level, directory)?;

    let active = ACTIVE.get_or_try_init(|| start(settings.clone()))?;
    if active.settings != settings {
        return Err(format!(
            "logging already active with level `{}` at `{}`; refusing to switch",
            active.settings.level,
            active.settings.directory.display()
        ));
    }
    Ok(())
}

/// Settings of the active logger, or `None` before initialization.
pub fn logging_settings() -> Option<&'static LogSettings> {
    ACTIVE.get().map(|active| &active.settings)
}

/// Default level per build mode: `debug` for debug builds, `info`
/// otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start(settings: LogSettings) -> Result<ActiveLogging, String> {
    std::fs::create_dir_all(&settings.directory).map_err(|err| {
        format!(
            "cannot create log directory `{}`: {err}",
            settings.directory.display()
        )
    })?;

    let handle = Logger::try_with_str(settings.level)
        .map_err(|err| format!("invalid log level `{}`: {err}", settings.level))?
        .log_to_file(
            FileSpec::default()
                .directory(&settings.directory)
                .basename(LOG_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEPT_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("cannot start logger: {err}"))?;

    install_panic_hook();

    info!(
        "event=logging_init module=logging status=ok level={} dir={} version={}",
        settings.level,
        settings.directory.display(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogging {
        settings,
        _handle: handle,
    })
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(
            "event=panic_captured module=logging status=error location={location} payload={}",
            panic_summary(panic_info)
        );
        previous(panic_info);
    }));
}

/// One line, capped length; panic payloads can carry caller text.
fn panic_summary(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };

    let flattened = payload.replace(['\n', '\r'], " ");
    let mut summary: String = flattened.chars().take(PANIC_SUMMARY_CHARS).collect();
    if flattened.chars().count() > PANIC_SUMMARY_CHARS {
        summary.push_str("...");
    }
    summary
}
