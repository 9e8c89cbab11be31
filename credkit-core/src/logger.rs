use std::sync::{Arc, OnceLock};

/// Receives the log records produced by this crate.
///
/// Implemented by the host application and installed once with [`set_logger`].
///
/// # Examples
///
/// ```rust
/// use credkit_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
///
/// ## Kotlin
///
/// ```kotlin
/// object CredKitLogBridge : Logger {
///     override fun log(level: LogLevel, message: String) {
///         Log.println(level.toPriority(), "CredKit", message)
///     }
/// }
///
/// setLogger(CredKitLogBridge, LogLevel.INFO) // once, from Application.onCreate
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs `message` at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Debugging information, e.g. barrier bookkeeping.
    Debug,
    /// Request progress: selected plan, fallbacks, completion.
    Info,
    /// Discarded reports and backend failures.
    Warn,
    /// Conditions that make a backend unusable.
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::Trace,
            LogLevel::Debug => Self::Debug,
            LogLevel::Info => Self::Info,
            LogLevel::Warn => Self::Warn,
            LogLevel::Error => Self::Error,
        }
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

const CRATE_PREFIX: &str = "credkit_core";

/// Forwards `log` records to the installed [`Logger`], tagged with the component that
/// produced them.
struct ForeignLogger;

impl ForeignLogger {
    /// `orchestrator` for `credkit_core::orchestrator::cancellation`, `None` outside
    /// this crate.
    fn component(module_path: Option<&str>) -> Option<&str> {
        let rest = module_path?.strip_prefix(CRATE_PREFIX)?;
        let rest = rest.strip_prefix("::").unwrap_or(rest);
        Some(rest.split("::").next().filter(|name| !name.is_empty()).unwrap_or("core"))
    }
}

impl log::Log for ForeignLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let component = Self::component(record.module_path());
        // Dependencies only get through at info and above.
        if component.is_none() && record.level() > log::Level::Info {
            return;
        }

        let message = match component {
            Some(component) => format!("[{component}] {}", record.args()),
            None => format!("[{}] {}", record.target(), record.args()),
        };
        match LOGGER_INSTANCE.get() {
            Some(logger) => logger.log(record.level().into(), message),
            None => eprintln!("credkit logger not set: {message}"),
        }
    }

    fn flush(&self) {}
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();
static FOREIGN_LOGGER: ForeignLogger = ForeignLogger;

/// Installs `logger` as the destination of every log record at `max_level` or above.
///
/// Only the first call installs a logger; later calls only apply `max_level`.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>, max_level: LogLevel) {
    log::set_max_level(max_level.into());
    if LOGGER_INSTANCE.set(logger).is_err() {
        log::info!("logger already installed, keeping it");
        return;
    }
    if let Err(e) = log::set_logger(&FOREIGN_LOGGER) {
        eprintln!("credkit could not install its logger: {e}");
    }
}

/// Changes the most verbose level forwarded to the installed [`Logger`].
///
/// Hosts typically raise it to [`LogLevel::Debug`] while diagnosing backend arbitration
/// and lower it again afterwards.
#[uniffi::export]
pub fn set_log_level(max_level: LogLevel) {
    log::set_max_level(max_level.into());
}
