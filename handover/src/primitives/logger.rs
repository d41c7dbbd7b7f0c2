use std::cell::RefCell;
use std::future::Future;
use std::{sync::Arc, sync::OnceLock};

thread_local! {
    static THREAD_LOG_CONTEXT: RefCell<Option<String>> = const { RefCell::new(None) };
}

tokio::task_local! {
    /// Task-local logging context. Set per pair by the batch runner so that the prefix
    /// survives `.await` points on a multi-threaded runtime.
    pub static LOG_CONTEXT: RefCell<Option<String>>;
}

const ROOT_CONTEXT: &str = "[Handover]";

/// Trait representing a logger that can log messages at various levels.
///
/// Implemented by the presentation layer (desktop log pane, mobile console, file sink).
/// It is exported via `UniFFI` for use in foreign languages.
///
/// # Examples
///
/// ```rust
/// use handover::primitives::logger::{LogLevel, Logger};
///
/// struct StdoutLogger;
///
/// impl Logger for StdoutLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         println!("[{:?}] {}", level, message);
///     }
/// }
/// ```
///
/// ## Kotlin
///
/// ```kotlin
/// class LogPaneBridge(private val pane: LogPane) : Logger {
///     override fun log(level: LogLevel, message: String) = pane.append(level.name, message)
/// }
///
/// setLogger(LogPaneBridge(pane)) // call once at startup
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    ///
    /// # Arguments
    ///
    /// * `level` - The severity level of the log message.
    /// * `message` - The log message to be recorded.
    fn log(&self, level: LogLevel, message: String);
}

/// Enumeration of possible log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Designates very low priority, often extremely detailed messages.
    Trace,
    /// Designates lower priority debugging information.
    Debug,
    /// Designates informational messages that highlight the progress of the run.
    Info,
    /// Designates potentially harmful situations.
    Warn,
    /// Designates error events that might still allow the run to continue.
    Error,
}

/// Forwards `log` records to the user-provided [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let is_record_from_handover = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("handover"));

        let is_debug_or_trace_level =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;

        // Dependencies (reqwest, hyper) are chatty at debug level
        if is_debug_or_trace_level && !is_record_from_handover {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

/// The logger provided by the host application.
static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Sets the global logger.
///
/// Should be called once, before the first run. Later calls are ignored with a notice on
/// stderr, as is a call made after another `log` implementation was installed.
#[allow(clippy::module_name_repetitions)]
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
        return;
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to install handover logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

/// Logs a trace-level message with automatic context prefixing
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::trace!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::trace!($($arg)*)
        }
    };
}

/// Logs a debug-level message with automatic context prefixing
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::debug!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::debug!($($arg)*)
        }
    };
}

/// Logs an info-level message with automatic context prefixing
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::info!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::info!($($arg)*)
        }
    };
}

/// Logs a warning-level message with automatic context prefixing
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::warn!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::warn!($($arg)*)
        }
    };
}

/// Logs an error-level message with automatic context prefixing
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::error!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::error!($($arg)*)
        }
    };
}

/// Tracks which backing storage a [`LogContext`] used, so `Drop` restores the correct one.
enum LogContextStorage {
    TaskLocal,
    ThreadLocal,
}

/// A scope guard that appends a segment to the logging context and restores the previous
/// context when dropped.
///
/// Contexts nest: inside a pair scope `[Handover][alice->bob]`, a migrator scope becomes
/// `[Handover][alice->bob][Groups]`.
///
/// # Examples
///
/// ```rust
/// use handover::primitives::logger::LogContext;
///
/// {
///     let _handover_logger_ctx = LogContext::new("Groups");
///     handover::info!("This will be prefixed with [Handover][Groups]");
/// } // Context restored here
/// ```
pub struct LogContext {
    previous: Option<String>,
    storage: LogContextStorage,
}

impl LogContext {
    /// Creates a new logging context scope.
    ///
    /// The context will be active until this `LogContext` is dropped.
    #[must_use]
    pub fn new(module: &str) -> Self {
        let extend = |prev: Option<&String>| {
            Some(format!(
                "{}[{module}]",
                prev.map_or(ROOT_CONTEXT, String::as_str)
            ))
        };

        // task_local survives .await points; thread_local covers sync callers
        match LOG_CONTEXT.try_with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            let prev = ctx.clone();
            *ctx = extend(prev.as_ref());
            prev
        }) {
            Ok(previous) => Self {
                previous,
                storage: LogContextStorage::TaskLocal,
            },
            Err(_) => {
                let previous = THREAD_LOG_CONTEXT.with(|ctx| {
                    let mut ctx = ctx.borrow_mut();
                    let prev = ctx.clone();
                    *ctx = extend(prev.as_ref());
                    prev
                });
                Self {
                    previous,
                    storage: LogContextStorage::ThreadLocal,
                }
            }
        }
    }
}

impl Drop for LogContext {
    fn drop(&mut self) {
        match self.storage {
            LogContextStorage::TaskLocal => {
                let _ = LOG_CONTEXT.try_with(|ctx| {
                    (*ctx.borrow_mut()).clone_from(&self.previous);
                });
            }
            LogContextStorage::ThreadLocal => {
                THREAD_LOG_CONTEXT.with(|ctx| {
                    (*ctx.borrow_mut()).clone_from(&self.previous);
                });
            }
        }
    }
}

/// Gets the current logging context, if any.
#[must_use]
pub fn get_context() -> Option<String> {
    LOG_CONTEXT
        .try_with(|ctx| ctx.borrow().clone())
        .unwrap_or_else(|_| THREAD_LOG_CONTEXT.with(|ctx| ctx.borrow().clone()))
}

/// Runs `future` with its own task-local logging context, seeded from the caller's.
///
/// Contexts created inside the future stay attached to it even when the runtime moves
/// it between threads.
pub async fn with_task_context<F: Future>(future: F) -> F::Output {
    LOG_CONTEXT.scope(RefCell::new(get_context()), future).await
}

/// Sets a logging context for the current scope.
///
/// # Examples
///
/// ```rust
/// use handover::set_log_context;
///
/// let _handover_logger_ctx = set_log_context!("Issues");
/// handover::info!("This will be prefixed with [Handover][Issues]");
/// ```
#[macro_export]
macro_rules! set_log_context {
    ($module:expr) => {
        $crate::primitives::logger::LogContext::new($module)
    };
}
