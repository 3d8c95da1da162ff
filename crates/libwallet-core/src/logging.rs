//! File logging for a session.
//!
//! The process has one global `tracing` subscriber, installed the first
//! time a sink is initialized. Its writer is a switch over a stack of
//! targets: each [`FileLogSink`] pushes its own rolling file and removes
//! only that entry on close, so a sink that is opened and dropped while
//! another is live hands output back to the earlier one.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::lock;

pub const LOG_FILE_PREFIX: &str = "dcrlibwallet";
pub const LOG_FILE_SUFFIX: &str = "log";

// ==============================================================================
// Configuration
// ==============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Hourly,
    #[default]
    Daily,
}

impl LogRotation {
    fn as_rotation(self) -> Rotation {
        match self {
            Self::Never => Rotation::NEVER,
            Self::Hourly => Rotation::HOURLY,
            Self::Daily => Rotation::DAILY,
        }
    }
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            other => Err(format!("unknown log rotation {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub rotation: LogRotation,
    /// Rotated files kept on disk. Ignored with [`LogRotation::Never`].
    pub max_log_files: usize,
    /// Also write every event to stderr.
    pub mirror_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            rotation: LogRotation::Daily,
            max_log_files: 3,
            mirror_stderr: false,
        }
    }
}

// ==============================================================================
// Global Subscriber
// ==============================================================================

struct Target {
    generation: u64,
    file: NonBlocking,
    mirror_stderr: bool,
}

#[derive(Clone, Default)]
struct SwitchWriter {
    // Last entry receives output.
    targets: Arc<Mutex<Vec<Target>>>,
}

struct SinkWriter {
    file: Option<NonBlocking>,
    mirror_stderr: bool,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        if self.mirror_stderr {
            io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SwitchWriter {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        let targets = lock(&self.targets);
        let target = targets.last();
        SinkWriter {
            file: target.map(|t| t.file.clone()),
            mirror_stderr: target.is_some_and(|t| t.mirror_stderr),
        }
    }
}

struct Dispatch {
    writer: SwitchWriter,
    filter: reload::Handle<EnvFilter, Registry>,
}

static DISPATCH: OnceLock<Dispatch> = OnceLock::new();
static GENERATION: AtomicU64 = AtomicU64::new(0);

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn dispatch(level: &str) -> &'static Dispatch {
    DISPATCH.get_or_init(|| {
        let writer = SwitchWriter::default();
        let (filter, handle) = reload::Layer::new(env_filter(level));
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer.clone()),
            )
            .try_init();
        if installed.is_err() {
            // Someone else owns the global subscriber; files stay empty.
            tracing::debug!("global subscriber already set, file logging inactive");
        }
        Dispatch {
            writer,
            filter: handle,
        }
    })
}

// ==============================================================================
// Log Sink
// ==============================================================================

/// A log destination the session owns and closes during teardown.
pub trait LogSink: Send {
    /// Flush and detach. Closing twice is a no-op.
    fn close(&mut self) -> io::Result<()>;
}

/// Rolling file output under a session's data directory.
pub struct FileLogSink {
    generation: u64,
    guard: Option<WorkerGuard>,
}

impl FileLogSink {
    /// Start writing to `<data_dir>/dcrlibwallet.<date>.log`, or to
    /// `<data_dir>/dcrlibwallet.log` with rotation disabled. Output moves
    /// away from any earlier sink until this one closes.
    pub fn init(data_dir: &Path, config: &LogConfig) -> io::Result<Self> {
        let appender = RollingFileAppender::builder()
            .rotation(config.rotation.as_rotation())
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix(LOG_FILE_SUFFIX)
            .max_log_files(config.max_log_files.max(1))
            .build(data_dir)
            .map_err(io::Error::other)?;
        let (file, guard) = tracing_appender::non_blocking(appender);

        let dispatch = dispatch(&config.level);
        if let Err(e) = dispatch.filter.reload(env_filter(&config.level)) {
            tracing::debug!(error = %e, "log filter not reloaded");
        }

        let generation = GENERATION.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&dispatch.writer.targets).push(Target {
            generation,
            file,
            mirror_stderr: config.mirror_stderr,
        });

        tracing::debug!(directory = %data_dir.display(), ?config.rotation, "log sink initialized");
        Ok(Self {
            generation,
            guard: Some(guard),
        })
    }

    /// Path of the active file when rotation is disabled.
    pub fn unrotated_path(data_dir: &Path) -> PathBuf {
        data_dir.join(format!("{LOG_FILE_PREFIX}.{LOG_FILE_SUFFIX}"))
    }

    /// Log files under `data_dir`, rotated ones included, sorted by name.
    pub fn log_files(data_dir: &Path) -> io::Result<Vec<PathBuf>> {
        let prefix = format!("{LOG_FILE_PREFIX}.");
        let suffix = format!(".{LOG_FILE_SUFFIX}");
        let mut files = Vec::new();
        for entry in std::fs::read_dir(data_dir)? {
            let path = entry?.path();
            let is_log = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(&suffix));
            if is_log {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Whether events are currently written to this sink's file.
    pub fn is_active(&self) -> bool {
        DISPATCH.get().is_some_and(|d| {
            lock(&d.writer.targets)
                .last()
                .is_some_and(|t| t.generation == self.generation)
        })
    }
}

impl LogSink for FileLogSink {
    fn close(&mut self) -> io::Result<()> {
        let Some(guard) = self.guard.take() else {
            return Ok(());
        };
        if let Some(dispatch) = DISPATCH.get() {
            lock(&dispatch.writer.targets).retain(|t| t.generation != self.generation);
        }
        drop(guard);
        Ok(())
    }
}

impl Drop for FileLogSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The writer switch is process-global.
    static SERIAL: Mutex<()> = Mutex::new(());

    fn read_logs(dir: &Path) -> String {
        FileLogSink::log_files(dir)
            .expect("list logs")
            .iter()
            .map(|path| std::fs::read_to_string(path).expect("read log"))
            .collect()
    }

    #[test]
    fn writes_to_data_dir_and_detaches_on_close() {
        let _serial = lock(&SERIAL);
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LogConfig {
            rotation: LogRotation::Never,
            ..LogConfig::default()
        };
        let mut sink = FileLogSink::init(dir.path(), &config).expect("init");
        assert!(sink.is_active());
        assert!(FileLogSink::unrotated_path(dir.path()).exists());

        tracing::info!("logging-test-marker");
        sink.close().expect("close");
        assert!(!sink.is_active());
        sink.close().expect("second close is a no-op");

        let contents =
            std::fs::read_to_string(FileLogSink::unrotated_path(dir.path())).expect("read log");
        assert!(contents.contains("logging-test-marker"));
    }

    #[test]
    fn default_config_rotates_daily_under_the_wallet_prefix() {
        let _serial = lock(&SERIAL);
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = FileLogSink::init(dir.path(), &LogConfig::default()).expect("init");
        sink.close().expect("close");

        let files = FileLogSink::log_files(dir.path()).expect("list logs");
        assert_eq!(files.len(), 1, "{files:?}");
        let name = files[0].file_name().and_then(|n| n.to_str()).expect("utf-8 name");
        assert!(name.starts_with("dcrlibwallet.") && name.ends_with(".log"), "{name}");
        assert!(!FileLogSink::unrotated_path(dir.path()).exists());
    }

    #[test]
    fn closing_stale_sink_keeps_newer_target() {
        let _serial = lock(&SERIAL);
        let first_dir = tempfile::tempdir().expect("tempdir");
        let second_dir = tempfile::tempdir().expect("tempdir");

        let mut first = FileLogSink::init(first_dir.path(), &LogConfig::default()).expect("init");
        let mut second =
            FileLogSink::init(second_dir.path(), &LogConfig::default()).expect("init");
        assert!(!first.is_active());

        first.close().expect("close stale");
        assert!(second.is_active());
        second.close().expect("close");
        assert!(!second.is_active());
    }

    #[test]
    fn closing_newer_sink_hands_output_back() {
        let _serial = lock(&SERIAL);
        let first_dir = tempfile::tempdir().expect("tempdir");
        let second_dir = tempfile::tempdir().expect("tempdir");

        let mut first = FileLogSink::init(first_dir.path(), &LogConfig::default()).expect("init");
        let mut second =
            FileLogSink::init(second_dir.path(), &LogConfig::default()).expect("init");
        second.close().expect("close newer");
        assert!(first.is_active());

        tracing::info!("handed-back-marker");
        first.close().expect("close");
        assert!(read_logs(first_dir.path()).contains("handed-back-marker"));
        assert!(!read_logs(second_dir.path()).contains("handed-back-marker"));
    }

    #[test]
    fn rotation_parses_case_insensitively() {
        assert_eq!("Daily".parse::<LogRotation>(), Ok(LogRotation::Daily));
        assert_eq!("never".parse::<LogRotation>(), Ok(LogRotation::Never));
        assert!("weekly".parse::<LogRotation>().is_err());
    }
}
