//! Logger service draining a lock-free page pool into console and file sinks.
//!
//! Producers never block: emitting a record costs a level-filter check, a
//! pool pop, a copy into the page and a channel send. When the pool is
//! exhausted the record is dropped and a monotonic counter advances. A
//! single drain thread owns the sinks and recycles pages after writing.

mod page;
mod pool;
mod sink;

pub use page::{LoggerPage, MAX_LOG_MESSAGE_SIZE};
pub use pool::PagePool;
pub use sink::{ConsoleSink, FileSink, LogSink};

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use env_logger::filter::{Builder as FilterBuilder, Filter};
use log::{Log, Metadata, Record};
use once_cell::sync::OnceCell;
use reflex_channel::{oneshot, unbounded, Receiver, Sender};

/// Default number of preallocated pages.
pub const DEFAULT_POOL_SIZE: usize = 1024;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Logger service configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// `env_logger`-style filter string, e.g. `info,reflex_scheduler=debug`.
    pub filter: Option<String>,
    pub log_to_stdout: bool,
    pub log_to_file: bool,
    pub color: bool,
    pub log_dir: PathBuf,
    pub file: PathBuf,
    /// Number of preallocated pages in circulation.
    pub pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            filter: None,
            log_to_stdout: true,
            log_to_file: false,
            color: true,
            log_dir: PathBuf::from("."),
            file: PathBuf::from("reflex.log"),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

enum LogEvent {
    Record(Box<LoggerPage>),
    Flush(oneshot::Sender<()>),
    Terminate,
}

/// Producer-side handle. Implements [`log::Log`]; cheap to clone.
#[derive(Clone)]
pub struct LoggerHandle {
    filter: Arc<Filter>,
    pool: Arc<PagePool>,
    tx: Sender<LogEvent>,
    delivered: Arc<AtomicU64>,
}

impl LoggerHandle {
    /// Number of records written to the sinks so far.
    pub fn delivered_records(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of records lost to pool exhaustion so far. Monotonic.
    pub fn dropped_records(&self) -> u64 {
        self.pool.dropped()
    }
}

impl Log for LoggerHandle {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.filter.matches(record) {
            return;
        }
        let Some(mut page) = self.pool.take() else {
            return;
        };
        page.fill(record);
        if self.tx.send(LogEvent::Record(page)).is_err() {
            // service already terminated
        }
    }

    fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(LogEvent::Flush(tx)).is_ok() {
            let _ = rx.recv_timeout(FLUSH_TIMEOUT);
        }
    }
}

/// A running logger service and its drain thread.
pub struct LoggerService {
    handle: LoggerHandle,
    drain: Option<JoinHandle<()>>,
}

impl LoggerService {
    /// Starts a service with sinks derived from the configuration.
    pub fn start(config: Config) -> Result<LoggerService, String> {
        let mut sinks: Vec<Box<dyn LogSink>> = Vec::new();
        if config.log_to_stdout {
            sinks.push(Box::new(ConsoleSink::new(config.color)));
        }
        if config.log_to_file {
            let path = config.log_dir.join(&config.file);
            let file =
                FileSink::open(&path).map_err(|e| format!("open {}: {e}", path.display()))?;
            sinks.push(Box::new(file));
        }
        Ok(Self::start_with_sinks(&config, sinks))
    }

    /// Starts a service draining into caller-supplied sinks.
    pub fn start_with_sinks(config: &Config, sinks: Vec<Box<dyn LogSink>>) -> LoggerService {
        let filter = build_filter(config.filter.as_deref());
        let pool = Arc::new(PagePool::new(config.pool_size.max(1)));
        let delivered = Arc::new(AtomicU64::new(0));
        let (tx, rx) = unbounded();

        let handle = LoggerHandle {
            filter: Arc::new(filter),
            pool: Arc::clone(&pool),
            tx,
            delivered: Arc::clone(&delivered),
        };

        let drain = thread::Builder::new()
            .name("LoggerService".into())
            .spawn(move || drain_loop(rx, sinks, pool, delivered))
            .expect("start logger drain thread should ok");

        LoggerService {
            handle,
            drain: Some(drain),
        }
    }

    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    /// Flushes the sinks and stops the drain thread.
    pub fn shutdown(mut self) {
        self.terminate();
    }

    fn terminate(&mut self) {
        if let Some(drain) = self.drain.take() {
            let _ = self.handle.tx.send(LogEvent::Terminate);
            let _ = drain.join();
        }
    }
}

impl Drop for LoggerService {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn build_filter(spec: Option<&str>) -> Filter {
    let mut builder = FilterBuilder::new();
    match spec {
        Some(spec) if !spec.is_empty() => builder.parse(spec),
        _ => builder.parse("info"),
    };
    builder.build()
}

fn drain_loop(
    rx: Receiver<LogEvent>,
    mut sinks: Vec<Box<dyn LogSink>>,
    pool: Arc<PagePool>,
    delivered: Arc<AtomicU64>,
) {
    loop {
        match rx.recv() {
            Ok(LogEvent::Record(page)) => {
                for sink in sinks.iter_mut() {
                    sink.write(&page);
                }
                delivered.fetch_add(1, Ordering::Relaxed);
                pool.give(page);
            }
            Ok(LogEvent::Flush(reply)) => {
                for sink in sinks.iter_mut() {
                    sink.flush();
                }
                let _ = reply.send(());
            }
            Ok(LogEvent::Terminate) | Err(_) => break,
        }
    }
    // drain whatever is still queued before exiting
    while let Ok(LogEvent::Record(page)) = rx.try_recv() {
        for sink in sinks.iter_mut() {
            sink.write(&page);
        }
        delivered.fetch_add(1, Ordering::Relaxed);
        pool.give(page);
    }
    for sink in sinks.iter_mut() {
        sink.flush();
    }
}

static GLOBAL_SERVICE: OnceCell<LoggerHandle> = OnceCell::new();

/// Keeps the global logger service alive; flushes and stops it on drop.
pub struct LoggerInitGuard {
    service: Option<LoggerService>,
}

impl Drop for LoggerInitGuard {
    fn drop(&mut self) {
        if let Some(service) = self.service.take() {
            service.handle().flush();
            service.shutdown();
        }
    }
}

/// Installs the logger service as the `log` facade backend.
///
/// Can only succeed once per process.
pub fn init(config: Config) -> Result<LoggerInitGuard, String> {
    let service = LoggerService::start(config)?;
    let handle = service.handle();
    let max_level = handle.filter.filter();
    GLOBAL_SERVICE
        .set(handle.clone())
        .map_err(|_| String::from("logger service is already initialised"))?;
    log::set_boxed_logger(Box::new(handle)).map_err(|e| e.to_string())?;
    log::set_max_level(max_level);
    Ok(LoggerInitGuard {
        service: Some(service),
    })
}

/// Installs a logger that filters everything out. For tools that must stay
/// quiet on stdout.
pub fn init_silent() -> Result<LoggerInitGuard, String> {
    init(Config {
        filter: Some("off".into()),
        log_to_stdout: false,
        log_to_file: false,
        ..Config::default()
    })
}

/// Records lost to pool exhaustion by the globally installed service.
pub fn dropped_records() -> u64 {
    GLOBAL_SERVICE
        .get()
        .map(LoggerHandle::dropped_records)
        .unwrap_or(0)
}
