use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;

use log::Level;
use once_cell::sync::Lazy;
use time::format_description::FormatItem;
use time::OffsetDateTime;
use yansi::Paint;

use crate::page::LoggerPage;

static TIMESTAMP_FORMAT: Lazy<Vec<FormatItem<'static>>> = Lazy::new(|| {
    time::format_description::parse(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3] +00:00",
    )
    .expect("timestamp format description")
});

fn format_timestamp(time: OffsetDateTime) -> String {
    time.format(&*TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| String::from("-"))
}

/// Destination for drained logger pages. Sinks run on the drain thread
/// only, so they are free to block on I/O.
pub trait LogSink: Send {
    fn write(&mut self, page: &LoggerPage);

    fn flush(&mut self) {}
}

/// Writes colored records to stdout.
pub struct ConsoleSink {
    stdout: Stdout,
    color: bool,
}

impl ConsoleSink {
    pub fn new(color: bool) -> Self {
        ConsoleSink {
            stdout: io::stdout(),
            color,
        }
    }

    fn level_text(&self, level: Level) -> String {
        if !self.color {
            return level.to_string();
        }
        match level {
            Level::Error => Paint::red(level).bold().to_string(),
            Level::Warn => Paint::yellow(level).to_string(),
            Level::Info => Paint::green(level).to_string(),
            Level::Debug => Paint::cyan(level).to_string(),
            Level::Trace => Paint::blue(level).to_string(),
        }
    }
}

impl LogSink for ConsoleSink {
    fn write(&mut self, page: &LoggerPage) {
        let mut lock = self.stdout.lock();
        let _ = writeln!(
            lock,
            "{} {} {} {}  {}",
            format_timestamp(page.time),
            page.thread.as_str(),
            self.level_text(page.level),
            page.target.as_str(),
            page.text.as_str(),
        );
    }

    fn flush(&mut self) {
        let _ = self.stdout.lock().flush();
    }
}

/// Appends plain-text records to a file.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        Ok(FileSink {
            writer: BufWriter::new(file),
        })
    }
}

impl LogSink for FileSink {
    fn write(&mut self, page: &LoggerPage) {
        let _ = writeln!(
            self.writer,
            "{} {} {} {}  {}",
            format_timestamp(page.time),
            page.thread.as_str(),
            page.level,
            page.target.as_str(),
            page.text.as_str(),
        );
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}
