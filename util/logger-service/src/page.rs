use std::fmt::{self, Write as _};

use log::{Level, Record};
use time::OffsetDateTime;

/// Capacity of the formatted message text inside a page.
pub const MAX_LOG_MESSAGE_SIZE: usize = 512;

const MAX_TARGET_SIZE: usize = 64;
const MAX_THREAD_NAME_SIZE: usize = 32;

/// Fixed-capacity text buffer. Writes beyond the capacity are silently
/// truncated so that filling a page can never allocate or fail.
#[derive(Debug)]
pub struct FixedText<const N: usize> {
    len: usize,
    buf: [u8; N],
}

impl<const N: usize> FixedText<N> {
    fn new() -> Self {
        FixedText { len: 0, buf: [0; N] }
    }

    fn clear(&mut self) {
        self.len = 0;
    }

    pub fn as_str(&self) -> &str {
        // only whole UTF-8 sequences are ever copied in
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or("<invalid utf-8>")
    }
}

impl<const N: usize> fmt::Write for FixedText<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.len;
        let take = if s.len() <= room {
            s.len()
        } else {
            // back off to a char boundary
            let mut end = room;
            while end > 0 && !s.is_char_boundary(end) {
                end -= 1;
            }
            end
        };
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// One preallocated log record. Pages are acquired from the pool on the
/// producer side, filled without allocating, and recycled by the drain
/// thread after the sinks have seen them.
#[derive(Debug)]
pub struct LoggerPage {
    pub level: Level,
    pub time: OffsetDateTime,
    pub thread: FixedText<MAX_THREAD_NAME_SIZE>,
    pub target: FixedText<MAX_TARGET_SIZE>,
    pub text: FixedText<MAX_LOG_MESSAGE_SIZE>,
}

impl LoggerPage {
    pub fn new() -> Self {
        LoggerPage {
            level: Level::Info,
            time: OffsetDateTime::UNIX_EPOCH,
            thread: FixedText::new(),
            target: FixedText::new(),
            text: FixedText::new(),
        }
    }

    /// Fills the page from a `log` record. Truncates oversized fields.
    pub fn fill(&mut self, record: &Record) {
        self.level = record.level();
        self.time = OffsetDateTime::now_utc();
        self.thread.clear();
        let current = std::thread::current();
        let _ = self.thread.write_str(current.name().unwrap_or("?"));
        self.target.clear();
        let _ = self.target.write_str(record.target());
        self.text.clear();
        let _ = self.text.write_fmt(*record.args());
    }
}

impl Default for LoggerPage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_captures_record_fields() {
        let mut page = LoggerPage::new();
        let record = Record::builder()
            .args(format_args!("value = {}", 42))
            .level(Level::Warn)
            .target("unit_test")
            .build();
        page.fill(&record);
        assert_eq!(page.level, Level::Warn);
        assert_eq!(page.target.as_str(), "unit_test");
        assert_eq!(page.text.as_str(), "value = 42");
    }

    #[test]
    fn oversized_message_is_truncated() {
        let mut page = LoggerPage::new();
        let long = "x".repeat(MAX_LOG_MESSAGE_SIZE * 2);
        let args = format_args!("{long}");
        let record = Record::builder()
            .args(args)
            .level(Level::Info)
            .target("unit_test")
            .build();
        page.fill(&record);
        assert_eq!(page.text.as_str().len(), MAX_LOG_MESSAGE_SIZE);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut text: FixedText<4> = FixedText::new();
        let _ = text.write_str("aé𝄞");
        assert!(text.as_str().is_char_boundary(text.as_str().len()));
    }
}
