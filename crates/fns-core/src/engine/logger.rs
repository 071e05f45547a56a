//! Execution logger exposed to user code.
//!
//! Entries are captured only on the live part of an invocation, so a log line
//! written before a completed step is reported exactly once across the whole
//! execution. The buffer is bounded in both entry count and message length.

use std::collections::VecDeque;
use std::fmt::Display;

use fns_types::config::LogLimits;
use fns_types::event::{LogEntry, LogLevel};

use super::invocation::{Shared, lock};

const TRUNCATION_SUFFIX: &str = "...";

// ---------------------------------------------------------------------------
// LogBuffer
// ---------------------------------------------------------------------------

pub(crate) struct LogBuffer {
    entries: VecDeque<LogEntry>,
    limits: LogLimits,
}

impl LogBuffer {
    pub fn new(limits: LogLimits) -> Self {
        Self {
            entries: VecDeque::new(),
            limits,
        }
    }

    /// Append an entry; returns true when the oldest entry had to be evicted.
    pub fn push(&mut self, level: LogLevel, message: String) -> bool {
        let message = truncate(message, self.limits.max_message_len);
        self.entries.push_back(LogEntry { level, message });
        if self.entries.len() > self.limits.max_entries {
            self.entries.pop_front();
            return true;
        }
        false
    }

    pub fn take(&mut self) -> Vec<LogEntry> {
        self.entries.drain(..).collect()
    }
}

fn truncate(message: String, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        return message;
    }
    let keep = max_len.saturating_sub(TRUNCATION_SUFFIX.len());
    let mut truncated: String = message.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Per-invocation logger handed to the function body.
///
/// In dev mode every captured entry is also emitted through `tracing` under
/// the `fns::user` target.
#[derive(Clone)]
pub struct Logger {
    shared: Shared,
    function: String,
    execution_id: String,
    dev: bool,
}

impl Logger {
    pub(crate) fn new(shared: Shared, function: &str, execution_id: &str, dev: bool) -> Self {
        Self {
            shared,
            function: function.to_string(),
            execution_id: execution_id.to_string(),
            dev,
        }
    }

    pub fn debug(&self, message: impl Display) {
        self.append(LogLevel::Debug, message.to_string());
    }

    pub fn info(&self, message: impl Display) {
        self.append(LogLevel::Info, message.to_string());
    }

    pub fn warn(&self, message: impl Display) {
        self.append(LogLevel::Warn, message.to_string());
    }

    pub fn error(&self, message: impl Display) {
        self.append(LogLevel::Error, message.to_string());
    }

    fn append(&self, level: LogLevel, message: String) {
        let evicted = {
            let mut invocation = lock(&self.shared);
            if invocation.is_replaying() {
                return;
            }
            if self.dev {
                self.emit(level, &message);
            }
            invocation.logs.push(level, message)
        };

        if evicted && self.dev {
            tracing::warn!(
                function = %self.function,
                execution_id = %self.execution_id,
                "log buffer full, dropping oldest entry"
            );
        }
    }

    fn emit(&self, level: LogLevel, message: &str) {
        let function = self.function.as_str();
        let execution_id = self.execution_id.as_str();
        match level {
            LogLevel::Debug => {
                tracing::debug!(target: "fns::user", function, execution_id, "{message}")
            }
            LogLevel::Info => {
                tracing::info!(target: "fns::user", function, execution_id, "{message}")
            }
            LogLevel::Warn => {
                tracing::warn!(target: "fns::user", function, execution_id, "{message}")
            }
            LogLevel::Error => {
                tracing::error!(target: "fns::user", function, execution_id, "{message}")
            }
        }
    }
}
