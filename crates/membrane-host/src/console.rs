//! Console capture.

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub message: String,
}

/// Records console output and mirrors it to `tracing`.
#[derive(Debug, Default)]
pub struct Console {
    entries: Vec<ConsoleEntry>,
}

impl Console {
    pub fn write(&mut self, level: ConsoleLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            ConsoleLevel::Log => info!(target: "membrane::console", "{message}"),
            ConsoleLevel::Warn => warn!(target: "membrane::console", "{message}"),
            ConsoleLevel::Error => error!(target: "membrane::console", "{message}"),
        }
        self.entries.push(ConsoleEntry { level, message });
    }

    pub fn entries(&self) -> &[ConsoleEntry] {
        &self.entries
    }

    /// Messages of one level, in order.
    pub fn messages(&self, level: ConsoleLevel) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
