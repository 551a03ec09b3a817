// SPDX-FileCopyrightText: 2024 Gemeente Nijmegen
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::common::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

const INDENT: &str = "  ";

/// Severity of a logged line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    /// Progress.
    Trace,
    /// Something failed or needs attention.
    Warn,
}

#[derive(Default)]
pub(crate) struct LoggerInner {
    pub(crate) lines: Vec<(Level, String)>,
}

/// Thread-safe string logger. Clones share the same lines, so a logger can
/// be handed to concurrently running steps.
#[derive(Clone, Default)]
pub struct StringLogger {
    pub(crate) debug: bool,
    pub(crate) inner: Arc<Mutex<LoggerInner>>,
}

impl StringLogger {
    /// Create a new string logger; with `debug` every line is also printed.
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            inner: Arc::new(Mutex::new(Default::default())),
        }
    }

    /// A fresh logger with the same debug setting, for a sub task whose
    /// lines are later merged with `append`.
    pub fn child(&self) -> Self {
        Self::new(self.debug)
    }

    /// Merge the lines of a sub task, indented under a heading that reports
    /// its outcome.
    pub fn append<T>(
        &self,
        heading: &str,
        child: &StringLogger,
        result: Result<T, Error>,
    ) -> Result<T, Error> {
        match &result {
            Ok(_) => self.trace(format!("{heading} succeeded")),
            Err(e) => self.warn(format!("{heading} failed: {e}")),
        }
        let lines = child.lines();
        for (level, line) in lines {
            self.push(level, format!("{INDENT}{}", line.replace('\n', &format!("\n{INDENT}"))));
        }
        result
    }

    /// Trace the outcome of a call and pass its result through.
    pub fn call<T>(&self, line: String, result: Result<T, Error>) -> Result<T, Error> {
        match &result {
            Ok(_) => self.trace(format!("{line} succeeded")),
            Err(e) => self.warn(format!("{line} failed: {e}")),
        }
        result
    }

    /// Whether the log contains any warnings.
    pub fn contains_warnings(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.lines.iter().any(|(level, _)| *level == Level::Warn))
            .unwrap_or(false)
    }

    /// Add all lines from the specified logger to this logger.
    pub fn extend(&self, string_logger: &StringLogger) {
        for (level, line) in string_logger.lines() {
            self.push(level, line);
        }
    }

    /// Add an indented trace line to this logger.
    pub fn indent(&self, line: String, indentation: &str) {
        if !line.is_empty() {
            let indented_line = format!(
                "{indentation}{}",
                line.replace('\n', &format!("\n{indentation}"))
            );
            self.push(Level::Trace, indented_line);
        }
    }

    /// Snapshot of all lines.
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.inner
            .lock()
            .map(|inner| inner.lines.clone())
            .unwrap_or_default()
    }

    /// Add a trace line to this logger.
    pub fn trace(&self, line: String) {
        self.push(Level::Trace, line);
    }

    /// Add a warning or error line to this logger.
    pub fn warn(&self, line: String) {
        self.push(Level::Warn, line);
    }

    /// Only the warning lines.
    pub fn warnings(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(level, _)| *level == Level::Warn)
            .map(|(_, line)| line)
            .collect()
    }

    fn push(&self, level: Level, line: String) {
        if line.is_empty() {
            return;
        }
        if self.debug {
            match level {
                Level::Trace => println!("{line}"),
                Level::Warn => println!("WARN {line}"),
            }
        }
        if let Ok(mut inner) = self.inner.lock() {
            inner.lines.push((level, line));
        }
    }
}

impl Display for StringLogger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let lines: Vec<String> = self.lines().into_iter().map(|(_, line)| line).collect();
        f.write_str(&lines.join("\n"))
    }
}
