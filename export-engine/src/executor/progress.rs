//! Labelled progress sinks.
//!
//! Every line written to a [`Progress`] is forwarded to `tracing` with the
//! sink's label attached and kept in an in-memory log, so that a component's
//! output can be attached to the export report afterwards.

use std::fmt::Display;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct ProgressState {
    log: String,
    pending: String,
}

#[derive(Debug, Clone)]
pub struct Progress {
    label: Arc<str>,
    state: Arc<Mutex<ProgressState>>,
}

impl Progress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: Arc::from(label.into()),
            state: Arc::default(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Write a single line of progress.
    pub fn line(&self, message: impl Display) {
        let mut state = self.lock();
        let message = message.to_string();
        self.emit(&message);
        state.log.push_str(&message);
        state.log.push('\n');
    }

    /// Everything written so far, including an unterminated last line.
    pub fn contents(&self) -> String {
        let state = self.lock();
        let mut contents = state.log.clone();
        contents.push_str(&state.pending);
        contents
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, line: &str) {
        tracing::info!(target: "export_engine::progress", item = %self.label, "{}", line);
    }
}

impl io::Write for Progress {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let mut state = self.lock();
        state.pending.push_str(&text);

        while let Some(idx) = state.pending.find('\n') {
            let line: String = state.pending.drain(..=idx).collect();
            self.emit(line.trim_end_matches('\n'));
            state.log.push_str(&line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.lock();
        if !state.pending.is_empty() {
            let line = std::mem::take(&mut state.pending);
            self.emit(&line);
            state.log.push_str(&line);
            state.log.push('\n');
        }
        Ok(())
    }
}
