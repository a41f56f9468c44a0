//! FileSink - writes events to disk as JSON lines

use contracts::{EventSink, ReadoutError, ReadoutEvent};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file, one event per line
    pub path: PathBuf,
    /// Append to an existing file instead of truncating it
    pub append: bool,
}

impl FileSinkConfig {
    /// Create config from params map
    ///
    /// Recognised keys: `path` (required), `append` (`true`/`false`).
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .ok_or_else(|| "missing 'path' parameter".to_string())?;
        let append = match params.get("append").map(String::as_str) {
            None | Some("false") => false,
            Some("true") => true,
            Some(other) => return Err(format!("invalid 'append' value '{other}'")),
        };
        Ok(Self { path, append })
    }
}

/// Sink that writes each event as one JSON object per line
pub struct FileSink {
    name: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    lines: u64,
}

impl FileSink {
    /// Create a new FileSink, creating parent directories as needed
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(config.append)
            .truncate(!config.append)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            path: config.path,
            writer: Some(BufWriter::new(file)),
            lines: 0,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        Self::new(name, config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, event: &ReadoutEvent) -> std::io::Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "sink already closed")
        })?;
        serde_json::to_writer(&mut *writer, event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    fn persist_event(&mut self, event: &ReadoutEvent) -> Result<(), ReadoutError> {
        self.write_line(event).map_err(|e| {
            error!(sink = %self.name, event_number = event.event_number, error = %e, "Write failed");
            ReadoutError::sink_write(&self.name, e.to_string())
        })
    }
}

impl EventSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, event),
        fields(sink = %self.name, event_number = event.event_number)
    )]
    fn write(&mut self, event: &ReadoutEvent) -> Result<(), ReadoutError> {
        self.persist_event(event)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    fn flush(&mut self) -> Result<(), ReadoutError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| ReadoutError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    fn close(&mut self) -> Result<(), ReadoutError> {
        self.flush()?;
        self.writer = None;
        debug!(sink = %self.name, path = %self.path.display(), lines = self.lines, "FileSink closed");
        Ok(())
    }
}
