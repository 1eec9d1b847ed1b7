//! Structured request logging.
//!
//! Every line is one JSON object tagged with the service name and the id of
//! the request that produced it, so Workers log search can group a share
//! creation or download with its collaborator calls.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

const SERVICE_NAME: &str = "planar-share";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// Per-request structured logger
#[derive(Clone, Debug)]
pub struct Logger {
    request_id: String,
}

impl Logger {
    pub fn new(request_id: String) -> Self {
        Self { request_id }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Log an info message with optional structured data
    pub fn info(&self, message: &str, data: Option<Value>) {
        self.log(Level::Info, message, data);
    }

    pub fn warn(&self, message: &str, data: Option<Value>) {
        self.log(Level::Warn, message, data);
    }

    pub fn error(&self, message: &str, data: Option<Value>) {
        self.log(Level::Error, message, data);
    }

    fn log(&self, level: Level, message: &str, data: Option<Value>) {
        let entry = self.entry(level, message, data, Utc::now());
        emit(level, &entry.to_string());
    }

    fn entry(
        &self,
        level: Level,
        message: &str,
        data: Option<Value>,
        at: DateTime<Utc>,
    ) -> Value {
        let mut entry = json!({
            "timestamp": at.to_rfc3339(),
            "level": level,
            "service": SERVICE_NAME,
            "request_id": self.request_id,
            "message": message,
        });
        if let (Some(data), Some(map)) = (data, entry.as_object_mut()) {
            map.insert("data".to_string(), data);
        }
        entry
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        fn emit(level: Level, line: &str) {
            match level {
                Level::Info => worker::console_log!("{}", line),
                Level::Warn => worker::console_warn!("{}", line),
                Level::Error => worker::console_error!("{}", line),
            }
        }
    } else {
        // Host builds have no JS console to bind to.
        fn emit(_level: Level, line: &str) {
            eprintln!("{}", line);
        }
    }
}

/// Builds the optional data object for a log call.
///
/// Usage: `log_data!("share_id" => id, "size_mb" => 42)`
#[macro_export]
macro_rules! log_data {
    ($($key:expr => $value:expr),* $(,)?) => {
        Some(serde_json::json!({ $($key: $value),* }))
    };
}
