//! Logging setup
//!
//! Interactive use logs pretty output with colors; embedded use logs JSON
//! lines to stderr so stdout stays free for the host.

use crate::config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_directive));

    let result = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(true)
            .try_init()
    };

    result.is_ok()
}

#[cfg(test)]
pub(crate) mod capture {
    //! In-memory JSON log capture for assertions on log records.

    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct CapturedLogs {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.buf.lock().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        /// Install as the thread-local default subscriber until the guard drops
        pub fn install(&self) -> tracing::subscriber::DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .json()
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        /// Parsed `fields` objects of every captured record
        pub fn records(&self) -> Vec<serde_json::Value> {
            let raw = self.buf.lock().clone();
            String::from_utf8_lossy(&raw)
                .lines()
                .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
                .filter_map(|record| record.get("fields").cloned())
                .collect()
        }

        /// First record whose message equals `message`
        pub fn find(&self, message: &str) -> Option<serde_json::Value> {
            self.records()
                .into_iter()
                .find(|fields| fields["message"] == message)
        }
    }
}
