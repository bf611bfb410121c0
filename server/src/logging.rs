use bson::DateTime as BsonDateTime;
use log::{Level, Log, Metadata, Record};

use crate::db::LogCollection;
use crate::model::LogRecord;

/// Tees every log record to stderr and, asynchronously, into the
/// `logs` collection with a 48-hour TTL. Mirrors the original's
/// `CustomWriter`, which wrapped `slog`'s JSON handler the same way so
/// that every line written to the console also landed in the database.
pub struct MongoTeeLogger {
    level: Level,
    handle: tokio::runtime::Handle,
    logs: LogCollection,
    public_address: String,
}

impl MongoTeeLogger {
    pub fn init(
        level: Level,
        handle: tokio::runtime::Handle,
        logs: LogCollection,
        public_address: String,
    ) -> Result<(), log::SetLoggerError> {
        log::set_max_level(level.to_level_filter());
        log::set_boxed_logger(Box::new(Self { level, handle, logs, public_address }))
    }
}

impl Log for MongoTeeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = record.level();
        let message = format!("{}", record.args());
        eprintln!("{:<5} {}: {}", level, record.target(), message);

        let public_address = self.public_address.clone();
        let logs = self.logs.clone();
        let level_str = level_name(level);
        let time = chrono::Utc::now().timestamp_millis();
        let expire_at = BsonDateTime::from_chrono(chrono::Utc::now() + chrono::Duration::hours(48));

        self.handle.spawn(async move {
            let record = LogRecord {
                time,
                level: level_str.to_string(),
                message,
                peer: String::new(),
                public_address,
                expire_at,
            };
            if let Err(e) = logs.insert(&record).await {
                eprintln!("failed to persist log record: {e}");
            }
        });
    }

    fn flush(&self) {}
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::Error => "error",
        Level::Warn => "warn",
        Level::Info => "info",
        Level::Debug => "debug",
        Level::Trace => "trace",
    }
}
