use futures_util::TryStreamExt;
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};

use crate::error::ServerError;
use crate::model::LogRecord;

#[derive(Clone)]
pub struct LogCollection {
    collection: Collection<LogRecord>,
}

impl LogCollection {
    pub fn new(db: &Database) -> Self {
        Self { collection: db.collection("logs") }
    }

    pub async fn insert(&self, record: &LogRecord) -> Result<(), ServerError> {
        self.collection.insert_one(record, None).await?;
        Ok(())
    }

    /// Most recent `limit` log lines, newest first, for `GET /api/logs`.
    pub async fn recent(&self, limit: i64) -> Result<Vec<LogRecord>, ServerError> {
        let options = FindOptions::builder()
            .sort(mongodb::bson::doc! { "time": -1 })
            .limit(limit)
            .build();
        let cursor = self.collection.find(None, options).await?;
        Ok(cursor.try_collect().await?)
    }
}
