use bson::oid::ObjectId;
use futures_util::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Collection, Database};

use crate::error::ServerError;
use crate::model::Group;

#[derive(Clone)]
pub struct GroupCollection {
    collection: Collection<Group>,
}

impl GroupCollection {
    pub fn new(db: &Database) -> Self {
        Self { collection: db.collection("groups") }
    }

    pub async fn list_all(&self) -> Result<Vec<Group>, ServerError> {
        let cursor = self.collection.find(None, None).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn get(&self, id: ObjectId) -> Result<Option<Group>, ServerError> {
        Ok(self.collection.find_one(doc! { "_id": id }, None).await?)
    }

    pub async fn insert(&self, group: &Group) -> Result<(), ServerError> {
        match self.collection.insert_one(group, None).await {
            Ok(_) => Ok(()),
            Err(e) if crate::db::is_duplicate_key(&e) => {
                Err(ServerError::Duplicate(format!("group {} already exists", group.name)))
            },
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, id: ObjectId) -> Result<(), ServerError> {
        self.collection.delete_one(doc! { "_id": id }, None).await?;
        Ok(())
    }

    pub async fn set_fields(&self, id: ObjectId, fields: bson::Document) -> Result<(), ServerError> {
        self.collection.update_one(doc! { "_id": id }, doc! { "$set": fields }, None).await?;
        Ok(())
    }

    pub async fn increment_totals(&self, id: ObjectId, tx: i64, rx: i64) -> Result<(), ServerError> {
        self.collection
            .update_one(doc! { "_id": id }, doc! { "$inc": { "totalTX": tx, "totalRX": rx } }, None)
            .await?;
        Ok(())
    }
}
