use futures_util::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::{Collection, Database};

use crate::error::ServerError;
use crate::model::Peer;

#[derive(Clone)]
pub struct PeerCollection {
    collection: Collection<Peer>,
}

impl PeerCollection {
    pub fn new(db: &Database) -> Self {
        Self { collection: db.collection("peers") }
    }

    pub async fn list_all(&self) -> Result<Vec<Peer>, ServerError> {
        let cursor = self.collection.find(None, None).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn get(&self, public_key: &str) -> Result<Option<Peer>, ServerError> {
        Ok(self.collection.find_one(doc! { "_id": public_key }, None).await?)
    }

    pub async fn insert(&self, peer: &Peer) -> Result<(), ServerError> {
        match self.collection.insert_one(peer, None).await {
            Ok(_) => Ok(()),
            Err(e) if crate::db::is_duplicate_key(&e) => {
                Err(ServerError::Duplicate(format!("peer {} or its address already exists", peer.name)))
            },
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, public_key: &str) -> Result<(), ServerError> {
        self.collection.delete_one(doc! { "_id": public_key }, None).await?;
        Ok(())
    }

    /// Applies an arbitrary field set to a single peer document and
    /// returns the updated document, used by both the HTTP patch
    /// handler and the update change-stream consumer's own writes (e.g.
    /// clearing a field after dispatch).
    pub async fn set_fields(
        &self,
        public_key: &str,
        fields: bson::Document,
    ) -> Result<Option<Peer>, ServerError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .collection
            .find_one_and_update(doc! { "_id": public_key }, doc! { "$set": fields }, options)
            .await?)
    }

    /// Updates the one `serverSpecificInfo[]` element matching `filter`
    /// (scoped to this peer). Returns `false` if no element matched, so
    /// the caller can fall back to pushing a new one.
    pub async fn set_fields_matching(
        &self,
        public_key: &str,
        mut filter: bson::Document,
        update: bson::Document,
    ) -> Result<bool, ServerError> {
        filter.insert("_id", public_key);
        let result = self.collection.update_one(filter, doc! { "$set": update }, None).await?;
        Ok(result.matched_count > 0)
    }

    pub async fn push_ssi(&self, public_key: &str, ssi: bson::Bson) -> Result<(), ServerError> {
        self.collection
            .update_one(
                doc! { "_id": public_key },
                doc! { "$push": { "serverSpecificInfo": ssi } },
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn increment_totals(&self, public_key: &str, tx: i64, rx: i64) -> Result<(), ServerError> {
        self.collection
            .update_one(
                doc! { "_id": public_key },
                doc! { "$inc": { "totalTX": tx, "totalRX": rx } },
                None,
            )
            .await?;
        Ok(())
    }
}
