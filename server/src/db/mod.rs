mod group;
mod log;
mod peer;

pub use group::GroupCollection;
pub use log::LogCollection;
pub use peer::PeerCollection;

use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions, ServerApi, ServerApiVersion};
use mongodb::{Client, Database, IndexModel};

use crate::error::ServerError;

pub async fn connect(uri: &str, db_name: &str) -> Result<Database, ServerError> {
    let mut options = ClientOptions::parse(uri).await?;
    options.server_api = Some(ServerApi::builder().version(ServerApiVersion::V1).build());
    let client = Client::with_options(options)?;
    Ok(client.database(db_name))
}

/// Unique indexes on `peers.allowedIPs`/`peers.name`/`groups.name`, plus
/// a TTL index on `logs.expireAt`. Matches the index set created in
/// `main.go`'s `init()`.
pub async fn ensure_indexes(db: &Database) -> Result<(), ServerError> {
    let peers = db.collection::<bson::Document>("peers");
    peers
        .create_index(
            IndexModel::builder()
                .keys(doc! { "allowedIPs": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            None,
        )
        .await?;
    peers
        .create_index(
            IndexModel::builder()
                .keys(doc! { "name": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            None,
        )
        .await?;

    let groups = db.collection::<bson::Document>("groups");
    groups
        .create_index(
            IndexModel::builder()
                .keys(doc! { "name": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            None,
        )
        .await?;

    let logs = db.collection::<bson::Document>("logs");
    logs.create_index(
        IndexModel::builder()
            .keys(doc! { "expireAt": 1 })
            .options(IndexOptions::builder().expire_after(std::time::Duration::from_secs(0)).build())
            .build(),
        None,
    )
    .await?;

    Ok(())
}

/// `true` if a Mongo write error's code is 11000 (duplicate key), the
/// signal the address allocator retries on.
pub fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    use mongodb::error::ErrorKind;
    match error.kind.as_ref() {
        ErrorKind::Write(mongodb::error::WriteFailure::WriteError(we)) => we.code == 11000,
        ErrorKind::BulkWrite(bwe) => bwe.write_errors.as_ref().is_some_and(|errors| {
            errors.iter().any(|e| e.code == 11000)
        }),
        _ => false,
    }
}
