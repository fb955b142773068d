//! MongoDB Atlas backend.

use super::DocumentStore;
use docquery_core::{AppError, AppResult};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document as BsonDocument};
use mongodb::{Client, Collection};

/// A MongoDB collection with an Atlas vector search index.
pub struct MongoStore {
    collection: Collection<BsonDocument>,
}

impl MongoStore {
    /// Connect to `uri` and bind to `database.collection`.
    ///
    /// The driver connects lazily; an unreachable server surfaces on the
    /// first query.
    pub async fn connect(uri: &str, database: &str, collection: &str) -> AppResult<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| AppError::Datastore(format!("Failed to create MongoDB client: {}", e)))?;

        tracing::info!("Using MongoDB collection {}.{}", database, collection);

        Ok(Self {
            collection: client.database(database).collection(collection),
        })
    }

    /// Wrap an existing collection handle.
    pub fn from_collection(collection: Collection<BsonDocument>) -> Self {
        Self { collection }
    }
}

#[async_trait::async_trait]
impl DocumentStore for MongoStore {
    fn backend_name(&self) -> &str {
        "mongodb"
    }

    async fn aggregate(&self, pipeline: Vec<BsonDocument>) -> AppResult<Vec<BsonDocument>> {
        let cursor = self
            .collection
            .aggregate(pipeline)
            .await
            .map_err(|e| AppError::Datastore(format!("Aggregation failed: {}", e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| AppError::Datastore(format!("Failed to read aggregation cursor: {}", e)))
    }

    async fn find_missing(&self, field: &str) -> AppResult<Vec<BsonDocument>> {
        let mut filter = BsonDocument::new();
        filter.insert(field, doc! { "$exists": false });

        let cursor = self
            .collection
            .find(filter)
            .await
            .map_err(|e| AppError::Datastore(format!("Find failed: {}", e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| AppError::Datastore(format!("Failed to read find cursor: {}", e)))
    }

    async fn set_fields(&self, id: &Bson, fields: BsonDocument) -> AppResult<()> {
        let result = self
            .collection
            .update_one(doc! { "_id": id.clone() }, doc! { "$set": fields })
            .await
            .map_err(|e| AppError::Datastore(format!("Update failed: {}", e)))?;

        if result.matched_count == 0 {
            return Err(AppError::Datastore(format!("No document with _id {}", id)));
        }
        Ok(())
    }
}
