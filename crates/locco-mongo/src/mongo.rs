use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{Document, doc};
use mongodb::error::{Error, ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Collection, IndexModel};

use crate::store::{ExpiryFilter, LockDocument, LockDocumentStore, LockFilter};

/// Server error code for a unique index violation
pub const DUPLICATE_KEY_ERROR_CODE: i32 = 11000;

/// [`LockDocumentStore`] over a MongoDB collection
#[derive(Clone, Debug)]
pub struct MongoLockStore {
    collection: Collection<LockDocument>,
}

impl MongoLockStore {
    pub fn new(collection: Collection<LockDocument>) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> &Collection<LockDocument> {
        &self.collection
    }

    /// Fetch the stored record for `key`, expired or not
    pub async fn find_record(&self, key: &str) -> Result<Option<LockDocument>, Error> {
        self.collection.find_one(doc! { "key": key }).await
    }
}

/// Render a [`LockFilter`] as a query document
pub fn filter_document(filter: &LockFilter) -> Document {
    let mut query = doc! { "key": filter.key.as_str() };
    if let Some(owner_token) = &filter.owner_token {
        query.insert("ownerToken", owner_token.as_str());
    }
    match filter.expiry {
        ExpiryFilter::Live => {
            query.insert("expireAt", doc! { "$gt": filter.now });
        }
        ExpiryFilter::Expired => {
            query.insert(
                "$or",
                vec![
                    doc! { "expireAt": { "$lte": filter.now } },
                    doc! { "expireAt": { "$exists": false } },
                ],
            );
        }
    }
    query
}

fn set_document(record: &LockDocument) -> Document {
    doc! {
        "$set": {
            "key": record.key.as_str(),
            "ownerToken": record.owner_token.as_str(),
            "expireAt": record.expire_at,
        }
    }
}

/// Unique key, TTL purge on `expireAt`, and the compound query index
pub fn lock_indexes() -> Vec<IndexModel> {
    vec![
        IndexModel::builder()
            .keys(doc! { "key": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { "expireAt": 1 })
            .options(IndexOptions::builder().expire_after(Duration::ZERO).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { "key": 1, "expireAt": 1, "ownerToken": 1 })
            .build(),
    ]
}

/// Whether `error` is a unique index violation, from a write or a command
pub fn is_duplicate_key_error(error: &Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY_ERROR_CODE,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY_ERROR_CODE,
        _ => false,
    }
}

#[async_trait]
impl LockDocumentStore for MongoLockStore {
    type Error = Error;

    async fn ensure_indexes(&self) -> Result<(), Error> {
        self.collection.create_indexes(lock_indexes()).await?;
        Ok(())
    }

    async fn upsert_where(&self, filter: &LockFilter, record: &LockDocument) -> Result<(), Error> {
        self.collection
            .update_one(filter_document(filter), set_document(record))
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn update_where(&self, filter: &LockFilter, record: &LockDocument) -> Result<u64, Error> {
        let result = self
            .collection
            .update_one(filter_document(filter), set_document(record))
            .await?;
        Ok(result.matched_count)
    }

    async fn delete_where(&self, filter: &LockFilter) -> Result<u64, Error> {
        let result = self.collection.delete_one(filter_document(filter)).await?;
        Ok(result.deleted_count)
    }

    async fn exists_where(&self, filter: &LockFilter) -> Result<bool, Error> {
        let count = self
            .collection
            .count_documents(filter_document(filter))
            .limit(1)
            .await?;
        Ok(count > 0)
    }

    fn is_uniqueness_conflict(&self, error: &Error) -> bool {
        is_duplicate_key_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{Bson, DateTime};

    #[test]
    fn test_live_owner_filter() {
        let now = DateTime::from_millis(1_000);
        let query = filter_document(&LockFilter::held_by("jobs", "token-a", now));

        assert_eq!(
            query,
            doc! { "key": "jobs", "ownerToken": "token-a", "expireAt": { "$gt": now } }
        );
    }

    #[test]
    fn test_expired_filter_includes_missing_expiry() {
        let now = DateTime::from_millis(1_000);
        let query = filter_document(&LockFilter::expired("jobs", now));

        assert_eq!(query.get_str("key").unwrap(), "jobs");
        assert!(query.get("ownerToken").is_none());
        let branches = query.get_array("$or").unwrap();
        assert_eq!(
            branches,
            &vec![
                Bson::Document(doc! { "expireAt": { "$lte": now } }),
                Bson::Document(doc! { "expireAt": { "$exists": false } }),
            ]
        );
    }

    #[test]
    fn test_set_document_uses_stored_field_names() {
        let record = LockDocument::new("jobs", "token-a", DateTime::from_millis(5_000));
        let update = set_document(&record);
        let fields = update.get_document("$set").unwrap();

        assert_eq!(fields.get_str("ownerToken").unwrap(), "token-a");
        assert_eq!(
            fields.get_datetime("expireAt").unwrap(),
            &DateTime::from_millis(5_000)
        );
    }

    #[test]
    fn test_lock_indexes() {
        let indexes = lock_indexes();
        assert_eq!(indexes.len(), 3);

        let unique = indexes[0].options.as_ref().unwrap();
        assert_eq!(unique.unique, Some(true));
        let ttl = indexes[1].options.as_ref().unwrap();
        assert_eq!(ttl.expire_after, Some(Duration::ZERO));
        assert_eq!(indexes[2].keys, doc! { "key": 1, "expireAt": 1, "ownerToken": 1 });
    }
}
