// Persistence of compositions and their pending -> ready/failed transition.
//
// Transitions are single conditional statements (`... WHERE status =
// 'pending'`), so a row can never be completed twice or be completed after it
// failed, and readers see either the pending row or the finished one.

use serde::{Deserialize, Serialize};
use surrealdb::sql::Datetime;

use crate::composition::document::{decode, CompositionDocument, EncodedDocument};
use crate::db::schema::{CompositionRecord, CompositionStatus, CountRow};
use crate::db::Db;
use crate::error::StoreError;
use crate::page::PageParams;
use crate::types::{ChronicleId, CompositionId};

const FIELDS: &str = "record::id(id) AS id, chronicle_id, title, version, status, data, error, \
                      created_at, completed_at";

/// Same as `FIELDS` without the payload, for listings.
const SUMMARY_FIELDS: &str = "record::id(id) AS id, chronicle_id, title, version, status, error, \
                              created_at, completed_at";

#[derive(Debug, Deserialize)]
struct StatusRow {
    #[allow(dead_code)]
    status: CompositionStatus,
}

#[derive(Clone)]
pub struct CompositionStore {
    db: Db,
}

impl CompositionStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert a pending composition without data.
    pub async fn create_pending(
        &self,
        chronicle_id: &ChronicleId,
        title: &str,
        version: u32,
    ) -> Result<CompositionId, StoreError> {
        let id = CompositionId::generate();

        self.db
            .query(
                r#"
                CREATE type::thing('composition', $id) SET
                    chronicle_id = $chronicle_id,
                    title = $title,
                    version = $version,
                    status = 'pending'
                RETURN NONE
                "#,
            )
            .bind(("id", id.to_string()))
            .bind(("chronicle_id", chronicle_id.to_string()))
            .bind(("title", title.to_string()))
            .bind(("version", version as i64))
            .await?
            .check()?;

        Ok(id)
    }

    /// Store the document and flip the row to ready in one statement.
    pub async fn complete(
        &self,
        id: &CompositionId,
        data: &EncodedDocument,
    ) -> Result<(), StoreError> {
        let mut res = self
            .db
            .query(
                r#"
                UPDATE type::thing('composition', $id) SET
                    data = $data,
                    status = 'ready',
                    completed_at = time::now()
                WHERE status = 'pending'
                RETURN AFTER
                "#,
            )
            .bind(("id", id.to_string()))
            .bind(("data", data.as_str().to_string()))
            .await?;

        let updated: Vec<StatusRow> = res.take(0)?;
        if updated.is_empty() {
            return Err(self.transition_error(id).await);
        }
        Ok(())
    }

    /// Move a pending row to the failed state with a reason.
    pub async fn fail(&self, id: &CompositionId, reason: &str) -> Result<(), StoreError> {
        let mut res = self
            .db
            .query(
                r#"
                UPDATE type::thing('composition', $id) SET
                    status = 'failed',
                    error = $error,
                    completed_at = time::now()
                WHERE status = 'pending'
                RETURN AFTER
                "#,
            )
            .bind(("id", id.to_string()))
            .bind(("error", reason.to_string()))
            .await?;

        let updated: Vec<StatusRow> = res.take(0)?;
        if updated.is_empty() {
            return Err(self.transition_error(id).await);
        }
        Ok(())
    }

    async fn transition_error(&self, id: &CompositionId) -> StoreError {
        match self.get(id).await {
            Ok(Some(_)) => StoreError::NotPending(id.to_string()),
            Ok(None) => StoreError::NotFound(format!("Composition {} not found", id)),
            Err(err) => err,
        }
    }

    pub async fn get(&self, id: &CompositionId) -> Result<Option<CompositionRecord>, StoreError> {
        let mut res = self
            .db
            .query(format!(
                "SELECT {} FROM type::thing('composition', $id)",
                FIELDS
            ))
            .bind(("id", id.to_string()))
            .await?;

        let record: Option<CompositionRecord> = res.take(0)?;
        Ok(record)
    }

    /// One page of the compositions of a chronicle, newest first. The
    /// payload is left out.
    pub async fn list(
        &self,
        chronicle_id: &ChronicleId,
        page: &PageParams,
    ) -> Result<Vec<CompositionRecord>, StoreError> {
        let mut res = self
            .db
            .query(format!(
                "SELECT {} FROM composition WHERE chronicle_id = $chronicle_id \
                 ORDER BY created_at DESC LIMIT $limit START $start",
                SUMMARY_FIELDS
            ))
            .bind(("chronicle_id", chronicle_id.to_string()))
            .bind(("limit", page.limit()))
            .bind(("start", page.start()))
            .await?;

        let records: Vec<CompositionRecord> = res.take(0)?;
        Ok(records)
    }

    pub async fn count(&self, chronicle_id: &ChronicleId) -> Result<u64, StoreError> {
        self.count_where(chronicle_id, None).await
    }

    pub async fn count_pending(&self, chronicle_id: &ChronicleId) -> Result<u64, StoreError> {
        self.count_where(chronicle_id, Some(CompositionStatus::Pending))
            .await
    }

    async fn count_where(
        &self,
        chronicle_id: &ChronicleId,
        status: Option<CompositionStatus>,
    ) -> Result<u64, StoreError> {
        let query = match status {
            Some(_) => {
                "SELECT count() AS total FROM composition \
                 WHERE chronicle_id = $chronicle_id AND status = $status GROUP ALL"
            }
            None => {
                "SELECT count() AS total FROM composition \
                 WHERE chronicle_id = $chronicle_id GROUP ALL"
            }
        };

        let mut res = self
            .db
            .query(query)
            .bind(("chronicle_id", chronicle_id.to_string()))
            .bind(("status", status.map(|s| s.as_str()).unwrap_or_default()))
            .await?;

        let row: Option<CountRow> = res.take(0)?;
        Ok(row.map(|r| r.total).unwrap_or(0))
    }

    /// Delete a finished composition. Pending rows are refused.
    pub async fn delete(&self, id: &CompositionId) -> Result<(), StoreError> {
        match self.get(id).await? {
            None => return Err(StoreError::NotFound(format!("Composition {} not found", id))),
            Some(record) if record.status == CompositionStatus::Pending => {
                return Err(StoreError::StillPending(id.to_string()));
            }
            Some(_) => {}
        }

        let mut res = self
            .db
            .query("DELETE type::thing('composition', $id) WHERE status != 'pending' RETURN BEFORE")
            .bind(("id", id.to_string()))
            .await?;

        let deleted: Vec<StatusRow> = res.take(0)?;
        if deleted.is_empty() {
            // Lost a race against a concurrent delete.
            return Err(StoreError::NotFound(format!("Composition {} not found", id)));
        }
        Ok(())
    }
}

/// A composition as shown to readers, with the payload decoded.
#[derive(Debug, Clone, Serialize)]
pub struct CompositionView {
    pub id: CompositionId,
    pub chronicle_id: ChronicleId,
    pub title: String,
    pub version: u32,
    pub status: CompositionStatus,
    pub is_ready: bool,
    pub error: Option<String>,
    pub created_at: Option<Datetime>,
    pub completed_at: Option<Datetime>,
    pub data: Option<CompositionDocument>,
}

impl CompositionView {
    /// Build a view, decoding the payload. A row that is ready without data
    /// (or carries data while not ready) is reported as a codec error.
    pub fn from_record(record: CompositionRecord) -> Result<Self, StoreError> {
        let data = match (record.status, record.data) {
            (CompositionStatus::Ready, Some(raw)) => {
                Some(decode(&EncodedDocument::from_stored(raw))?)
            }
            (CompositionStatus::Ready, None) => {
                return Err(StoreError::Codec(format!(
                    "composition {} is ready without data",
                    record.id
                )));
            }
            (_, Some(_)) => {
                return Err(StoreError::Codec(format!(
                    "composition {} has data but is not ready",
                    record.id
                )));
            }
            (_, None) => None,
        };

        Ok(Self {
            is_ready: record.status == CompositionStatus::Ready,
            id: record.id,
            chronicle_id: record.chronicle_id,
            title: record.title,
            version: record.version,
            status: record.status,
            error: record.error,
            created_at: record.created_at,
            completed_at: record.completed_at,
            data,
        })
    }

    /// View of a listed row, whose payload was not selected.
    pub fn summary(record: CompositionRecord) -> Self {
        Self {
            is_ready: record.status == CompositionStatus::Ready,
            id: record.id,
            chronicle_id: record.chronicle_id,
            title: record.title,
            version: record.version,
            status: record.status,
            error: record.error,
            created_at: record.created_at,
            completed_at: record.completed_at,
            data: None,
        }
    }
}
