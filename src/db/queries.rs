// Database query helpers for chronicles and files.
//
// Compositions have their own store (`composition::store`) because their
// state transitions carry invariants of their own.

use crate::db::schema::*;
use crate::page::PageParams;
use crate::types::{ChronicleId, FileId};
use anyhow::Result;
use surrealdb::{engine::any::Any, Surreal};

const CHRONICLE_FIELDS: &str = "record::id(id) AS id, title, description, language, created_at";

const FILE_FIELDS: &str = "record::id(id) AS id, chronicle_id, mime, name, path, url, \
                           thumb_name, thumb_path, thumb_url, created_at";

pub struct QueryBuilder;

impl QueryBuilder {
    /// Create a new chronicle and return its id.
    pub async fn create_chronicle(
        db: &Surreal<Any>,
        title: &str,
        description: &str,
        language: &str,
    ) -> Result<ChronicleId> {
        let id = ChronicleId::generate();

        db.query(
            r#"
            CREATE type::thing('chronicle', $id) SET
                title = $title,
                description = $description,
                language = $language
            RETURN NONE
            "#,
        )
        .bind(("id", id.to_string()))
        .bind(("title", title.to_string()))
        .bind(("description", description.to_string()))
        .bind(("language", language.to_string()))
        .await?
        .check()?;

        Ok(id)
    }

    pub async fn find_chronicle(
        db: &Surreal<Any>,
        id: &ChronicleId,
    ) -> Result<Option<ChronicleRecord>> {
        let mut res = db
            .query(format!(
                "SELECT {} FROM type::thing('chronicle', $id)",
                CHRONICLE_FIELDS
            ))
            .bind(("id", id.to_string()))
            .await?;

        let chronicle: Option<ChronicleRecord> = res.take(0)?;
        Ok(chronicle)
    }

    /// List chronicles, newest first.
    pub async fn list_chronicles(
        db: &Surreal<Any>,
        page: &PageParams,
    ) -> Result<Vec<ChronicleRecord>> {
        let mut res = db
            .query(format!(
                "SELECT {} FROM chronicle ORDER BY created_at DESC LIMIT $limit START $start",
                CHRONICLE_FIELDS
            ))
            .bind(("limit", page.limit()))
            .bind(("start", page.start()))
            .await?;

        let chronicles: Vec<ChronicleRecord> = res.take(0)?;
        Ok(chronicles)
    }

    pub async fn count_chronicles(db: &Surreal<Any>) -> Result<u64> {
        let mut res = db
            .query("SELECT count() AS total FROM chronicle GROUP ALL")
            .await?;

        let row: Option<CountRow> = res.take(0)?;
        Ok(row.map(|r| r.total).unwrap_or(0))
    }

    /// Overwrite the mutable fields of an existing chronicle.
    pub async fn update_chronicle(
        db: &Surreal<Any>,
        id: &ChronicleId,
        title: &str,
        description: &str,
        language: &str,
    ) -> Result<()> {
        db.query(
            r#"
            UPDATE type::thing('chronicle', $id) SET
                title = $title,
                description = $description,
                language = $language
            RETURN NONE
            "#,
        )
        .bind(("id", id.to_string()))
        .bind(("title", title.to_string()))
        .bind(("description", description.to_string()))
        .bind(("language", language.to_string()))
        .await?
        .check()?;

        Ok(())
    }

    /// Delete a chronicle together with its files and compositions in one
    /// transaction.
    pub async fn delete_chronicle_cascade(db: &Surreal<Any>, id: &ChronicleId) -> Result<()> {
        db.query(
            r#"
            BEGIN TRANSACTION;
            DELETE file WHERE chronicle_id = $id;
            DELETE composition WHERE chronicle_id = $id;
            DELETE type::thing('chronicle', $id);
            COMMIT TRANSACTION;
            "#,
        )
        .bind(("id", id.to_string()))
        .await?
        .check()?;

        Ok(())
    }

    /// Create a new file record owned by `chronicle_id`.
    pub async fn create_file(
        db: &Surreal<Any>,
        chronicle_id: &ChronicleId,
        data: &FileCreate,
    ) -> Result<FileId> {
        let id = FileId::generate();

        db.query(
            r#"
            CREATE type::thing('file', $id) SET
                chronicle_id = $chronicle_id,
                mime = $mime,
                name = $name,
                path = $path,
                url = $url,
                thumb_name = $thumb_name,
                thumb_path = $thumb_path,
                thumb_url = $thumb_url
            RETURN NONE
            "#,
        )
        .bind(("id", id.to_string()))
        .bind(("chronicle_id", chronicle_id.to_string()))
        .bind(("mime", data.mime.clone()))
        .bind(("name", data.name.clone()))
        .bind(("path", data.path.clone()))
        .bind(("url", data.url.clone()))
        .bind(("thumb_name", data.thumb_name.clone()))
        .bind(("thumb_path", data.thumb_path.clone()))
        .bind(("thumb_url", data.thumb_url.clone()))
        .await?
        .check()?;

        Ok(id)
    }

    pub async fn find_file(db: &Surreal<Any>, id: &FileId) -> Result<Option<FileRecord>> {
        let mut res = db
            .query(format!("SELECT {} FROM type::thing('file', $id)", FILE_FIELDS))
            .bind(("id", id.to_string()))
            .await?;

        let file: Option<FileRecord> = res.take(0)?;
        Ok(file)
    }

    /// One page of the files of a chronicle, in upload order.
    pub async fn list_files(
        db: &Surreal<Any>,
        chronicle_id: &ChronicleId,
        page: &PageParams,
    ) -> Result<Vec<FileRecord>> {
        let mut res = db
            .query(format!(
                "SELECT {} FROM file WHERE chronicle_id = $chronicle_id \
                 ORDER BY created_at ASC LIMIT $limit START $start",
                FILE_FIELDS
            ))
            .bind(("chronicle_id", chronicle_id.to_string()))
            .bind(("limit", page.limit()))
            .bind(("start", page.start()))
            .await?;

        let files: Vec<FileRecord> = res.take(0)?;
        Ok(files)
    }

    /// All files of a chronicle.
    pub async fn files_for_chronicle(
        db: &Surreal<Any>,
        chronicle_id: &ChronicleId,
    ) -> Result<Vec<FileRecord>> {
        let mut res = db
            .query(format!(
                "SELECT {} FROM file WHERE chronicle_id = $chronicle_id ORDER BY created_at ASC",
                FILE_FIELDS
            ))
            .bind(("chronicle_id", chronicle_id.to_string()))
            .await?;

        let files: Vec<FileRecord> = res.take(0)?;
        Ok(files)
    }

    pub async fn count_files(db: &Surreal<Any>, chronicle_id: &ChronicleId) -> Result<u64> {
        let mut res = db
            .query("SELECT count() AS total FROM file WHERE chronicle_id = $chronicle_id GROUP ALL")
            .bind(("chronicle_id", chronicle_id.to_string()))
            .await?;

        let row: Option<CountRow> = res.take(0)?;
        Ok(row.map(|r| r.total).unwrap_or(0))
    }

    pub async fn delete_file(db: &Surreal<Any>, id: &FileId) -> Result<()> {
        db.query("DELETE type::thing('file', $id)")
            .bind(("id", id.to_string()))
            .await?
            .check()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_connection, ensure_schema, DatabaseConfig, Db};

    async fn setup_test_db() -> Db {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    fn file_create(name: &str, mime: &str) -> FileCreate {
        FileCreate {
            mime: mime.to_string(),
            name: name.to_string(),
            path: format!("uploads/{}", name),
            url: format!("/uploads/{}", name),
            thumb_name: format!("{}.jpg", name),
            thumb_path: format!("uploads/{}.jpg", name),
            thumb_url: format!("/uploads/{}.jpg", name),
        }
    }

    #[tokio::test]
    async fn test_chronicle_roundtrip() {
        let db = setup_test_db().await;

        let id = QueryBuilder::create_chronicle(&db, "Walk", "Morning walk", "de")
            .await
            .unwrap();
        let chronicle = QueryBuilder::find_chronicle(&db, &id).await.unwrap().unwrap();

        assert_eq!(chronicle.id, id);
        assert_eq!(chronicle.title, "Walk");
        assert_eq!(chronicle.language, "de");
        assert!(chronicle.created_at.is_some());

        QueryBuilder::update_chronicle(&db, &id, "Evening walk", "Later", "en")
            .await
            .unwrap();
        let updated = QueryBuilder::find_chronicle(&db, &id).await.unwrap().unwrap();
        assert_eq!(updated.title, "Evening walk");
        assert_eq!(updated.description, "Later");
        assert_eq!(updated.language, "en");
    }

    #[tokio::test]
    async fn test_missing_chronicle_is_none() {
        let db = setup_test_db().await;
        let found = QueryBuilder::find_chronicle(&db, &ChronicleId::new("nope"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_list_and_count_chronicles() {
        let db = setup_test_db().await;
        for n in 0..3 {
            QueryBuilder::create_chronicle(&db, &format!("c{}", n), "d", "en")
                .await
                .unwrap();
        }

        assert_eq!(QueryBuilder::count_chronicles(&db).await.unwrap(), 3);
        let first = QueryBuilder::list_chronicles(&db, &PageParams::new(1, 2)).await.unwrap();
        let second = QueryBuilder::list_chronicles(&db, &PageParams::new(2, 2)).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_files_belong_to_chronicle() {
        let db = setup_test_db().await;
        let a = QueryBuilder::create_chronicle(&db, "a", "a", "en").await.unwrap();
        let b = QueryBuilder::create_chronicle(&db, "b", "b", "en").await.unwrap();

        let file_id = QueryBuilder::create_file(&db, &a, &file_create("x.mp3", "audio/mpeg"))
            .await
            .unwrap();
        QueryBuilder::create_file(&db, &b, &file_create("y.png", "image/png"))
            .await
            .unwrap();

        let files = QueryBuilder::files_for_chronicle(&db, &a).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, file_id);
        assert_eq!(files[0].chronicle_id, a);
        assert_eq!(files[0].path, "uploads/x.mp3");
        assert_eq!(QueryBuilder::count_files(&db, &b).await.unwrap(), 1);

        QueryBuilder::delete_file(&db, &file_id).await.unwrap();
        assert!(QueryBuilder::find_file(&db, &file_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cascade_delete() {
        let db = setup_test_db().await;
        let id = QueryBuilder::create_chronicle(&db, "a", "a", "en").await.unwrap();
        QueryBuilder::create_file(&db, &id, &file_create("x.mp3", "audio/mpeg"))
            .await
            .unwrap();

        QueryBuilder::delete_chronicle_cascade(&db, &id).await.unwrap();

        assert!(QueryBuilder::find_chronicle(&db, &id).await.unwrap().is_none());
        assert_eq!(QueryBuilder::count_files(&db, &id).await.unwrap(), 0);
    }
}
