// Chronicle and file management.

use serde::Deserialize;

use crate::db::queries::QueryBuilder;
use crate::db::schema::{ChronicleRecord, FileRecord};
use crate::error::{ServiceError, ServiceResult};
use crate::media::{is_audio, MediaCategory};
use crate::orchestrator::Orchestrator;
use crate::page::{Page, PageParams};
use crate::types::{ChronicleId, FileId};

const MAX_TITLE_CHARS: usize = 255;

/// Body of chronicle create and update requests.
#[derive(Debug, Clone, Deserialize)]
pub struct ChronicleInput {
    pub title: String,
    pub description: String,
    /// Recognition language; the configured default when omitted.
    #[serde(default)]
    pub language: Option<String>,
}

impl ChronicleInput {
    pub fn validate(&self) -> ServiceResult<()> {
        let title_chars = self.title.trim().chars().count();
        if title_chars == 0 || title_chars > MAX_TITLE_CHARS {
            return Err(ServiceError::Invalid(format!(
                "title must be between 1 and {} characters",
                MAX_TITLE_CHARS
            )));
        }
        if self.description.trim().is_empty() {
            return Err(ServiceError::Invalid("description must not be empty".to_string()));
        }
        if matches!(&self.language, Some(lang) if lang.trim().is_empty()) {
            return Err(ServiceError::Invalid("language must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Orchestrator {
    pub async fn create_chronicle(&self, input: ChronicleInput) -> ServiceResult<ChronicleRecord> {
        input.validate()?;
        let language = input
            .language
            .unwrap_or_else(|| self.config.default_language.clone());

        let id = QueryBuilder::create_chronicle(&self.db, &input.title, &input.description, &language)
            .await?;
        tracing::info!("Created chronicle {}", id);
        self.get_chronicle(&id).await
    }

    pub async fn get_chronicle(&self, id: &ChronicleId) -> ServiceResult<ChronicleRecord> {
        QueryBuilder::find_chronicle(&self.db, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Chronicle {} not found", id)))
    }

    pub async fn list_chronicles(&self, page: PageParams) -> ServiceResult<Page<ChronicleRecord>> {
        page.validate()?;
        let items = QueryBuilder::list_chronicles(&self.db, &page).await?;
        let total = QueryBuilder::count_chronicles(&self.db).await?;
        Ok(Page::new(items, total, page))
    }

    /// Replace title, description and (when given) language.
    pub async fn update_chronicle(
        &self,
        id: &ChronicleId,
        input: ChronicleInput,
    ) -> ServiceResult<ChronicleRecord> {
        input.validate()?;
        let existing = self.get_chronicle(id).await?;
        let language = input.language.unwrap_or(existing.language);

        QueryBuilder::update_chronicle(&self.db, id, &input.title, &input.description, &language)
            .await?;
        self.get_chronicle(id).await
    }

    /// Delete a chronicle with its files and compositions. Refused while a
    /// composition of the chronicle is still being generated.
    pub async fn delete_chronicle(&self, id: &ChronicleId) -> ServiceResult<()> {
        let _guard = self.locks.acquire(id).await;
        self.get_chronicle(id).await?;

        if self.compositions.count_pending(id).await? > 0 {
            return Err(ServiceError::Conflict(format!(
                "Can't delete chronicle {} while a composition is being generated",
                id
            )));
        }

        let files = QueryBuilder::files_for_chronicle(&self.db, id).await?;
        QueryBuilder::delete_chronicle_cascade(&self.db, id).await?;
        self.locks.forget(id).await;
        for file in &files {
            self.uploads.remove(file).await;
        }

        tracing::info!("Deleted chronicle {} with {} files", id, files.len());
        Ok(())
    }

    async fn ensure_files_mutable(&self, chronicle_id: &ChronicleId) -> ServiceResult<()> {
        if self.compositions.count(chronicle_id).await? > 0 {
            return Err(ServiceError::Conflict(format!(
                "Can't change files of chronicle {} which already has compositions",
                chronicle_id
            )));
        }
        Ok(())
    }

    /// Store an uploaded file and its thumbnail and attach it to a chronicle.
    pub async fn upload_file(
        &self,
        chronicle_id: &ChronicleId,
        mime: &str,
        bytes: &[u8],
    ) -> ServiceResult<FileRecord> {
        let _guard = self.locks.acquire(chronicle_id).await;
        self.get_chronicle(chronicle_id).await?;

        if MediaCategory::from_mime(mime).is_none() {
            return Err(ServiceError::UnsupportedMedia(mime.to_string()));
        }
        if bytes.is_empty() {
            return Err(ServiceError::Invalid("uploaded file is empty".to_string()));
        }
        self.ensure_files_mutable(chronicle_id).await?;

        if is_audio(mime) {
            let files = QueryBuilder::files_for_chronicle(&self.db, chronicle_id).await?;
            if files.iter().any(|f| is_audio(&f.mime)) {
                return Err(ServiceError::Conflict(format!(
                    "Chronicle {} already contains an audio file",
                    chronicle_id
                )));
            }
        }

        let created = self.uploads.store(mime, bytes).await?;
        let file_id = match QueryBuilder::create_file(&self.db, chronicle_id, &created).await {
            Ok(id) => id,
            Err(err) => {
                for path in [&created.path, &created.thumb_path] {
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        tracing::warn!("Failed to remove {}: {}", path, e);
                    }
                }
                return Err(err.into());
            }
        };

        tracing::info!(
            "Stored {} upload {} for chronicle {}",
            mime,
            created.name,
            chronicle_id
        );
        self.get_file(chronicle_id, &file_id).await
    }

    pub async fn list_files(
        &self,
        chronicle_id: &ChronicleId,
        page: PageParams,
    ) -> ServiceResult<Page<FileRecord>> {
        page.validate()?;
        self.get_chronicle(chronicle_id).await?;

        let items = QueryBuilder::list_files(&self.db, chronicle_id, &page).await?;
        let total = QueryBuilder::count_files(&self.db, chronicle_id).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn get_file(&self, chronicle_id: &ChronicleId, file_id: &FileId) -> ServiceResult<FileRecord> {
        self.get_chronicle(chronicle_id).await?;

        QueryBuilder::find_file(&self.db, file_id)
            .await?
            .filter(|f| &f.chronicle_id == chronicle_id)
            .ok_or_else(|| ServiceError::NotFound(format!("File {} not found", file_id)))
    }

    /// Remove a file from a chronicle and from disk. Refused once the
    /// chronicle has compositions.
    pub async fn delete_file(&self, chronicle_id: &ChronicleId, file_id: &FileId) -> ServiceResult<()> {
        let _guard = self.locks.acquire(chronicle_id).await;
        let file = self.get_file(chronicle_id, file_id).await?;
        self.ensure_files_mutable(chronicle_id).await?;

        QueryBuilder::delete_file(&self.db, file_id).await?;
        self.uploads.remove(&file).await;

        tracing::info!("Deleted file {} of chronicle {}", file_id, chronicle_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str, description: &str) -> ChronicleInput {
        ChronicleInput {
            title: title.to_string(),
            description: description.to_string(),
            language: None,
        }
    }

    #[test]
    fn test_input_validation() {
        assert!(input("Walk", "Morning walk").validate().is_ok());
        assert!(input("", "x").validate().is_err());
        assert!(input("   ", "x").validate().is_err());
        assert!(input(&"a".repeat(256), "x").validate().is_err());
        assert!(input(&"ä".repeat(255), "x").validate().is_ok());
        assert!(input("Walk", "").validate().is_err());

        let mut blank_language = input("Walk", "x");
        blank_language.language = Some(" ".to_string());
        assert!(blank_language.validate().is_err());
    }

    #[test]
    fn test_language_is_optional_in_json() {
        let parsed: ChronicleInput =
            serde_json::from_str(r#"{"title": "Walk", "description": "Morning"}"#).unwrap();
        assert!(parsed.language.is_none());
    }
}
