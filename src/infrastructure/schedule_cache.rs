use crate::domain::models::ScheduleDocument;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_database;
use chrono::{NaiveDate, Utc};
use rusqlite::{OptionalExtension, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Local copy of saved days, keyed by date. Payloads use the same JSON shape
/// as the remote service.
pub trait ScheduleCacheRepository: Send + Sync {
    fn load(&self, date: NaiveDate) -> Result<Option<ScheduleDocument>, InfraError>;
    fn save(&self, document: &ScheduleDocument) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteScheduleCacheRepository {
    db_path: PathBuf,
}

impl SqliteScheduleCacheRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }
}

impl ScheduleCacheRepository for SqliteScheduleCacheRepository {
    fn load(&self, date: NaiveDate) -> Result<Option<ScheduleDocument>, InfraError> {
        let connection = open_database(&self.db_path)?;
        let payload: Option<String> = connection
            .query_row(
                "SELECT payload FROM schedule_cache WHERE date = ?1",
                params![date.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        let document = serde_json::from_str::<ScheduleDocument>(&payload).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid cached schedule for {date}: {error}"))
        })?;
        Ok(Some(document))
    }

    fn save(&self, document: &ScheduleDocument) -> Result<(), InfraError> {
        let payload = serde_json::to_string(document)?;
        let connection = open_database(&self.db_path)?;
        connection.execute(
            "INSERT INTO schedule_cache (date, payload, saved_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(date) DO UPDATE SET
               payload = excluded.payload,
               saved_at = excluded.saved_at",
            params![document.date.to_string(), payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryScheduleCacheRepository {
    documents: Mutex<HashMap<NaiveDate, ScheduleDocument>>,
}

impl ScheduleCacheRepository for InMemoryScheduleCacheRepository {
    fn load(&self, date: NaiveDate) -> Result<Option<ScheduleDocument>, InfraError> {
        let documents = self
            .documents
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("schedule cache lock poisoned: {error}")))?;
        Ok(documents.get(&date).cloned())
    }

    fn save(&self, document: &ScheduleDocument) -> Result<(), InfraError> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("schedule cache lock poisoned: {error}")))?;
        documents.insert(document.date, document.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{TimeOfDay, TimeboxRecord};
    use crate::infrastructure::storage::initialize_database;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_DB.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "dayplan-cache-tests-{}-{}.sqlite",
                std::process::id(),
                sequence
            ));
            initialize_database(&path).expect("initialize database");
            Self { path }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn document(date: NaiveDate, label: &str) -> ScheduleDocument {
        let saved_at = Utc::now();
        ScheduleDocument {
            date,
            created_at: saved_at,
            updated_at: saved_at,
            tasks: vec![TimeboxRecord {
                id: "box-1".to_string(),
                start_time: TimeOfDay::saturating(9, 0),
                end_time: TimeOfDay::saturating(10, 0),
                task: label.to_string(),
            }],
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, day).expect("valid date")
    }

    #[test]
    fn sqlite_cache_roundtrip_and_overwrite() {
        let database = TempDatabase::new();
        let repository = SqliteScheduleCacheRepository::new(&database.path);

        assert_eq!(repository.load(date(16)).expect("load empty"), None);

        repository.save(&document(date(16), "Write")).expect("save");
        repository.save(&document(date(16), "Rewrite")).expect("overwrite");
        repository.save(&document(date(17), "Other")).expect("save other day");

        let loaded = repository.load(date(16)).expect("load").expect("cached");
        assert_eq!(loaded.tasks[0].task, "Rewrite");
        let other = repository.load(date(17)).expect("load").expect("cached");
        assert_eq!(other.tasks[0].task, "Other");
    }

    #[test]
    fn sqlite_cache_reports_corrupt_payload() {
        let database = TempDatabase::new();
        let connection = open_database(&database.path).expect("open");
        connection
            .execute(
                "INSERT INTO schedule_cache (date, payload, saved_at) VALUES ('2026-02-16', 'not json', 'x')",
                [],
            )
            .expect("insert corrupt row");

        let repository = SqliteScheduleCacheRepository::new(&database.path);
        assert!(matches!(
            repository.load(date(16)),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn in_memory_cache_is_keyed_by_date() {
        let repository = InMemoryScheduleCacheRepository::default();
        repository.save(&document(date(16), "Write")).expect("save");
        assert!(repository.load(date(16)).expect("load").is_some());
        assert!(repository.load(date(18)).expect("load").is_none());
    }
}
