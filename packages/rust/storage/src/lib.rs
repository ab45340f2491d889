//! libSQL record store for harvested courses.
//!
//! The [`Storage`] handle owns one database connection. It is opened
//! explicitly, passed by reference to whatever needs it, and closed with
//! [`Storage::close`]; there is no process-wide instance.
//!
//! Every write is an idempotent upsert on the entity's natural key:
//! - course: `course_number`
//! - problem set: `(course_id, remote_problem_url)`
//! - lecture / reading: `(course_id, remote_url)`

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Row, params};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use ocwharvest_shared::{CourseInfo, HarvestError, RecordId, Result};

fn db_err(e: impl std::fmt::Display) -> HarvestError {
    HarvestError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Course fields to persist.
#[derive(Debug, Clone, Copy)]
pub struct NewCourse<'a> {
    /// Natural key; falls back to the course slug when the manifest has none.
    pub course_number: &'a str,
    pub info: &'a CourseInfo,
    pub url: &'a str,
    pub download_url: &'a str,
    pub archive_sha256: Option<&'a str>,
}

/// A problem set and its solution text.
#[derive(Debug, Clone, Copy)]
pub struct NewProblemSet<'a> {
    pub course_id: &'a RecordId,
    pub problem_text: &'a str,
    pub solution_text: &'a str,
    pub remote_problem_url: &'a str,
    pub remote_solution_url: &'a str,
}

/// A lecture-notes or reading document.
#[derive(Debug, Clone, Copy)]
pub struct NewDocument<'a> {
    pub course_id: &'a RecordId,
    pub llm_text: &'a str,
    pub remote_url: &'a str,
}

/// Which document table a [`NewDocument`] goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Lecture,
    Reading,
}

impl DocumentKind {
    fn table(self) -> &'static str {
        match self {
            DocumentKind::Lecture => "lecture",
            DocumentKind::Reading => "reading",
        }
    }
}

// ---------------------------------------------------------------------------
// Stored records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CourseRecord {
    pub id: RecordId,
    pub course_number: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub download_url: String,
    pub topics: Vec<Vec<String>>,
    pub level: Vec<String>,
    pub learning_resource_types: Vec<String>,
    pub instructors: Vec<String>,
    pub year: String,
    pub term: String,
    pub archive_sha256: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProblemSetRecord {
    pub id: RecordId,
    pub course_id: RecordId,
    pub problem_text: String,
    pub solution_text: String,
    pub remote_problem_url: String,
    pub remote_solution_url: String,
    pub character_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub id: RecordId,
    pub course_id: RecordId,
    pub kind: DocumentKind,
    pub llm_text: String,
    pub remote_url: String,
    pub character_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Handle to the harvest database.
pub struct Storage {
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode, applying
    /// pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
        }

        let storage = Self::connect(path, false).await?;
        storage.run_migrations().await?;
        debug!(path = %path.display(), "database opened");
        Ok(storage)
    }

    /// Open an existing database at `path`; every write is rejected.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(HarvestError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;
        Ok(Self { db, conn, readonly })
    }

    /// Release the connection and database handle.
    pub fn close(self) {
        let Self { db, conn, .. } = self;
        drop(conn);
        drop(db);
        debug!("database closed");
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    HarvestError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, 0 before the first migration.
    pub async fn get_schema_version(&self) -> u32 {
        let Ok(mut rows) = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await
        else {
            return 0;
        };

        match rows.next().await {
            Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
            _ => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(HarvestError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Courses
    // -----------------------------------------------------------------------

    /// Insert or refresh a course, returning its id.
    ///
    /// An existing row with the same course number keeps its id and
    /// `created_at`; every other column is overwritten. A missing archive
    /// hash does not erase a stored one.
    pub async fn upsert_course(&self, course: &NewCourse<'_>) -> Result<RecordId> {
        self.check_writable()?;
        if course.course_number.trim().is_empty() {
            return Err(HarvestError::validation("course number is empty"));
        }

        let now = Utc::now().to_rfc3339();
        let info = course.info;
        self.conn
            .execute(
                "INSERT INTO course (id, course_number, title, description, url, download_url,
                                     topics, level, learning_resource_types, instructors,
                                     year, term, archive_sha256, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(course_number) DO UPDATE SET
                   title = excluded.title,
                   description = excluded.description,
                   url = excluded.url,
                   download_url = excluded.download_url,
                   topics = excluded.topics,
                   level = excluded.level,
                   learning_resource_types = excluded.learning_resource_types,
                   instructors = excluded.instructors,
                   year = excluded.year,
                   term = excluded.term,
                   archive_sha256 = COALESCE(excluded.archive_sha256, course.archive_sha256),
                   updated_at = excluded.updated_at",
                params![
                    RecordId::new().to_string(),
                    course.course_number,
                    info.course_title.as_str(),
                    info.course_description.as_str(),
                    course.url,
                    course.download_url,
                    to_json(&info.topics)?,
                    to_json(&info.level)?,
                    to_json(&info.learning_resource_types)?,
                    to_json(&info.instructors)?,
                    info.year.as_str(),
                    info.term.as_str(),
                    course.archive_sha256,
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        let id = self
            .course_id_by_number(course.course_number)
            .await?
            .ok_or_else(|| {
                HarvestError::Storage(format!("course {} vanished after upsert", course.course_number))
            })?;
        debug!(course_number = course.course_number, %id, "course stored");
        Ok(id)
    }

    async fn course_id_by_number(&self, course_number: &str) -> Result<Option<RecordId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM course WHERE course_number = ?1",
                params![course_number],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(parse_id(&row.get::<String>(0).map_err(db_err)?)?)),
            None => Ok(None),
        }
    }

    /// Look up a course by its course number.
    pub async fn get_course_by_number(&self, course_number: &str) -> Result<Option<CourseRecord>> {
        let sql = format!("{COURSE_SELECT} WHERE course_number = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![course_number])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_course(&row)?)),
            None => Ok(None),
        }
    }

    /// All courses, ordered by course number.
    pub async fn list_courses(&self) -> Result<Vec<CourseRecord>> {
        let sql = format!("{COURSE_SELECT} ORDER BY course_number");
        let mut rows = self.conn.query(&sql, params![]).await.map_err(db_err)?;

        let mut courses = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            courses.push(row_to_course(&row)?);
        }
        Ok(courses)
    }

    // -----------------------------------------------------------------------
    // Problem sets
    // -----------------------------------------------------------------------

    /// Insert or refresh a problem set, returning its id.
    ///
    /// `character_count` is the number of characters in the problem and
    /// solution text combined.
    pub async fn upsert_problem_set(&self, set: &NewProblemSet<'_>) -> Result<RecordId> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let character_count = (set.problem_text.chars().count() + set.solution_text.chars().count()) as i64;

        self.conn
            .execute(
                "INSERT INTO problem_set (id, course_id, problem_text, solution_text,
                                          remote_problem_url, remote_solution_url,
                                          character_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(course_id, remote_problem_url) DO UPDATE SET
                   problem_text = excluded.problem_text,
                   solution_text = excluded.solution_text,
                   remote_solution_url = excluded.remote_solution_url,
                   character_count = excluded.character_count,
                   updated_at = excluded.updated_at",
                params![
                    RecordId::new().to_string(),
                    set.course_id.to_string(),
                    set.problem_text,
                    set.solution_text,
                    set.remote_problem_url,
                    set.remote_solution_url,
                    character_count,
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        self.id_by_natural_key(
            "SELECT id FROM problem_set WHERE course_id = ?1 AND remote_problem_url = ?2",
            set.course_id,
            set.remote_problem_url,
        )
        .await
    }

    /// Problem sets of a course, ordered by problem URL.
    pub async fn list_problem_sets(&self, course_id: &RecordId) -> Result<Vec<ProblemSetRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, course_id, problem_text, solution_text, remote_problem_url,
                        remote_solution_url, character_count, created_at, updated_at
                 FROM problem_set WHERE course_id = ?1 ORDER BY remote_problem_url",
                params![course_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        let mut sets = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            sets.push(ProblemSetRecord {
                id: parse_id(&row.get::<String>(0).map_err(db_err)?)?,
                course_id: parse_id(&row.get::<String>(1).map_err(db_err)?)?,
                problem_text: row.get::<String>(2).map_err(db_err)?,
                solution_text: row.get::<String>(3).map_err(db_err)?,
                remote_problem_url: row.get::<String>(4).map_err(db_err)?,
                remote_solution_url: row.get::<String>(5).map_err(db_err)?,
                character_count: row.get::<i64>(6).map_err(db_err)?,
                created_at: parse_time(&row.get::<String>(7).map_err(db_err)?)?,
                updated_at: parse_time(&row.get::<String>(8).map_err(db_err)?)?,
            });
        }
        Ok(sets)
    }

    // -----------------------------------------------------------------------
    // Lectures and readings
    // -----------------------------------------------------------------------

    /// Insert or refresh a lecture, returning its id.
    pub async fn upsert_lecture(&self, doc: &NewDocument<'_>) -> Result<RecordId> {
        self.upsert_document(DocumentKind::Lecture, doc).await
    }

    /// Insert or refresh a reading, returning its id.
    pub async fn upsert_reading(&self, doc: &NewDocument<'_>) -> Result<RecordId> {
        self.upsert_document(DocumentKind::Reading, doc).await
    }

    /// Insert or refresh a document of `kind`, returning its id.
    pub async fn upsert_document(&self, kind: DocumentKind, doc: &NewDocument<'_>) -> Result<RecordId> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let table = kind.table();

        let sql = format!(
            "INSERT INTO {table} (id, course_id, llm_text, remote_url, character_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(course_id, remote_url) DO UPDATE SET
               llm_text = excluded.llm_text,
               character_count = excluded.character_count,
               updated_at = excluded.updated_at"
        );
        self.conn
            .execute(
                &sql,
                params![
                    RecordId::new().to_string(),
                    doc.course_id.to_string(),
                    doc.llm_text,
                    doc.remote_url,
                    doc.llm_text.chars().count() as i64,
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        let lookup = format!("SELECT id FROM {table} WHERE course_id = ?1 AND remote_url = ?2");
        self.id_by_natural_key(&lookup, doc.course_id, doc.remote_url).await
    }

    /// Documents of `kind` for a course, ordered by remote URL.
    pub async fn list_documents(
        &self,
        kind: DocumentKind,
        course_id: &RecordId,
    ) -> Result<Vec<DocumentRecord>> {
        let sql = format!(
            "SELECT id, course_id, llm_text, remote_url, character_count, created_at, updated_at
             FROM {} WHERE course_id = ?1 ORDER BY remote_url",
            kind.table()
        );
        let mut rows = self
            .conn
            .query(&sql, params![course_id.to_string()])
            .await
            .map_err(db_err)?;

        let mut docs = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            docs.push(DocumentRecord {
                id: parse_id(&row.get::<String>(0).map_err(db_err)?)?,
                course_id: parse_id(&row.get::<String>(1).map_err(db_err)?)?,
                kind,
                llm_text: row.get::<String>(2).map_err(db_err)?,
                remote_url: row.get::<String>(3).map_err(db_err)?,
                character_count: row.get::<i64>(4).map_err(db_err)?,
                created_at: parse_time(&row.get::<String>(5).map_err(db_err)?)?,
                updated_at: parse_time(&row.get::<String>(6).map_err(db_err)?)?,
            });
        }
        Ok(docs)
    }

    async fn id_by_natural_key(&self, sql: &str, course_id: &RecordId, key: &str) -> Result<RecordId> {
        let mut rows = self
            .conn
            .query(sql, params![course_id.to_string(), key])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => parse_id(&row.get::<String>(0).map_err(db_err)?),
            None => Err(HarvestError::Storage(format!("record {key} vanished after upsert"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const COURSE_SELECT: &str = "SELECT id, course_number, title, description, url, download_url,
        topics, level, learning_resource_types, instructors, year, term,
        archive_sha256, created_at, updated_at
 FROM course";

fn row_to_course(row: &Row) -> Result<CourseRecord> {
    Ok(CourseRecord {
        id: parse_id(&row.get::<String>(0).map_err(db_err)?)?,
        course_number: row.get::<String>(1).map_err(db_err)?,
        title: row.get::<String>(2).map_err(db_err)?,
        description: row.get::<String>(3).map_err(db_err)?,
        url: row.get::<String>(4).map_err(db_err)?,
        download_url: row.get::<String>(5).map_err(db_err)?,
        topics: from_json(&row.get::<String>(6).map_err(db_err)?)?,
        level: from_json(&row.get::<String>(7).map_err(db_err)?)?,
        learning_resource_types: from_json(&row.get::<String>(8).map_err(db_err)?)?,
        instructors: from_json(&row.get::<String>(9).map_err(db_err)?)?,
        year: row.get::<String>(10).map_err(db_err)?,
        term: row.get::<String>(11).map_err(db_err)?,
        archive_sha256: row.get::<Option<String>>(12).map_err(db_err)?,
        created_at: parse_time(&row.get::<String>(13).map_err(db_err)?)?,
        updated_at: parse_time(&row.get::<String>(14).map_err(db_err)?)?,
    })
}

fn parse_id(raw: &str) -> Result<RecordId> {
    raw.parse()
        .map_err(|e| HarvestError::Storage(format!("invalid record id {raw:?}: {e}")))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| HarvestError::Storage(format!("invalid timestamp {raw:?}: {e}")))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(db_err)
}

fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| HarvestError::Storage(format!("invalid JSON column: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_db() -> PathBuf {
        std::env::temp_dir().join(format!("ocwh_test_{}.db", Uuid::now_v7()))
    }

    async fn test_storage() -> Storage {
        Storage::open(&temp_db()).await.expect("open test db")
    }

    fn dynamics() -> CourseInfo {
        CourseInfo {
            course_title: "Engineering Dynamics".into(),
            course_description: "Newtonian mechanics.".into(),
            year: "2011".into(),
            level: vec!["Undergraduate".into()],
            term: "Fall".into(),
            topics: vec![vec!["Engineering".into(), "Mechanical Engineering".into()]],
            instructors: vec!["Prof. J. Kim Vandiver".into()],
            primary_course_number: "2.003SC".into(),
            learning_resource_types: vec!["Lecture Notes".into()],
        }
    }

    async fn stored_course(storage: &Storage) -> RecordId {
        let info = dynamics();
        storage
            .upsert_course(&NewCourse {
                course_number: &info.primary_course_number,
                info: &info,
                url: "https://ocw.mit.edu/courses/2-003sc",
                download_url: "https://ocw.mit.edu/courses/2-003sc/2-003sc.zip",
                archive_sha256: Some("abc"),
            })
            .await
            .expect("upsert course")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
        storage.close();
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let path = temp_db();
        Storage::open(&path).await.expect("first open").close();
        let storage = Storage::open(&path).await.expect("second open");
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn course_upsert_is_idempotent_on_number() {
        let storage = test_storage().await;
        let first = stored_course(&storage).await;

        let mut info = dynamics();
        info.course_title = "Engineering Dynamics (revised)".into();
        let second = storage
            .upsert_course(&NewCourse {
                course_number: "2.003SC",
                info: &info,
                url: "https://ocw.mit.edu/courses/2-003sc",
                download_url: "https://ocw.mit.edu/courses/2-003sc/new.zip",
                archive_sha256: None,
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        let courses = storage.list_courses().await.unwrap();
        assert_eq!(courses.len(), 1);

        let course = storage.get_course_by_number("2.003SC").await.unwrap().unwrap();
        assert_eq!(course.title, "Engineering Dynamics (revised)");
        assert_eq!(course.download_url, "https://ocw.mit.edu/courses/2-003sc/new.zip");
        assert_eq!(course.archive_sha256.as_deref(), Some("abc"));
        assert_eq!(course.level, vec!["Undergraduate"]);
        assert_eq!(course.topics[0][1], "Mechanical Engineering");
        assert!(course.updated_at >= course.created_at);
    }

    #[tokio::test]
    async fn empty_course_number_is_rejected() {
        let storage = test_storage().await;
        let info = CourseInfo::default();
        let err = storage
            .upsert_course(&NewCourse {
                course_number: " ",
                info: &info,
                url: "u",
                download_url: "d",
                archive_sha256: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Validation { .. }));
    }

    #[tokio::test]
    async fn problem_set_upsert_counts_characters() {
        let storage = test_storage().await;
        let course_id = stored_course(&storage).await;

        let set = NewProblemSet {
            course_id: &course_id,
            problem_text: "Find x.",
            solution_text: "x = 2 ✓",
            remote_problem_url: "https://ocw.mit.edu/courses/2-003sc/hw01.pdf",
            remote_solution_url: "https://ocw.mit.edu/courses/2-003sc/hw01_sol.pdf",
        };
        let first = storage.upsert_problem_set(&set).await.unwrap();
        let second = storage
            .upsert_problem_set(&NewProblemSet {
                solution_text: "x = 2",
                ..set
            })
            .await
            .unwrap();
        assert_eq!(first, second);

        let sets = storage.list_problem_sets(&course_id).await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].solution_text, "x = 2");
        assert_eq!(sets[0].character_count, 12);
    }

    #[tokio::test]
    async fn lectures_and_readings_are_separate() {
        let storage = test_storage().await;
        let course_id = stored_course(&storage).await;

        let doc = NewDocument {
            course_id: &course_id,
            llm_text: "Lecture one",
            remote_url: "https://ocw.mit.edu/courses/2-003sc/lec1.pdf",
        };
        storage.upsert_lecture(&doc).await.unwrap();
        storage.upsert_lecture(&doc).await.unwrap();
        storage.upsert_reading(&doc).await.unwrap();

        let lectures = storage.list_documents(DocumentKind::Lecture, &course_id).await.unwrap();
        let readings = storage.list_documents(DocumentKind::Reading, &course_id).await.unwrap();
        assert_eq!(lectures.len(), 1);
        assert_eq!(readings.len(), 1);
        assert_eq!(lectures[0].character_count, 11);
        assert_eq!(readings[0].kind, DocumentKind::Reading);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let path = temp_db();
        let storage = Storage::open(&path).await.unwrap();
        let course_id = stored_course(&storage).await;
        storage.close();

        let readonly = Storage::open_readonly(&path).await.unwrap();
        let err = readonly
            .upsert_lecture(&NewDocument {
                course_id: &course_id,
                llm_text: "x",
                remote_url: "y",
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
        assert_eq!(readonly.list_courses().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        assert!(Storage::open_readonly(&temp_db()).await.is_err());
    }
}
