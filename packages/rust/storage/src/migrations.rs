//! Versioned schema for the harvest database.
//!
//! Forward-only: each migration runs once, in version order, when the
//! database is opened read-write.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: course, problem_set, lecture, reading",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS course (
    id                      TEXT PRIMARY KEY,
    course_number           TEXT NOT NULL UNIQUE,
    title                   TEXT NOT NULL,
    description             TEXT NOT NULL,
    url                     TEXT NOT NULL,
    download_url            TEXT NOT NULL,
    topics                  TEXT NOT NULL,  -- JSON array of topic paths
    level                   TEXT NOT NULL,  -- JSON array
    learning_resource_types TEXT NOT NULL,  -- JSON array
    instructors             TEXT NOT NULL,  -- JSON array
    year                    TEXT NOT NULL,
    term                    TEXT NOT NULL,
    archive_sha256          TEXT,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS problem_set (
    id                  TEXT PRIMARY KEY,
    course_id           TEXT NOT NULL REFERENCES course(id) ON DELETE CASCADE,
    problem_text        TEXT NOT NULL,
    solution_text       TEXT NOT NULL,
    remote_problem_url  TEXT NOT NULL,
    remote_solution_url TEXT NOT NULL,
    character_count     INTEGER NOT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    UNIQUE(course_id, remote_problem_url)
);

CREATE TABLE IF NOT EXISTS lecture (
    id              TEXT PRIMARY KEY,
    course_id       TEXT NOT NULL REFERENCES course(id) ON DELETE CASCADE,
    llm_text        TEXT NOT NULL,
    remote_url      TEXT NOT NULL,
    character_count INTEGER NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE(course_id, remote_url)
);

CREATE TABLE IF NOT EXISTS reading (
    id              TEXT PRIMARY KEY,
    course_id       TEXT NOT NULL REFERENCES course(id) ON DELETE CASCADE,
    llm_text        TEXT NOT NULL,
    remote_url      TEXT NOT NULL,
    character_count INTEGER NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE(course_id, remote_url)
);

CREATE INDEX IF NOT EXISTS idx_problem_set_course ON problem_set(course_id);
CREATE INDEX IF NOT EXISTS idx_lecture_course ON lecture(course_id);
CREATE INDEX IF NOT EXISTS idx_reading_course ON reading(course_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
