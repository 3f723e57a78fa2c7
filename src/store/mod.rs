/*!
Database interaction module.

One Postgres database holds all domain rows; every table that contains
per-school data carries the owning school's id, and every query in the
submodules filters on it. The schema:

  * `schools` — one row per tenant, with its term calendar, test/exam
    structure, grade thresholds, and operation toggles.
  * `users` / `teachers` — login accounts; teachers get a second row
    with display name and assigned classes.
  * `students` — student records keyed `(school, id)`; subject lists
    and score maps are JSON text columns.
  * `publications` / `published_results` — the per-class publication
    flag and the frozen per-student result snapshots.
  * `reports` — user-submitted issue reports.

Submodules add `Store` methods per concern; this module owns the
connection plumbing, schema bootstrap, and error types.
*/
use std::fmt::Write;

use rand::{Rng, distributions};
use tokio_postgres::{Client, NoTls};

pub mod publish;
pub mod reports;
pub mod schools;
pub mod students;
pub mod users;

const DEFAULT_SALT_LENGTH: usize = 4;
const DEFAULT_SALT_CHARS: &str =
"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'schools'",
        "CREATE TABLE schools (
            id      TEXT PRIMARY KEY,
            name    TEXT NOT NULL,
            logo    TEXT,
            operations_enabled          BOOLEAN NOT NULL DEFAULT TRUE,
            teacher_operations_enabled  BOOLEAN NOT NULL DEFAULT TRUE,
            current_term    TEXT NOT NULL DEFAULT 'First Term',
            academic_year   TEXT NOT NULL DEFAULT '',
            max_tests       SMALLINT NOT NULL DEFAULT 3,
            test_max        REAL NOT NULL DEFAULT 10,
            exam_mode       TEXT NOT NULL DEFAULT 'combined',
            objective_max   REAL NOT NULL DEFAULT 0,
            theory_max      REAL NOT NULL DEFAULT 0,
            exam_max        REAL NOT NULL DEFAULT 70,
            grade_a_min     REAL NOT NULL DEFAULT 70,
            grade_b_min     REAL NOT NULL DEFAULT 60,
            grade_c_min     REAL NOT NULL DEFAULT 50,
            grade_d_min     REAL NOT NULL DEFAULT 40,
            pass_mark       REAL NOT NULL DEFAULT 50
        )",
        "DROP TABLE schools",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'users'",
        "CREATE TABLE users (
            uname   TEXT PRIMARY KEY,
            role    TEXT NOT NULL,
            salt    TEXT NOT NULL,
            email   TEXT NOT NULL DEFAULT '',
            school  TEXT REFERENCES schools(id)   /* NULL for super admins */
        )",
        "DROP TABLE users",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'teachers'",
        "CREATE TABLE teachers (
            uname   TEXT PRIMARY KEY REFERENCES users(uname),
            name    TEXT NOT NULL,
            classes TEXT NOT NULL DEFAULT '[]'   /* JSON list of class names */
        )",
        "DROP TABLE teachers",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'students'",
        "CREATE TABLE students (
            school      TEXT NOT NULL REFERENCES schools(id),
            id          TEXT NOT NULL,      /* YY/NNN/CLASS */
            firstname   TEXT NOT NULL,
            classname   TEXT NOT NULL,
            term        TEXT NOT NULL DEFAULT 'First Term',
            subjects    TEXT NOT NULL DEFAULT '[]',  /* JSON list */
            scores      TEXT NOT NULL DEFAULT '{}',  /* JSON map subject -> entry */
            comment     TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (school, id)
        )",
        "DROP TABLE students",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'publications'",
        "CREATE TABLE publications (
            school          TEXT NOT NULL REFERENCES schools(id),
            classname       TEXT NOT NULL,
            term            TEXT NOT NULL,
            published       BOOLEAN NOT NULL DEFAULT FALSE,
            teacher         TEXT,
            published_at    TIMESTAMPTZ,
            PRIMARY KEY (school, classname, term)
        )",
        "DROP TABLE publications",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'published_results'",
        "CREATE TABLE published_results (
            school          TEXT NOT NULL REFERENCES schools(id),
            student         TEXT NOT NULL,
            term            TEXT NOT NULL,
            classname       TEXT NOT NULL,
            firstname       TEXT NOT NULL,
            subjects        TEXT NOT NULL,
            scores          TEXT NOT NULL,
            comment         TEXT NOT NULL DEFAULT '',
            total           REAL NOT NULL,
            average         REAL NOT NULL,
            percent         REAL NOT NULL,
            grade           TEXT NOT NULL,
            passed          BOOLEAN NOT NULL,
            class_position  INTEGER NOT NULL,
            published_at    TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (school, student, term)
        )",
        "DROP TABLE published_results",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'reports'",
        "CREATE TABLE reports (
            id          BIGSERIAL PRIMARY KEY,
            uname       TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'new',
            body        TEXT NOT NULL,
            submitted   TIMESTAMPTZ NOT NULL
        )",
        "DROP TABLE reports",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError(pub(crate) String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("Data DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut s, "; {}", dbe).unwrap();
        }
        DbError(s)
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

/**
Store-level error taxonomy.

`NotFound` deliberately carries no detail: a row owned by another
school and a row that doesn't exist must be indistinguishable to the
caller. `Conflict` covers uname and `(school, student_id)` collisions;
`Invalid` is bad input; `Locked` means a toggle or publication gate is
blocking the write.
*/
#[derive(Debug, PartialEq)]
pub enum StoreError {
    Db(DbError),
    NotFound,
    Conflict(String),
    Invalid(String),
    Locked(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StoreError::Db(e) => write!(f, "database error: {}", e),
            StoreError::NotFound => write!(f, "no such record"),
            StoreError::Conflict(s) => write!(f, "{}", s),
            StoreError::Invalid(s) => write!(f, "{}", s),
            StoreError::Locked(s) => write!(f, "{}", s),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> StoreError { StoreError::Db(e) }
}

impl From<tokio_postgres::error::Error> for StoreError {
    fn from(e: tokio_postgres::error::Error) -> StoreError {
        StoreError::Db(DbError::from(e))
    }
}

pub struct Store {
    connection_string: String,
    salt_chars: Vec<char>,
    salt_length: usize,
}

impl Store {
    pub fn new(connection_string: String) -> Self {
        log::trace!("Store::new( {:?} ) called.", &connection_string);

        let salt_chars: Vec<char> = DEFAULT_SALT_CHARS.chars().collect();
        let salt_length = DEFAULT_SALT_LENGTH;

        Self { connection_string, salt_chars, salt_length }
    }

    /// Generate a new user salt based on the current values of
    /// self.salt_chars and self.salt_length.
    pub(crate) fn generate_salt(&self) -> String {
        // self.salt_chars should never have zero length.
        let dist = distributions::Slice::new(&self.salt_chars).unwrap();
        let rng = rand::thread_rng();
        let new_salt: String = rng.sample_iter(&dist)
            .take(self.salt_length)
            .collect();
        new_salt
    }

    pub(crate) async fn connect(&self) -> Result<Client, DbError> {
        log::trace!(
            "Store::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Data DB connection error: {}", &e);
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look
    at the ERROR level log output when testing to ensure this method did
    its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    /*!
    The `#[ignore]`d store tests in the submodules assume a local
    Postgres instance with

    ```text
    user: scorbook_test
    password: scorbook_test
    database: scorbook_store_test
    ```

    Run them with `cargo test -- --ignored`.
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub(crate) static TEST_CONNECTION: &str =
        "host=localhost user=scorbook_test password='scorbook_test' dbname=scorbook_store_test";

    /**
    This function is for getting the database back in a blank slate
    state if a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_store -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_store() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn create_store() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }
}
