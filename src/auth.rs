/*!
The auth database: password hashes and issued session keys.

This is kept separate from the data store so that credential material
never travels with domain rows. Passwords are stored as hex-encoded
SHA-256 of `salt + password` (the salt lives with the user row in the
data DB); a successful login issues an opaque session key that
subsequent requests present in the `x-scorbook-key` header.

```sql
CREATE TABLE passwds (
    uname TEXT PRIMARY KEY,
    hash  TEXT NOT NULL
);

CREATE TABLE keys (
    uname  TEXT PRIMARY KEY,
    key    TEXT NOT NULL,
    issued TIMESTAMPTZ NOT NULL
);
```
*/
use std::fmt::Write;

use rand::{Rng, distributions};
use sha2::{Digest, Sha256};
use tokio_postgres::{Client, NoTls};

const KEY_LENGTH: usize = 32;
const KEY_CHARS: &str =
"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'passwds'",
        "CREATE TABLE passwds (
            uname TEXT PRIMARY KEY,
            hash  TEXT NOT NULL
        )",
        "DROP TABLE passwds",
    ),
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'keys'",
        "CREATE TABLE keys (
            uname  TEXT PRIMARY KEY,
            key    TEXT NOT NULL,
            issued TIMESTAMPTZ NOT NULL
        )",
        "DROP TABLE keys",
    ),
];

#[derive(Debug, PartialEq)]
pub struct AuthError(String);

impl AuthError {
    fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<tokio_postgres::error::Error> for AuthError {
    fn from(e: tokio_postgres::error::Error) -> AuthError {
        let mut s = format!("Auth DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut s, "; {}", dbe).unwrap();
        }
        AuthError(s)
    }
}

/// Outcome of a credential or key check.
#[derive(Debug, PartialEq)]
pub enum AuthResult {
    /// Check passed (no key requested).
    Ok,
    /// Check passed; here's your new session key.
    Key(String),
    BadPassword,
    NoSuchUser,
    InvalidKey,
}

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(2 * digest.len());
    for byte in digest.iter() {
        write!(&mut hex, "{:02x}", byte).unwrap();
    }
    hex
}

pub struct Db {
    connection_string: String,
    key_chars: Vec<char>,
    key_length: usize,
}

impl Db {
    pub fn new(connection_string: String) -> Self {
        log::trace!("auth::Db::new( {:?} ) called.", &connection_string);

        Self {
            connection_string,
            key_chars: KEY_CHARS.chars().collect(),
            key_length: KEY_LENGTH,
        }
    }

    fn generate_key(&self) -> String {
        // self.key_chars is set from a nonempty constant.
        let dist = distributions::Slice::new(&self.key_chars).unwrap();
        let rng = rand::thread_rng();
        rng.sample_iter(&dist)
            .take(self.key_length)
            .collect()
    }

    async fn connect(&self) -> Result<Client, AuthError> {
        log::trace!("auth::Db::connect() called.");

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Auth DB connection error: {}", &e);
                    }
                });
                Ok(client)
            },
            Err(e) => Err(AuthError::from(e).annotate("Unable to connect")),
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), AuthError> {
        log::trace!("auth::Db::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| AuthError::from(e)
                .annotate("Auth DB unable to begin transaction"))?;

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
            .map_err(|e| AuthError::from(e)
                .annotate("Error committing transaction"))
    }

    pub async fn add_user(
        &self,
        uname: &str,
        password: &str,
        salt: &str,
    ) -> Result<(), AuthError> {
        log::trace!("auth::Db::add_user( {:?}, [ password ], {:?} ) called.", uname, salt);

        let client = self.connect().await?;
        let hash = hash_password(password, salt);
        client.execute(
            "INSERT INTO passwds (uname, hash) VALUES ($1, $2)",
            &[&uname, &hash]
        ).await?;

        Ok(())
    }

    pub async fn set_password(
        &self,
        uname: &str,
        password: &str,
        salt: &str,
    ) -> Result<(), AuthError> {
        log::trace!("auth::Db::set_password( {:?}, [ password ], {:?} ) called.", uname, salt);

        let client = self.connect().await?;
        let hash = hash_password(password, salt);
        let n = client.execute(
            "UPDATE passwds SET hash = $2 WHERE uname = $1",
            &[&uname, &hash]
        ).await?;

        if n == 0 {
            Err(AuthError(format!("No auth record for uname {:?}.", uname)))
        } else {
            Ok(())
        }
    }

    pub async fn delete_user(&self, uname: &str) -> Result<(), AuthError> {
        log::trace!("auth::Db::delete_user( {:?} ) called.", uname);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;
        t.execute("DELETE FROM keys WHERE uname = $1", &[&uname]).await?;
        t.execute("DELETE FROM passwds WHERE uname = $1", &[&uname]).await?;
        t.commit().await?;

        Ok(())
    }

    pub async fn check_password(
        &self,
        uname: &str,
        password: &str,
        salt: &str,
    ) -> Result<AuthResult, AuthError> {
        log::trace!("auth::Db::check_password( {:?}, [ password ], {:?} ) called.", uname, salt);

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT hash FROM passwds WHERE uname = $1",
            &[&uname]
        ).await?;

        let stored: String = match row {
            None => { return Ok(AuthResult::NoSuchUser); },
            Some(row) => row.try_get("hash")?,
        };

        if stored == hash_password(password, salt) {
            Ok(AuthResult::Ok)
        } else {
            Ok(AuthResult::BadPassword)
        }
    }

    /// Check the password and, on success, issue (and store) a fresh
    /// session key, replacing any previous one.
    pub async fn check_password_and_issue_key(
        &self,
        uname: &str,
        password: &str,
        salt: &str,
    ) -> Result<AuthResult, AuthError> {
        log::trace!(
            "auth::Db::check_password_and_issue_key( {:?}, [ password ], {:?} ) called.",
            uname, salt
        );

        match self.check_password(uname, password, salt).await? {
            AuthResult::Ok => { /* Fall through to key issue. */ },
            x => { return Ok(x); },
        }

        let key = self.generate_key();
        let now = time::OffsetDateTime::now_utc();
        let client = self.connect().await?;
        client.execute(
            "INSERT INTO keys (uname, key, issued) VALUES ($1, $2, $3)
                ON CONFLICT (uname) DO UPDATE SET
                    key = EXCLUDED.key,
                    issued = EXCLUDED.issued",
            &[&uname, &key, &now]
        ).await?;

        Ok(AuthResult::Key(key))
    }

    pub async fn check_key(
        &self,
        uname: &str,
        key: &str,
    ) -> Result<AuthResult, AuthError> {
        log::trace!("auth::Db::check_key( {:?}, [ key ] ) called.", uname);

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT key FROM keys WHERE uname = $1",
            &[&uname]
        ).await?;

        let stored: String = match row {
            None => { return Ok(AuthResult::InvalidKey); },
            Some(row) => row.try_get("key")?,
        };

        if stored == key {
            Ok(AuthResult::Ok)
        } else {
            Ok(AuthResult::InvalidKey)
        }
    }

    /// Drop a user's session key, ending the session.
    pub async fn clear_key(&self, uname: &str) -> Result<(), AuthError> {
        log::trace!("auth::Db::clear_key( {:?} ) called.", uname);

        let client = self.connect().await?;
        client.execute("DELETE FROM keys WHERE uname = $1", &[&uname]).await?;

        Ok(())
    }

    /**
    Drop all auth tables to fully reset database state.

    Only meant for cleanup after testing.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), AuthError> {
        log::trace!("auth::Db::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &AuthError::from(e));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    /*!
    The `#[ignore]`d tests here assume a local Postgres instance with

    ```text
    user: scorbook_test
    password: scorbook_test
    database: scorbook_auth_test
    ```

    Run them with `cargo test -- --ignored`.
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    static TEST_CONNECTION: &str =
        "host=localhost user=scorbook_test password='scorbook_test' dbname=scorbook_auth_test";

    #[test]
    fn hashing_is_salted_and_stable() {
        ensure_logging();

        let h1 = hash_password("hunter2", "abcd");
        let h2 = hash_password("hunter2", "abcd");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.bytes().all(|b| b.is_ascii_hexdigit()));

        assert_ne!(h1, hash_password("hunter2", "dcba"));
        assert_ne!(h1, hash_password("hunter3", "abcd"));
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn password_and_key_cycle() {
        ensure_logging();

        let db = Db::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        db.add_user("ada", "hunter2", "salt").await.unwrap();

        assert_eq!(
            db.check_password("ada", "hunter2", "salt").await.unwrap(),
            AuthResult::Ok
        );
        assert_eq!(
            db.check_password("ada", "wrong", "salt").await.unwrap(),
            AuthResult::BadPassword
        );
        assert_eq!(
            db.check_password("nobody", "hunter2", "salt").await.unwrap(),
            AuthResult::NoSuchUser
        );

        let key = match db.check_password_and_issue_key("ada", "hunter2", "salt").await.unwrap() {
            AuthResult::Key(k) => k,
            x => panic!("expected a key, got {:?}", x),
        };
        assert_eq!(db.check_key("ada", &key).await.unwrap(), AuthResult::Ok);
        assert_eq!(
            db.check_key("ada", "bogus").await.unwrap(),
            AuthResult::InvalidKey
        );

        db.clear_key("ada").await.unwrap();
        assert_eq!(
            db.check_key("ada", &key).await.unwrap(),
            AuthResult::InvalidKey
        );

        db.nuke_database().await.unwrap();
    }
}
