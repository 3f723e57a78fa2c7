/*
`Store` methods for dealing with the different kinds of login accounts.

Unames are globally unique across all schools; a clash with an account
belonging to *another* school gets the dedicated "account conflict"
wording so the form can distinguish it from a within-school duplicate.
*/
use std::collections::HashMap;

use tokio_postgres::{Row, Transaction};

use super::{Store, StoreError};
use crate::user::*;

fn base_user_from_row(row: &Row) -> Result<BaseUser, StoreError> {
    log::trace!("base_user_from_row( {:?} ) called", row);

    let role_str: &str = row.try_get("role")?;
    let bu = BaseUser {
        uname: row.try_get("uname")?,
        role: role_str.parse().map_err(StoreError::Invalid)?,
        salt: row.try_get("salt")?,
        email: row.try_get("email")?,
        school: row.try_get("school")?,
    };

    log::trace!("    ...base_user_from_row() returning {:?}", &bu);
    Ok(bu)
}

fn classes_from_json(text: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::Invalid(format!(
        "Stored class list unreadable: {}", &e
    )))
}

/// Check whether `uname` is already taken and by whom.
///
/// Used when inserting new users, mainly to ensure good error
/// messaging when a username is already in use.
async fn check_existing_user(
    t: &Transaction<'_>,
    uname: &str,
) -> Result<Option<(Role, Option<String>)>, StoreError> {
    log::trace!("check_existing_user( T, {:?} ) called.", uname);

    match t.query_opt(
        "SELECT role, school FROM users WHERE uname = $1",
        &[&uname]
    ).await? {
        None => Ok(None),
        Some(row) => {
            let role_str: &str = row.try_get("role")?;
            let role: Role = role_str.parse().map_err(StoreError::Invalid)?;
            let school: Option<String> = row.try_get("school")?;
            Ok(Some((role, school)))
        },
    }
}

/// The conflict error for an already-used uname, worded differently
/// when the holder belongs to a different school.
fn uname_conflict(
    uname: &str,
    extant: (Role, Option<String>),
    new_school: Option<&str>,
) -> StoreError {
    let (role, school) = extant;
    if school.as_deref() != new_school {
        StoreError::Conflict(format!(
            "Account conflict: uname {:?} is already registered to another school.",
            uname
        ))
    } else {
        StoreError::Conflict(format!(
            "Uname {:?} already exists with role {}.", uname, role
        ))
    }
}

impl Store {
    /// Inserts the `user::BaseUser` information into the `users` table.
    ///
    /// This is used by the `Store::insert_xxx()` methods to insert this
    /// part of the information. Returns the generated salt so the
    /// caller can hash the initial password with it.
    async fn insert_base_user(
        &self,
        t: &Transaction<'_>,
        uname: &str,
        email: &str,
        role: Role,
        school: Option<&str>,
    ) -> Result<String, StoreError> {
        log::trace!(
            "insert_base_user( T, {:?}, {:?}, {}, {:?} ) called.",
            uname, email, role, school
        );

        if let Some(extant) = check_existing_user(t, uname).await? {
            return Err(uname_conflict(uname, extant, school));
        }

        let salt = self.generate_salt();
        t.execute(
            "INSERT INTO users (uname, role, salt, email, school)
                VALUES ($1, $2, $3, $4, $5)",
            &[&uname, &role.to_string(), &salt, &email, &school]
        ).await?;

        Ok(salt)
    }

    pub async fn insert_super_admin(
        &self,
        uname: &str,
        email: &str,
    ) -> Result<String, StoreError> {
        log::trace!("Store::insert_super_admin( {:?}, {:?} ) called.", uname, email);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let salt = self.insert_base_user(&t, uname, email, Role::SuperAdmin, None).await?;

        t.commit().await.map_err(StoreError::from)?;
        log::trace!("Inserted super admin {:?} ({}).", uname, email);
        Ok(salt)
    }

    pub async fn insert_school_admin(
        &self,
        uname: &str,
        email: &str,
        school: &str,
    ) -> Result<String, StoreError> {
        log::trace!(
            "Store::insert_school_admin( {:?}, {:?}, {:?} ) called.",
            uname, email, school
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let salt = self.insert_base_user(
            &t, uname, email, Role::SchoolAdmin, Some(school)
        ).await?;

        t.commit().await.map_err(StoreError::from)?;
        log::trace!("Inserted school admin {:?} ({}) for {:?}.", uname, email, school);
        Ok(salt)
    }

    pub async fn insert_teacher(
        &self,
        uname: &str,
        email: &str,
        school: &str,
        name: &str,
        classes: &[String],
    ) -> Result<String, StoreError> {
        log::trace!(
            "Store::insert_teacher( {:?}, {:?}, {:?}, {:?}, {:?} ) called.",
            uname, email, school, name, classes
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let salt = self.insert_base_user(
            &t, uname, email, Role::Teacher, Some(school)
        ).await?;

        let classes_json = serde_json::to_string(classes)
            .map_err(|e| StoreError::Invalid(format!(
                "Unable to serialize class list: {}", &e
            )))?;
        t.execute(
            "INSERT INTO teachers (uname, name, classes)
                VALUES ($1, $2, $3)",
            &[&uname, &name, &classes_json]
        ).await?;

        t.commit().await.map_err(StoreError::from)?;
        log::trace!("Inserted teacher {:?} ({}, {}).", uname, name, email);
        Ok(salt)
    }

    /// A login account for a student record; the uname is the
    /// student's ID string.
    pub async fn insert_student_account(
        &self,
        uname: &str,
        email: &str,
        school: &str,
    ) -> Result<String, StoreError> {
        log::trace!(
            "Store::insert_student_account( {:?}, {:?}, {:?} ) called.",
            uname, email, school
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let salt = self.insert_base_user(
            &t, uname, email, Role::Student, Some(school)
        ).await?;

        t.commit().await.map_err(StoreError::from)?;
        log::trace!("Inserted student account {:?} for {:?}.", uname, school);
        Ok(salt)
    }

    pub async fn get_user_by_uname(
        &self,
        uname: &str,
    ) -> Result<Option<User>, StoreError> {
        log::trace!("Store::get_user_by_uname( {:?} ) called.", uname);

        let client = self.connect().await?;

        let row = match client.query_opt(
            "SELECT uname, role, salt, email, school FROM users WHERE uname = $1",
            &[&uname]
        ).await? {
            None => { return Ok(None); },
            Some(row) => row,
        };
        let base = base_user_from_row(&row)?;

        let user = match base.role {
            Role::SuperAdmin => base.into_super_admin(),
            Role::SchoolAdmin => base.into_school_admin(),
            Role::Student => base.into_student(),
            Role::Teacher => {
                let trow = client.query_opt(
                    "SELECT name, classes FROM teachers WHERE uname = $1",
                    &[&uname]
                ).await?;
                match trow {
                    None => {
                        return Err(StoreError::Invalid(format!(
                            "User {:?} has teacher role but no teacher record.",
                            uname
                        )));
                    },
                    Some(trow) => {
                        let name: String = trow.try_get("name")?;
                        let classes_text: &str = trow.try_get("classes")?;
                        let classes = classes_from_json(classes_text)?;
                        base.into_teacher(name, classes)
                    },
                }
            },
        };

        Ok(Some(user))
    }

    /// All accounts belonging to one school, keyed by uname.
    pub async fn get_users(
        &self,
        school: &str,
    ) -> Result<HashMap<String, BaseUser>, StoreError> {
        log::trace!("Store::get_users( {:?} ) called.", school);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT uname, role, salt, email, school FROM users WHERE school = $1",
            &[&school]
        ).await?;

        let mut map: HashMap<String, BaseUser> = HashMap::with_capacity(rows.len());
        for row in rows.iter() {
            let u = base_user_from_row(row)?;
            map.insert(u.uname.clone(), u);
        }

        Ok(map)
    }

    /// Replace a teacher's class assignments. The teacher must belong
    /// to `school`; anything else is NotFound.
    pub async fn set_teacher_classes(
        &self,
        school: &str,
        uname: &str,
        classes: &[String],
    ) -> Result<(), StoreError> {
        log::trace!(
            "Store::set_teacher_classes( {:?}, {:?}, {:?} ) called.",
            school, uname, classes
        );

        let classes_json = serde_json::to_string(classes)
            .map_err(|e| StoreError::Invalid(format!(
                "Unable to serialize class list: {}", &e
            )))?;

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE teachers SET classes = $3
                WHERE uname = $2
                AND uname IN (
                    SELECT uname FROM users
                        WHERE school = $1 AND role = 'teacher'
                )",
            &[&school, &uname, &classes_json]
        ).await?;

        if n == 0 {
            Err(StoreError::NotFound)
        } else {
            Ok(())
        }
    }

    /**
    Deletes a user from the database, regardless of role.

    It's not clever; it shotgun-deletes any teacher record for the
    uname before deleting the `users` row, rather than querying the
    role first and branching.
    */
    pub async fn delete_user(&self, uname: &str) -> Result<(), StoreError> {
        log::trace!("Store::delete_user( {:?} ) called.", uname);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        match t.execute("DELETE FROM teachers WHERE uname = $1", &[&uname]).await? {
            0 => {},
            1 => { log::trace!("{} teacher record deleted.", uname); },
            n => {
                log::warn!(
                    "Deleting single teacher {} record affected {} rows.",
                    uname, &n
                );
            },
        }

        let n = t.execute("DELETE FROM users WHERE uname = $1", &[&uname]).await?;

        if n == 0 {
            Err(StoreError::NotFound)
        } else {
            t.commit().await.map_err(StoreError::from)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::school::School;
    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    static TEACHERS: &[(&str, &str, &str)] = &[
        ("okafor", "okafor@kings.example", "Mr Okafor"),
        ("jenny", "jenny@kings.example", "Ms Jenny"),
    ];

    async fn with_schools(db: &Store) {
        db.ensure_db_schema().await.unwrap();
        db.insert_school(&School::new("kings".to_owned(), "Kings College".to_owned()))
            .await.unwrap();
        db.insert_school(&School::new("queens".to_owned(), "Queens College".to_owned()))
            .await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn insert_users() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        with_schools(&db).await;

        db.insert_super_admin("root", "root@scorbook.example").await.unwrap();
        db.insert_school_admin("prin", "prin@kings.example", "kings").await.unwrap();
        for (uname, email, name) in TEACHERS.iter() {
            db.insert_teacher(uname, email, "kings", name, &[]).await.unwrap();
        }

        let u = db.get_user_by_uname("prin").await.unwrap().unwrap();
        assert_eq!(u.role(), Role::SchoolAdmin);
        assert_eq!(u.school(), Some("kings"));

        let u = db.get_user_by_uname("okafor").await.unwrap().unwrap();
        match u {
            User::Teacher(ref t) => assert_eq!(t.name, "Mr Okafor"),
            ref x => panic!("expected Teacher, got {:?}", x),
        }

        let umap = db.get_users("kings").await.unwrap();
        assert_eq!(umap.len(), 3);
        assert!(!umap.contains_key("root"));

        for (uname, ..) in TEACHERS.iter() {
            db.delete_user(uname).await.unwrap();
        }
        db.delete_user("prin").await.unwrap();
        db.delete_user("root").await.unwrap();

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn uname_conflicts() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        with_schools(&db).await;

        db.insert_teacher("okafor", "okafor@kings.example", "kings", "Mr Okafor", &[])
            .await.unwrap();

        // Same school: plain duplicate.
        let e = db.insert_teacher("okafor", "x@kings.example", "kings", "Impostor", &[])
            .await.unwrap_err();
        match e {
            StoreError::Conflict(ref msg) => assert!(!msg.contains("another school")),
            ref x => panic!("expected Conflict, got {:?}", x),
        }

        // Different school: the dedicated account-conflict wording.
        let e = db.insert_teacher("okafor", "x@queens.example", "queens", "Impostor", &[])
            .await.unwrap_err();
        match e {
            StoreError::Conflict(ref msg) => assert!(msg.contains("another school")),
            ref x => panic!("expected Conflict, got {:?}", x),
        }

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn class_assignment_is_tenant_scoped() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        with_schools(&db).await;

        db.insert_teacher("okafor", "okafor@kings.example", "kings", "Mr Okafor", &[])
            .await.unwrap();

        db.set_teacher_classes("kings", "okafor", &["JSS1".to_owned()])
            .await.unwrap();

        // Another school can't touch him; looks like he doesn't exist.
        assert_eq!(
            db.set_teacher_classes("queens", "okafor", &[]).await.unwrap_err(),
            StoreError::NotFound
        );

        let u = db.get_user_by_uname("okafor").await.unwrap().unwrap();
        match u {
            User::Teacher(ref t) => assert!(t.teaches("JSS1")),
            ref x => panic!("expected Teacher, got {:?}", x),
        }

        db.nuke_database().await.unwrap();
    }
}
