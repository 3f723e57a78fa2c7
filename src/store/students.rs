/*
`Store` methods for student records.

Everything here takes the acting school's id and filters on it; a
record owned by another school is indistinguishable from a missing one
(`StoreError::NotFound`). The duplicate-ID contract: `(school, id)` is
the primary key, so the same ID string under a different school is
fine.
*/
use std::collections::HashMap;

use tokio_postgres::{Row, Transaction};

use super::{Store, StoreError};
use crate::school::Term;
use crate::student::{Student, StudentId, SubjectScores};

pub(super) fn student_from_row(row: &Row) -> Result<Student, StoreError> {
    let term_str: &str = row.try_get("term")?;
    let subjects_text: &str = row.try_get("subjects")?;
    let scores_text: &str = row.try_get("scores")?;

    let subjects: Vec<String> = serde_json::from_str(subjects_text)
        .map_err(|e| StoreError::Invalid(format!(
            "Stored subject list unreadable: {}", &e
        )))?;
    let scores: HashMap<String, SubjectScores> = serde_json::from_str(scores_text)
        .map_err(|e| StoreError::Invalid(format!(
            "Stored score map unreadable: {}", &e
        )))?;

    let stud = Student {
        school: row.try_get("school")?,
        id: row.try_get("id")?,
        firstname: row.try_get("firstname")?,
        classname: row.try_get("classname")?,
        term: term_str.parse().map_err(StoreError::Invalid)?,
        subjects,
        scores,
        comment: row.try_get("comment")?,
    };

    Ok(stud)
}

/// Whether this class+term is currently published (and therefore
/// locked against score writes). Checked inside the caller's
/// transaction so a concurrent publish can't slip between check and
/// write.
async fn published_in_tx(
    t: &Transaction<'_>,
    school: &str,
    classname: &str,
    term: Term,
) -> Result<bool, StoreError> {
    let row = t.query_opt(
        "SELECT published FROM publications
            WHERE school = $1 AND classname = $2 AND term = $3",
        &[&school, &classname, &term.to_string()]
    ).await?;

    match row {
        None => Ok(false),
        Some(row) => Ok(row.try_get("published")?),
    }
}

impl Store {
    pub async fn insert_student(&self, stud: &Student) -> Result<(), StoreError> {
        log::trace!(
            "Store::insert_student( {:?} / {:?} ) called.",
            &stud.school, &stud.id
        );

        // The ID must be well-formed, and only its canonical spelling
        // hits the table; "26/1/jss1" and "26/001/JSS1" are the same
        // record.
        let sid: StudentId = stud.id.parse().map_err(StoreError::Invalid)?;
        let id = sid.to_string();
        if stud.firstname.trim().is_empty() {
            return Err(StoreError::Invalid("Student name must not be blank.".to_owned()));
        }
        if stud.classname.trim().is_empty() {
            return Err(StoreError::Invalid("Class name must not be blank.".to_owned()));
        }

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let extant = t.query_opt(
            "SELECT id FROM students WHERE school = $1 AND id = $2",
            &[&stud.school, &id]
        ).await?;
        if extant.is_some() {
            return Err(StoreError::Conflict(format!(
                "Student ID {:?} is already in use at this school.", &id
            )));
        }

        let subjects_json = serde_json::to_string(&stud.subjects)
            .map_err(|e| StoreError::Invalid(format!(
                "Unable to serialize subject list: {}", &e
            )))?;
        let scores_json = serde_json::to_string(&stud.scores)
            .map_err(|e| StoreError::Invalid(format!(
                "Unable to serialize score map: {}", &e
            )))?;

        t.execute(
            "INSERT INTO students
                (school, id, firstname, classname, term, subjects, scores, comment)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &stud.school, &id, &stud.firstname, &stud.classname,
                &stud.term.to_string(), &subjects_json, &scores_json,
                &stud.comment,
            ]
        ).await?;

        t.commit().await.map_err(StoreError::from)?;
        log::trace!("Inserted student {:?} at {:?}.", &id, &stud.school);
        Ok(())
    }

    pub async fn get_student(
        &self,
        school: &str,
        id: &str,
    ) -> Result<Student, StoreError> {
        log::trace!("Store::get_student( {:?}, {:?} ) called.", school, id);

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT * FROM students WHERE school = $1 AND id = $2",
            &[&school, &id]
        ).await?;

        match row {
            None => Err(StoreError::NotFound),
            Some(row) => student_from_row(&row),
        }
    }

    /// All of one class's students, ordered by ID for stable output.
    pub async fn get_class(
        &self,
        school: &str,
        classname: &str,
    ) -> Result<Vec<Student>, StoreError> {
        log::trace!("Store::get_class( {:?}, {:?} ) called.", school, classname);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM students
                WHERE school = $1 AND classname = $2
                ORDER BY id",
            &[&school, &classname]
        ).await?;

        let mut studs = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            studs.push(student_from_row(row)?);
        }
        Ok(studs)
    }

    /// The distinct class names present at one school.
    pub async fn get_classnames(&self, school: &str) -> Result<Vec<String>, StoreError> {
        log::trace!("Store::get_classnames( {:?} ) called.", school);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT DISTINCT classname FROM students
                WHERE school = $1 ORDER BY classname",
            &[&school]
        ).await?;

        let mut names = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            names.push(row.try_get("classname")?);
        }
        Ok(names)
    }

    /// Next free sequence number for a school's generated IDs.
    pub async fn next_student_seq(&self, school: &str) -> Result<u32, StoreError> {
        log::trace!("Store::next_student_seq( {:?} ) called.", school);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT id FROM students WHERE school = $1",
            &[&school]
        ).await?;

        let mut max_seq: u32 = 0;
        for row in rows.iter() {
            let id_text: &str = row.try_get("id")?;
            // Manually-assigned IDs that don't parse just don't count.
            if let Ok(sid) = id_text.parse::<StudentId>() {
                if sid.seq > max_seq {
                    max_seq = sid.seq;
                }
            }
        }

        Ok(max_seq + 1)
    }

    /**
    Overwrite a student's score map, comment, and term.

    Fails `Locked` if the student's class+term is currently published;
    score edits then require an explicit unpublish first. Range
    validation against the school's configured maxes is the caller's
    job (it needs the `School`), and happens before anything reaches
    here.
    */
    pub async fn save_scores(
        &self,
        school: &str,
        id: &str,
        term: Term,
        scores: &HashMap<String, SubjectScores>,
        comment: &str,
    ) -> Result<(), StoreError> {
        log::trace!(
            "Store::save_scores( {:?}, {:?}, {}, [ {} subjects ] ) called.",
            school, id, term, scores.len()
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let row = t.query_opt(
            "SELECT classname FROM students
                WHERE school = $1 AND id = $2 FOR UPDATE",
            &[&school, &id]
        ).await?;
        let classname: String = match row {
            None => { return Err(StoreError::NotFound); },
            Some(row) => row.try_get("classname")?,
        };

        if published_in_tx(&t, school, &classname, term).await? {
            return Err(StoreError::Locked(format!(
                "Scores for {} ({}) are published; unpublish before editing.",
                &classname, term
            )));
        }

        let scores_json = serde_json::to_string(scores)
            .map_err(|e| StoreError::Invalid(format!(
                "Unable to serialize score map: {}", &e
            )))?;
        t.execute(
            "UPDATE students SET scores = $3, comment = $4, term = $5
                WHERE school = $1 AND id = $2",
            &[&school, &id, &scores_json, &comment, &term.to_string()]
        ).await?;

        t.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    /// Update name/class/subjects without touching scores.
    pub async fn update_student_details(
        &self,
        school: &str,
        id: &str,
        firstname: &str,
        classname: &str,
        subjects: &[String],
    ) -> Result<(), StoreError> {
        log::trace!(
            "Store::update_student_details( {:?}, {:?}, {:?}, {:?} ) called.",
            school, id, firstname, classname
        );

        if firstname.trim().is_empty() {
            return Err(StoreError::Invalid("Student name must not be blank.".to_owned()));
        }

        let subjects_json = serde_json::to_string(subjects)
            .map_err(|e| StoreError::Invalid(format!(
                "Unable to serialize subject list: {}", &e
            )))?;

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE students SET firstname = $3, classname = $4, subjects = $5
                WHERE school = $1 AND id = $2",
            &[&school, &id, &firstname, &classname, &subjects_json]
        ).await?;

        if n == 0 {
            Err(StoreError::NotFound)
        } else {
            Ok(())
        }
    }

    pub async fn delete_student(
        &self,
        school: &str,
        id: &str,
    ) -> Result<(), StoreError> {
        log::trace!("Store::delete_student( {:?}, {:?} ) called.", school, id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        t.execute(
            "DELETE FROM published_results WHERE school = $1 AND student = $2",
            &[&school, &id]
        ).await?;
        let n = t.execute(
            "DELETE FROM students WHERE school = $1 AND id = $2",
            &[&school, &id]
        ).await?;

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

    fn stud(school: &str, id: &str, classname: &str) -> Student {
        Student {
            school: school.to_owned(),
            id: id.to_owned(),
            firstname: "Ada".to_owned(),
            classname: classname.to_owned(),
            term: Term::First,
            subjects: vec!["Maths".to_owned(), "English".to_owned()],
            scores: HashMap::new(),
            comment: String::new(),
        }
    }

    fn score(exam: f32) -> SubjectScores {
        SubjectScores {
            tests: vec![5.0],
            objective: None,
            theory: None,
            exam,
        }
    }

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
    async fn duplicate_ids_scoped_to_school() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        with_schools(&db).await;

        db.insert_student(&stud("kings", "26/001/JSS1", "JSS1")).await.unwrap();

        // Same ID, same school: conflict.
        match db.insert_student(&stud("kings", "26/001/JSS1", "JSS1")).await {
            Err(StoreError::Conflict(_)) => {},
            x => panic!("expected Conflict, got {:?}", x),
        }

        // Same ID, different school: fine.
        db.insert_student(&stud("queens", "26/001/JSS1", "JSS1")).await.unwrap();

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn ids_stored_canonically() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        with_schools(&db).await;

        // A non-canonical spelling goes in as the canonical one...
        db.insert_student(&stud("kings", "26/1/jss1", "JSS1")).await.unwrap();
        let fetched = db.get_student("kings", "26/001/JSS1").await.unwrap();
        assert_eq!(fetched.id, "26/001/JSS1");

        // ...so the two spellings can't coexist as separate records.
        match db.insert_student(&stud("kings", "26/001/JSS1", "JSS1")).await {
            Err(StoreError::Conflict(_)) => {},
            x => panic!("expected Conflict, got {:?}", x),
        }

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn cross_tenant_reads_are_not_found() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        with_schools(&db).await;

        db.insert_student(&stud("kings", "26/001/JSS1", "JSS1")).await.unwrap();

        // The record exists, but not for queens: NotFound, not
        // anything that would leak its existence.
        assert_eq!(
            db.get_student("queens", "26/001/JSS1").await.unwrap_err(),
            StoreError::NotFound
        );
        assert_eq!(
            db.delete_student("queens", "26/001/JSS1").await.unwrap_err(),
            StoreError::NotFound
        );
        let mut scores = HashMap::new();
        scores.insert("Maths".to_owned(), score(40.0));
        assert_eq!(
            db.save_scores("queens", "26/001/JSS1", Term::First, &scores, "")
                .await.unwrap_err(),
            StoreError::NotFound
        );

        // And for its own school everything works.
        db.get_student("kings", "26/001/JSS1").await.unwrap();
        db.save_scores("kings", "26/001/JSS1", Term::First, &scores, "good")
            .await.unwrap();
        let fetched = db.get_student("kings", "26/001/JSS1").await.unwrap();
        assert_eq!(fetched.comment, "good");
        assert!(fetched.scores.contains_key("Maths"));

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn sequence_numbers_advance() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        with_schools(&db).await;

        assert_eq!(db.next_student_seq("kings").await.unwrap(), 1);
        db.insert_student(&stud("kings", "26/001/JSS1", "JSS1")).await.unwrap();
        db.insert_student(&stud("kings", "26/007/JSS1", "JSS1")).await.unwrap();
        assert_eq!(db.next_student_seq("kings").await.unwrap(), 8);
        // Other tenants don't bump the sequence.
        assert_eq!(db.next_student_seq("queens").await.unwrap(), 1);

        db.nuke_database().await.unwrap();
    }
}
