/*
`Store` methods for the `schools` table: tenant creation, settings
updates, and the operation toggles.
*/
use tokio_postgres::Row;

use super::{Store, StoreError};
use crate::school::{ExamConfig, GradeConfig, School};

fn school_from_row(row: &Row) -> Result<School, StoreError> {
    let term_str: &str = row.try_get("current_term")?;
    let mode_str: &str = row.try_get("exam_mode")?;

    let school = School {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        logo: row.try_get("logo")?,
        operations_enabled: row.try_get("operations_enabled")?,
        teacher_operations_enabled: row.try_get("teacher_operations_enabled")?,
        current_term: term_str.parse().map_err(StoreError::Invalid)?,
        academic_year: row.try_get("academic_year")?,
        max_tests: row.try_get("max_tests")?,
        test_max: row.try_get("test_max")?,
        exam: ExamConfig {
            mode: mode_str.parse().map_err(StoreError::Invalid)?,
            objective_max: row.try_get("objective_max")?,
            theory_max: row.try_get("theory_max")?,
            exam_max: row.try_get("exam_max")?,
        },
        grades: GradeConfig {
            a_min: row.try_get("grade_a_min")?,
            b_min: row.try_get("grade_b_min")?,
            c_min: row.try_get("grade_c_min")?,
            d_min: row.try_get("grade_d_min")?,
            pass_mark: row.try_get("pass_mark")?,
        },
    };

    Ok(school)
}

impl Store {
    pub async fn insert_school(&self, school: &School) -> Result<(), StoreError> {
        log::trace!("Store::insert_school( {:?} ) called.", &school.id);

        school.validate().map_err(StoreError::Invalid)?;

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let extant = t.query_opt(
            "SELECT id FROM schools WHERE id = $1",
            &[&school.id]
        ).await?;
        if extant.is_some() {
            return Err(StoreError::Conflict(format!(
                "A school with id {:?} already exists.", &school.id
            )));
        }

        t.execute(
            "INSERT INTO schools (
                id, name, logo,
                operations_enabled, teacher_operations_enabled,
                current_term, academic_year,
                max_tests, test_max,
                exam_mode, objective_max, theory_max, exam_max,
                grade_a_min, grade_b_min, grade_c_min, grade_d_min, pass_mark
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9,
                $10, $11, $12, $13, $14, $15, $16, $17, $18
            )",
            &[
                &school.id, &school.name, &school.logo,
                &school.operations_enabled, &school.teacher_operations_enabled,
                &school.current_term.to_string(), &school.academic_year,
                &school.max_tests, &school.test_max,
                &school.exam.mode.to_string(),
                &school.exam.objective_max, &school.exam.theory_max,
                &school.exam.exam_max,
                &school.grades.a_min, &school.grades.b_min,
                &school.grades.c_min, &school.grades.d_min,
                &school.grades.pass_mark,
            ]
        ).await?;

        t.commit().await.map_err(StoreError::from)?;
        log::trace!("Inserted school {:?} ({}).", &school.id, &school.name);
        Ok(())
    }

    pub async fn get_school(&self, id: &str) -> Result<School, StoreError> {
        log::trace!("Store::get_school( {:?} ) called.", id);

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT * FROM schools WHERE id = $1",
            &[&id]
        ).await?;

        match row {
            None => Err(StoreError::NotFound),
            Some(row) => school_from_row(&row),
        }
    }

    pub async fn get_schools(&self) -> Result<Vec<School>, StoreError> {
        log::trace!("Store::get_schools() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM schools ORDER BY id",
            &[]
        ).await?;

        let mut schools = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            schools.push(school_from_row(row)?);
        }
        Ok(schools)
    }

    /// Overwrite a school's settings (everything but the two toggles,
    /// which have their own dedicated setters).
    pub async fn update_school(&self, school: &School) -> Result<(), StoreError> {
        log::trace!("Store::update_school( {:?} ) called.", &school.id);

        school.validate().map_err(StoreError::Invalid)?;

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE schools SET
                name = $2, logo = $3,
                current_term = $4, academic_year = $5,
                max_tests = $6, test_max = $7,
                exam_mode = $8, objective_max = $9, theory_max = $10,
                exam_max = $11,
                grade_a_min = $12, grade_b_min = $13, grade_c_min = $14,
                grade_d_min = $15, pass_mark = $16
            WHERE id = $1",
            &[
                &school.id, &school.name, &school.logo,
                &school.current_term.to_string(), &school.academic_year,
                &school.max_tests, &school.test_max,
                &school.exam.mode.to_string(),
                &school.exam.objective_max, &school.exam.theory_max,
                &school.exam.exam_max,
                &school.grades.a_min, &school.grades.b_min,
                &school.grades.c_min, &school.grades.d_min,
                &school.grades.pass_mark,
            ]
        ).await?;

        if n == 0 {
            Err(StoreError::NotFound)
        } else {
            Ok(())
        }
    }

    /// Super admin's master switch.
    pub async fn set_operations_enabled(
        &self,
        school_id: &str,
        enabled: bool,
    ) -> Result<(), StoreError> {
        log::trace!(
            "Store::set_operations_enabled( {:?}, {} ) called.",
            school_id, enabled
        );

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE schools SET operations_enabled = $2 WHERE id = $1",
            &[&school_id, &enabled]
        ).await?;

        if n == 0 {
            Err(StoreError::NotFound)
        } else {
            Ok(())
        }
    }

    /// School admin's switch over just the teachers.
    pub async fn set_teacher_operations_enabled(
        &self,
        school_id: &str,
        enabled: bool,
    ) -> Result<(), StoreError> {
        log::trace!(
            "Store::set_teacher_operations_enabled( {:?}, {} ) called.",
            school_id, enabled
        );

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE schools SET teacher_operations_enabled = $2 WHERE id = $1",
            &[&school_id, &enabled]
        ).await?;

        if n == 0 {
            Err(StoreError::NotFound)
        } else {
            Ok(())
        }
    }

    /**
    Remove a school and everything it owns.

    Accounts, student records, publications, and snapshots all go in
    one transaction; reports survive because they're keyed to unames,
    not schools.
    */
    pub async fn delete_school(&self, school_id: &str) -> Result<(), StoreError> {
        log::trace!("Store::delete_school( {:?} ) called.", school_id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        t.execute(
            "DELETE FROM published_results WHERE school = $1",
            &[&school_id]
        ).await?;
        t.execute(
            "DELETE FROM publications WHERE school = $1",
            &[&school_id]
        ).await?;
        t.execute(
            "DELETE FROM students WHERE school = $1",
            &[&school_id]
        ).await?;
        t.execute(
            "DELETE FROM teachers WHERE uname IN
                (SELECT uname FROM users WHERE school = $1)",
            &[&school_id]
        ).await?;
        t.execute(
            "DELETE FROM users WHERE school = $1",
            &[&school_id]
        ).await?;

        let n = t.execute(
            "DELETE FROM schools WHERE id = $1",
            &[&school_id]
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

    use crate::school::{ExamMode, Term};
    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn school_crud_cycle() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let mut school = School::new("kings".to_owned(), "Kings College".to_owned());
        db.insert_school(&school).await.unwrap();

        // A second insert of the same id is a conflict.
        match db.insert_school(&school).await {
            Err(StoreError::Conflict(_)) => {},
            x => panic!("expected Conflict, got {:?}", x),
        }

        let fetched = db.get_school("kings").await.unwrap();
        assert_eq!(fetched.name, "Kings College");
        assert_eq!(fetched.current_term, Term::First);
        assert!(fetched.operations_enabled);

        school.current_term = Term::Second;
        school.max_tests = 4;
        school.exam = ExamConfig::new(ExamMode::Separate, 30.0, 40.0, 0.0).unwrap();
        db.update_school(&school).await.unwrap();

        let fetched = db.get_school("kings").await.unwrap();
        assert_eq!(fetched.current_term, Term::Second);
        assert_eq!(fetched.max_tests, 4);
        assert_eq!(fetched.exam.mode, ExamMode::Separate);

        db.set_operations_enabled("kings", false).await.unwrap();
        assert!(!db.get_school("kings").await.unwrap().operations_enabled);
        db.set_operations_enabled("kings", true).await.unwrap();
        assert!(db.get_school("kings").await.unwrap().operations_enabled);

        // Unknown school ids are NotFound, for toggles and lookups both.
        assert_eq!(
            db.get_school("nowhere").await.unwrap_err(),
            StoreError::NotFound
        );
        assert_eq!(
            db.set_operations_enabled("nowhere", false).await.unwrap_err(),
            StoreError::NotFound
        );

        db.delete_school("kings").await.unwrap();
        assert_eq!(
            db.get_school("kings").await.unwrap_err(),
            StoreError::NotFound
        );

        db.nuke_database().await.unwrap();
    }
}
