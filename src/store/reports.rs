/*
`Store` methods for the `reports` table: user-submitted issue reports
and the super admin's triage over them.
*/
use time::OffsetDateTime;
use tokio_postgres::Row;

use super::{Store, StoreError};

/// Statuses the super admin can move a report through.
pub const REPORT_STATUSES: &[&str] = &["new", "read"];

#[derive(Clone, Debug, serde::Serialize)]
pub struct Report {
    pub id: i64,
    pub uname: String,
    pub status: String,
    pub body: String,
    pub submitted: OffsetDateTime,
}

fn report_from_row(row: &Row) -> Result<Report, StoreError> {
    let rep = Report {
        id: row.try_get("id")?,
        uname: row.try_get("uname")?,
        status: row.try_get("status")?,
        body: row.try_get("body")?,
        submitted: row.try_get("submitted")?,
    };
    Ok(rep)
}

impl Store {
    pub async fn save_report(
        &self,
        uname: &str,
        body: &str,
    ) -> Result<i64, StoreError> {
        log::trace!(
            "Store::save_report( {:?}, [ {} bytes ] ) called.",
            uname, body.len()
        );

        let body = body.trim();
        if body.is_empty() {
            return Err(StoreError::Invalid(
                "Report body cannot be empty.".to_owned()
            ));
        }

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO reports (uname, body, submitted)
                VALUES ($1, $2, $3)
                RETURNING id",
            &[&uname, &body, &OffsetDateTime::now_utc()]
        ).await?;

        let id: i64 = row.try_get("id")?;
        log::trace!("Saved report {} from {:?}.", id, uname);
        Ok(id)
    }

    /// All reports, or only those in one status, newest first.
    pub async fn load_reports(
        &self,
        status: Option<&str>,
    ) -> Result<Vec<Report>, StoreError> {
        log::trace!("Store::load_reports( {:?} ) called.", status);

        let client = self.connect().await?;
        let rows = match status {
            None => client.query(
                "SELECT * FROM reports ORDER BY submitted DESC",
                &[]
            ).await?,
            Some(status) => client.query(
                "SELECT * FROM reports WHERE status = $1
                    ORDER BY submitted DESC",
                &[&status]
            ).await?,
        };

        let mut reports = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            reports.push(report_from_row(row)?);
        }
        Ok(reports)
    }

    pub async fn set_report_status(
        &self,
        id: i64,
        status: &str,
    ) -> Result<(), StoreError> {
        log::trace!(
            "Store::set_report_status( {}, {:?} ) called.",
            id, status
        );

        if !REPORT_STATUSES.contains(&status) {
            return Err(StoreError::Invalid(format!(
                "{:?} is not a report status; should be one of {:?}.",
                status, REPORT_STATUSES
            )));
        }

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE reports SET status = $2 WHERE id = $1",
            &[&id, &status]
        ).await?;

        if n == 0 {
            Err(StoreError::NotFound)
        } else {
            Ok(())
        }
    }

    pub async fn delete_report(&self, id: i64) -> Result<(), StoreError> {
        log::trace!("Store::delete_report( {} ) called.", id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM reports WHERE id = $1",
            &[&id]
        ).await?;

        if n == 0 {
            Err(StoreError::NotFound)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn report_triage_cycle() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let id = db.save_report("okafor", "Export button mislabeled.")
            .await.unwrap();
        let later = db.save_report("ngozi", "Can't see JSS2 results.")
            .await.unwrap();

        match db.save_report("okafor", "   ").await {
            Err(StoreError::Invalid(_)) => {},
            x => panic!("expected Invalid, got {:?}", x),
        }

        let all = db.load_reports(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, later);
        assert_eq!(all[0].status, "new");

        db.set_report_status(id, "read").await.unwrap();
        match db.set_report_status(id, "bogus").await {
            Err(StoreError::Invalid(_)) => {},
            x => panic!("expected Invalid, got {:?}", x),
        }

        let open = db.load_reports(Some("new")).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].uname, "ngozi");

        db.delete_report(id).await.unwrap();
        assert_eq!(
            db.delete_report(id).await.unwrap_err(),
            StoreError::NotFound
        );

        db.nuke_database().await.unwrap();
    }
}
