use bastion_core::time::now_ts;
use bastion_core::{JobId, RestrictionId};
use bastion_restrictions::store::row_to_restriction;
use bastion_restrictions::Restriction;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::types::JobRestriction;

/// Record that `job_id` governs `restriction_id`. One row per pair; a
/// duplicate pair violates the table's UNIQUE constraint.
pub fn link(
    conn: &Connection,
    job_id: &JobId,
    restriction_id: &RestrictionId,
) -> Result<JobRestriction> {
    let row = JobRestriction {
        id: Uuid::now_v7().to_string(),
        job_id: job_id.clone(),
        restriction_id: restriction_id.clone(),
        created_at: now_ts(),
    };
    conn.execute(
        "INSERT INTO job_restrictions (id, job_id, restriction_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            row.id,
            row.job_id.as_str(),
            row.restriction_id.as_str(),
            row.created_at,
        ],
    )?;
    Ok(row)
}

/// Link rows of `job_id`, in creation order.
pub fn list_for_job(conn: &Connection, job_id: &JobId) -> Result<Vec<JobRestriction>> {
    let mut stmt = conn.prepare(
        "SELECT id, job_id, restriction_id, created_at
         FROM job_restrictions WHERE job_id = ?1
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map(params![job_id.as_str()], |row| {
            Ok(JobRestriction {
                id: row.get(0)?,
                job_id: JobId::from(row.get::<_, String>(1)?),
                restriction_id: RestrictionId::from(row.get::<_, String>(2)?),
                created_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Restrictions governed by `job_id`, in link order.
pub fn restrictions_for_job(conn: &Connection, job_id: &JobId) -> Result<Vec<Restriction>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.category, r.scope, r.value, r.state, r.created_at, r.updated_at
         FROM job_restrictions jr
         JOIN restrictions r ON r.id = jr.restriction_id
         WHERE jr.job_id = ?1
         ORDER BY jr.rowid",
    )?;
    let rows = stmt
        .query_map(params![job_id.as_str()], row_to_restriction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_links(conn: &Connection) -> Result<u64> {
    let n: u64 = conn.query_row("SELECT COUNT(*) FROM job_restrictions", [], |row| row.get(0))?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_restrictions::{store, Category, RestrictionState, Scope};
    use chrono::{TimeZone, Utc};

    use crate::jobs::insert_job;
    use crate::types::JobType;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        crate::db::init_db(&conn).expect("init");
        conn
    }

    fn job(conn: &Connection) -> JobId {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap();
        let finish = Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).unwrap();
        insert_job(conn, "upgrade", JobType::Maintenance, start, finish)
            .unwrap()
            .id
    }

    fn rule(conn: &Connection, ip: &str) -> RestrictionId {
        store::create(conn, Category::Whitelist, Scope::Ip, ip, RestrictionState::Disabled)
            .unwrap()
            .id
    }

    #[test]
    fn links_come_back_in_creation_order() {
        let conn = conn();
        let job_id = job(&conn);
        let first = rule(&conn, "10.0.0.2");
        let second = rule(&conn, "10.0.0.1");
        link(&conn, &job_id, &first).unwrap();
        link(&conn, &job_id, &second).unwrap();

        let rows = list_for_job(&conn, &job_id).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.restriction_id.clone()).collect();
        assert_eq!(ids, vec![first, second]);

        let values: Vec<_> = restrictions_for_job(&conn, &job_id)
            .unwrap()
            .into_iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec!["10.0.0.2", "10.0.0.1"]);
    }

    #[test]
    fn duplicate_pair_is_rejected() {
        let conn = conn();
        let job_id = job(&conn);
        let r = rule(&conn, "10.0.0.5");
        link(&conn, &job_id, &r).unwrap();
        assert!(link(&conn, &job_id, &r).is_err());
        assert_eq!(count_links(&conn).unwrap(), 1);
    }

    #[test]
    fn link_to_unknown_job_violates_foreign_key() {
        let conn = conn();
        let r = rule(&conn, "10.0.0.5");
        assert!(link(&conn, &JobId::from("ghost"), &r).is_err());
    }
}
