use std::sync::{Arc, Mutex, MutexGuard};

use bastion_core::config::SchedulerConfig;
use bastion_core::JobId;
use bastion_restrictions::{store, Category, RestrictionCache, RestrictionState, Scope};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{error, info, instrument, warn};

use crate::db::init_db;
use crate::error::Result;
use crate::types::{Job, JobDetails, JobRestriction, ScheduleRequest, SupportedJobTypes};
use crate::validate::{validate, ValidatedRequest};
use crate::{jobs, links};

/// Creates maintenance windows together with the restrictions they govern.
///
/// A single `schedule` call writes, inside one transaction:
///
/// 1. the shared maintenance marker (reused if present, else created disabled),
/// 2. the job row,
/// 3. a link from the job to the marker,
/// 4. one fresh disabled whitelist rule plus link per requested address.
///
/// The injected cache is invalidated exactly once, after commit.
pub struct MaintenanceScheduler {
    db: Arc<Mutex<Connection>>,
    cache: Arc<dyn RestrictionCache>,
    job_types: SupportedJobTypes,
    max_whitelist_ips: usize,
}

impl MaintenanceScheduler {
    /// Build a scheduler from configuration, initialising the schema.
    pub fn new(
        db: Arc<Mutex<Connection>>,
        cache: Arc<dyn RestrictionCache>,
        config: &SchedulerConfig,
    ) -> Result<Self> {
        let job_types = SupportedJobTypes::from_names(&config.job_types)?;
        let scheduler = Self::with_options(db, cache, job_types, config.max_whitelist_ips);
        init_db(&scheduler.lock_db())?;
        Ok(scheduler)
    }

    /// Build a scheduler with explicit options. The schema must already exist.
    pub fn with_options(
        db: Arc<Mutex<Connection>>,
        cache: Arc<dyn RestrictionCache>,
        job_types: SupportedJobTypes,
        max_whitelist_ips: usize,
    ) -> Self {
        Self {
            db,
            cache,
            job_types,
            max_whitelist_ips,
        }
    }

    /// Validate `request` and persist the window atomically.
    ///
    /// On any error nothing is written and the cache is left untouched.
    #[instrument(skip(self, request), fields(job_type = %request.job_type))]
    pub fn schedule(&self, request: &ScheduleRequest) -> Result<Job> {
        let validated = validate(request, &self.job_types, self.max_whitelist_ips)
            .inspect_err(|e| warn!(code = e.code(), "schedule request rejected: {e}"))?;

        let written = {
            let mut db = self.lock_db();
            write_window(&mut db, &validated)
        };

        match written {
            Ok(window) => {
                self.cache.invalidate();
                info!(
                    job_id = %window.job.id,
                    whitelist = validated.whitelist.len(),
                    links = window.links.len(),
                    marker_created = window.marker_created,
                    "maintenance window scheduled"
                );
                Ok(window.job)
            }
            Err(e) => {
                error!(code = e.code(), "schedule failed, rolled back: {e}");
                Err(e)
            }
        }
    }

    /// A job with its links and every restriction it governs, marker first.
    pub fn job_details(&self, id: &JobId) -> Result<Option<JobDetails>> {
        let db = self.lock_db();
        let Some(job) = jobs::get_job(&db, id)? else {
            return Ok(None);
        };
        let link_rows = links::list_for_job(&db, id)?;
        let restrictions = links::restrictions_for_job(&db, id)?;
        Ok(Some(JobDetails {
            job,
            links: link_rows,
            restrictions,
        }))
    }

    fn lock_db(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied write:
        // the open transaction rolls back on drop.
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What one committed window wrote.
struct WrittenWindow {
    job: Job,
    links: Vec<JobRestriction>,
    marker_created: bool,
}

/// All writes of one window. Dropping `tx` on an early return rolls back.
fn write_window(conn: &mut Connection, req: &ValidatedRequest) -> Result<WrittenWindow> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let marker = store::find_or_create_global(
        &tx,
        req.job_type.marker_category(),
        RestrictionState::Disabled,
    )?;
    let job = jobs::insert_job(
        &tx,
        &req.description,
        req.job_type,
        req.start_at,
        req.finish_at,
    )?;
    let mut written = vec![links::link(&tx, &job.id, &marker.restriction().id)?];

    for ip in &req.whitelist {
        let rule = store::create(
            &tx,
            Category::Whitelist,
            Scope::Ip,
            ip,
            RestrictionState::Disabled,
        )?;
        written.push(links::link(&tx, &job.id, &rule.id)?);
    }

    tx.commit()?;
    Ok(WrittenWindow {
        job,
        links: written,
        marker_created: marker.was_created(),
    })
}
