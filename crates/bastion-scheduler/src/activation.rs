use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bastion_core::time::format_ts;
use bastion_core::RestrictionId;
use bastion_restrictions::{store, RestrictionCache, RestrictionState};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::Result;

/// State changes applied by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub enabled: usize,
    pub disabled: usize,
}

impl ActivationReport {
    pub fn changed(&self) -> usize {
        self.enabled + self.disabled
    }
}

/// Turns job-linked restrictions on while a window is open and off after.
///
/// A restriction linked to at least one job with `start_at <= now < finish_at`
/// is enabled; every other job-linked restriction is disabled. Rules with no
/// job link are never touched. The pass is idempotent, so missed ticks only
/// delay a transition.
pub struct WindowActivator {
    db: Arc<Mutex<Connection>>,
    cache: Arc<dyn RestrictionCache>,
    interval: Duration,
}

impl WindowActivator {
    pub fn new(db: Arc<Mutex<Connection>>, cache: Arc<dyn RestrictionCache>, interval: Duration) -> Self {
        Self { db, cache, interval }
    }

    /// Reconcile against the wall clock.
    pub fn tick(&self) -> Result<ActivationReport> {
        self.tick_at(Utc::now())
    }

    /// Reconcile as of `now`. Invalidates the cache only when a row changed.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Result<ActivationReport> {
        let report = {
            let mut db = self.lock_db();
            reconcile(&mut db, now)?
        };
        if report.changed() > 0 {
            self.cache.invalidate();
            info!(
                enabled = report.enabled,
                disabled = report.disabled,
                "maintenance restrictions reconciled"
            );
        }
        Ok(report)
    }

    /// Main loop. Reconciles every `interval` until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "window activator started");

        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        error!("window activator tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("window activator shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn lock_db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn reconcile(conn: &mut Connection, now: DateTime<Utc>) -> Result<ActivationReport> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // Collect first so the statement is dropped before the updates borrow `tx`.
    // Columns: restriction id, current state, any window open (0/1)
    let rows: Vec<(String, String, bool)> = {
        let mut stmt = tx.prepare_cached(
            "SELECT r.id, r.state,
                    MAX(CASE WHEN j.start_at <= ?1 AND j.finish_at > ?1 THEN 1 ELSE 0 END)
             FROM restrictions r
             JOIN job_restrictions jr ON jr.restriction_id = r.id
             JOIN jobs j ON j.id = jr.job_id
             GROUP BY r.id, r.state",
        )?;
        let rows = stmt
            .query_map(params![format_ts(now)], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? == 1))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };

    let mut report = ActivationReport::default();
    for (id, state, open) in rows {
        let wanted = if open {
            RestrictionState::Enabled
        } else {
            RestrictionState::Disabled
        };
        if state == wanted.to_string() {
            continue;
        }
        store::set_state(&tx, &RestrictionId::from(id.as_str()), wanted)?;
        debug!(restriction_id = %id, state = %wanted, "restriction state changed");
        match wanted {
            RestrictionState::Enabled => report.enabled += 1,
            RestrictionState::Disabled => report.disabled += 1,
        }
    }

    tx.commit()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bastion_restrictions::{Category, EffectiveRestrictions, Scope};
    use chrono::TimeZone;

    use super::*;
    use crate::types::ScheduleRequest;
    use crate::{MaintenanceScheduler, SupportedJobTypes};

    #[derive(Default)]
    struct CountingCache(AtomicUsize);

    impl RestrictionCache for CountingCache {
        fn invalidate(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap()
    }

    fn shared_db() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().expect("open");
        crate::db::init_db(&conn).expect("init");
        Arc::new(Mutex::new(conn))
    }

    fn schedule(db: &Arc<Mutex<Connection>>, start: u32, finish: u32, ips: &[&str]) {
        let scheduler = MaintenanceScheduler::with_options(
            Arc::clone(db),
            Arc::new(CountingCache::default()),
            SupportedJobTypes::default(),
            8,
        );
        scheduler
            .schedule(&ScheduleRequest {
                description: "upgrade".to_string(),
                job_type: "maintenance".to_string(),
                start_at: format_ts(at(start)),
                finish_at: format_ts(at(finish)),
                whitelist_ip: ips.iter().map(|s| s.to_string()).collect(),
            })
            .unwrap();
    }

    fn enabled(db: &Arc<Mutex<Connection>>) -> Vec<(Category, String)> {
        let conn = db.lock().unwrap();
        store::list_by_state(&conn, RestrictionState::Enabled)
            .unwrap()
            .into_iter()
            .map(|r| (r.category, r.value))
            .collect()
    }

    #[test]
    fn window_opens_and_closes() {
        let db = shared_db();
        schedule(&db, 2, 4, &["10.0.0.5"]);
        let cache = Arc::new(CountingCache::default());
        let activator = WindowActivator::new(Arc::clone(&db), cache.clone(), Duration::from_secs(1));

        assert_eq!(activator.tick_at(at(1)).unwrap().changed(), 0);
        assert!(enabled(&db).is_empty());

        let report = activator.tick_at(at(2)).unwrap();
        assert_eq!(report, ActivationReport { enabled: 2, disabled: 0 });
        assert_eq!(enabled(&db).len(), 2);

        // Idempotent inside the window.
        assert_eq!(activator.tick_at(at(3)).unwrap().changed(), 0);

        // finish_at is exclusive.
        let report = activator.tick_at(at(4)).unwrap();
        assert_eq!(report, ActivationReport { enabled: 0, disabled: 2 });
        assert!(enabled(&db).is_empty());

        assert_eq!(cache.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shared_marker_stays_on_while_any_window_is_open() {
        let db = shared_db();
        schedule(&db, 2, 4, &["10.0.0.5"]);
        schedule(&db, 3, 6, &["10.0.0.6"]);
        let activator = WindowActivator::new(
            Arc::clone(&db),
            Arc::new(CountingCache::default()),
            Duration::from_secs(1),
        );

        activator.tick_at(at(5)).unwrap();
        let on = enabled(&db);
        assert!(on.contains(&(Category::Maintenance, "all".to_string())));
        assert!(on.contains(&(Category::Whitelist, "10.0.0.6".to_string())));
        assert!(!on.contains(&(Category::Whitelist, "10.0.0.5".to_string())));
    }

    #[test]
    fn unlinked_restrictions_are_left_alone() {
        let db = shared_db();
        {
            let conn = db.lock().unwrap();
            store::create(&conn, Category::Whitelist, Scope::Ip, "192.0.2.1", RestrictionState::Enabled)
                .unwrap();
        }
        let activator = WindowActivator::new(
            Arc::clone(&db),
            Arc::new(CountingCache::default()),
            Duration::from_secs(1),
        );
        assert_eq!(activator.tick_at(at(12)).unwrap().changed(), 0);
        assert_eq!(enabled(&db).len(), 1);
    }

    #[test]
    fn reconciled_state_is_visible_through_the_cache() {
        let db = shared_db();
        schedule(&db, 2, 4, &["10.0.0.5"]);
        let cache = Arc::new(EffectiveRestrictions::new(300));
        let activator = WindowActivator::new(Arc::clone(&db), cache.clone(), Duration::from_secs(1));

        let before = cache.get_or_load(&db.lock().unwrap()).unwrap();
        assert!(!before.maintenance_active());

        activator.tick_at(at(3)).unwrap();
        let after = cache.get_or_load(&db.lock().unwrap()).unwrap();
        assert!(after.maintenance_active());
        assert!(after.is_whitelisted("10.0.0.5"));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let db = shared_db();
        let activator = WindowActivator::new(
            Arc::clone(&db),
            Arc::new(CountingCache::default()),
            Duration::from_millis(10),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(activator.run(rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("activator did not stop")
            .unwrap();
    }
}
