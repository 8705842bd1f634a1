use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::store;
use crate::types::{Category, Restriction, RestrictionState, Scope};

/// Logical key of the effective-restriction snapshot.
pub const EFFECTIVE_RESTRICTIONS_KEY: &str = "restrictions";

/// Write-side capability handed to anything that mutates restrictions.
///
/// `invalidate` must be called after the mutating transaction has committed,
/// never before. Invalidating an absent entry is a no-op.
pub trait RestrictionCache: Send + Sync {
    fn invalidate(&self);
}

/// The set of enabled restrictions at `built_at`.
#[derive(Debug, Clone, Serialize)]
pub struct RestrictionSnapshot {
    pub restrictions: Vec<Restriction>,
    pub built_at: DateTime<Utc>,
}

impl RestrictionSnapshot {
    /// True when any enabled maintenance rule exists.
    pub fn maintenance_active(&self) -> bool {
        self.restrictions
            .iter()
            .any(|r| r.category == Category::Maintenance && r.is_enabled())
    }

    /// Exact-match membership of `ip` among enabled whitelist rules.
    pub fn is_whitelisted(&self, ip: &str) -> bool {
        self.restrictions.iter().any(|r| {
            r.category == Category::Whitelist && r.scope == Scope::Ip && r.is_enabled() && r.value == ip
        })
    }
}

struct Slots {
    entries: HashMap<&'static str, Arc<RestrictionSnapshot>>,
    /// Bumped by every invalidation. A load that started under an older
    /// generation must not publish its result.
    generation: u64,
}

/// Process-wide cache of the effective restriction set.
///
/// Share one instance via `Arc`. Readers call [`get_or_load`](Self::get_or_load);
/// writers only ever see it as `Arc<dyn RestrictionCache>`.
pub struct EffectiveRestrictions {
    slots: Mutex<Slots>,
    ttl_secs: i64,
}

impl EffectiveRestrictions {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                generation: 0,
            }),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Peek at the cached snapshot without touching the database. `None`
    /// on a miss or when the snapshot is older than the TTL.
    pub fn cached(&self) -> Option<Arc<RestrictionSnapshot>> {
        let slots = self.lock();
        let snap = slots.entries.get(EFFECTIVE_RESTRICTIONS_KEY)?;
        let age = Utc::now().signed_duration_since(snap.built_at).num_seconds();
        if age < self.ttl_secs {
            Some(Arc::clone(snap))
        } else {
            None
        }
    }

    /// Return the cached snapshot, recomputing it from `conn` on a miss.
    pub fn get_or_load(&self, conn: &Connection) -> Result<Arc<RestrictionSnapshot>> {
        if let Some(snap) = self.cached() {
            debug!("effective restrictions cache hit");
            return Ok(snap);
        }

        let started_at = self.lock().generation;
        let snap = Arc::new(RestrictionSnapshot {
            restrictions: store::list_by_state(conn, RestrictionState::Enabled)?,
            built_at: Utc::now(),
        });

        let mut slots = self.lock();
        if slots.generation == started_at {
            slots
                .entries
                .insert(EFFECTIVE_RESTRICTIONS_KEY, Arc::clone(&snap));
            debug!(count = snap.restrictions.len(), "effective restrictions cached");
        } else {
            debug!("effective restrictions invalidated during load; not cached");
        }
        Ok(snap)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        // The guarded data is a plain map; a panic mid-update cannot leave it
        // half-written, so recover from poisoning.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RestrictionCache for EffectiveRestrictions {
    fn invalidate(&self) {
        let mut slots = self.lock();
        slots.generation = slots.generation.wrapping_add(1);
        if slots.entries.remove(EFFECTIVE_RESTRICTIONS_KEY).is_some() {
            debug!("effective restrictions invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        crate::db::init_db(&conn).expect("init");
        conn
    }

    #[test]
    fn miss_then_hit() {
        let conn = conn();
        let cache = EffectiveRestrictions::new(300);
        assert!(cache.cached().is_none());

        let first = cache.get_or_load(&conn).unwrap();
        let second = cache.get_or_load(&conn).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn invalidate_forces_recompute() {
        let conn = conn();
        let cache = EffectiveRestrictions::new(300);
        let before = cache.get_or_load(&conn).unwrap();
        assert!(before.restrictions.is_empty());

        store::create(&conn, Category::Whitelist, Scope::Ip, "10.0.0.5", RestrictionState::Enabled)
            .unwrap();
        // Stale until invalidated.
        assert!(cache.get_or_load(&conn).unwrap().restrictions.is_empty());

        cache.invalidate();
        assert!(cache.cached().is_none());
        let after = cache.get_or_load(&conn).unwrap();
        assert_eq!(after.restrictions.len(), 1);
        assert!(after.is_whitelisted("10.0.0.5"));
    }

    #[test]
    fn invalidate_on_empty_cache_is_noop() {
        let cache = EffectiveRestrictions::new(300);
        cache.invalidate();
        cache.invalidate();
        assert!(cache.cached().is_none());
    }

    #[test]
    fn expired_snapshot_is_a_miss() {
        let conn = conn();
        let cache = EffectiveRestrictions::new(0);
        cache.get_or_load(&conn).unwrap();
        assert!(cache.cached().is_none());
    }

    #[test]
    fn snapshot_queries() {
        let conn = conn();
        let marker = store::find_or_create_global(&conn, Category::Maintenance, RestrictionState::Disabled)
            .unwrap()
            .into_restriction();
        store::create(&conn, Category::Whitelist, Scope::Ip, "1.2.3.4", RestrictionState::Enabled)
            .unwrap();

        let cache = EffectiveRestrictions::new(300);
        let snap = cache.get_or_load(&conn).unwrap();
        assert!(!snap.maintenance_active());
        assert!(snap.is_whitelisted("1.2.3.4"));
        assert!(!snap.is_whitelisted("1.2.3.5"));

        store::set_state(&conn, &marker.id, RestrictionState::Enabled).unwrap();
        cache.invalidate();
        assert!(cache.get_or_load(&conn).unwrap().maintenance_active());
    }
}
