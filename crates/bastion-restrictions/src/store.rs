use bastion_core::time::now_ts;
use bastion_core::RestrictionId;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::{RestrictionError, Result};
use crate::types::{Category, Restriction, RestrictionState, Scope};

/// Outcome of [`find_or_create_global`].
#[derive(Debug, Clone)]
pub enum Resolved {
    Existing(Restriction),
    Created(Restriction),
}

impl Resolved {
    pub fn restriction(&self) -> &Restriction {
        match self {
            Resolved::Existing(r) | Resolved::Created(r) => r,
        }
    }

    pub fn into_restriction(self) -> Restriction {
        match self {
            Resolved::Existing(r) | Resolved::Created(r) => r,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Resolved::Created(_))
    }
}

/// Resolve the global (`scope = all`, `value = all`) rule for `category`,
/// creating it in `initial_state` when absent.
///
/// The lookup keys on (category, scope, value) only. An existing row is
/// reused whatever its current state, so an already-enabled marker is never
/// shadowed by a second disabled copy. `INSERT OR IGNORE` against the partial
/// unique index makes concurrent first-time calls converge on one row.
pub fn find_or_create_global(
    conn: &Connection,
    category: Category,
    initial_state: RestrictionState,
) -> Result<Resolved> {
    let now = now_ts();
    let id = RestrictionId::new();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO restrictions
            (id, category, scope, value, state, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            id.as_str(),
            category.to_string(),
            Scope::All.to_string(),
            Scope::ALL_VALUE,
            initial_state.to_string(),
            now,
        ],
    )?;

    // Read back: on a lost race the row belongs to the other writer.
    let restriction = conn.query_row(
        &format!("{SELECT_SQL} WHERE category = ?1 AND scope = ?2 AND value = ?3"),
        params![category.to_string(), Scope::All.to_string(), Scope::ALL_VALUE],
        row_to_restriction,
    )?;

    if inserted == 1 {
        debug!(restriction_id = %restriction.id, %category, "global restriction created");
        Ok(Resolved::Created(restriction))
    } else {
        debug!(restriction_id = %restriction.id, %category, "global restriction reused");
        Ok(Resolved::Existing(restriction))
    }
}

/// Insert a brand-new rule. Never deduplicates; use
/// [`find_or_create_global`] for the shared marker.
pub fn create(
    conn: &Connection,
    category: Category,
    scope: Scope,
    value: &str,
    state: RestrictionState,
) -> Result<Restriction> {
    let now = now_ts();
    let restriction = Restriction {
        id: RestrictionId::new(),
        category,
        scope,
        value: value.to_string(),
        state,
        created_at: now.clone(),
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO restrictions
            (id, category, scope, value, state, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            restriction.id.as_str(),
            restriction.category.to_string(),
            restriction.scope.to_string(),
            restriction.value,
            restriction.state.to_string(),
            restriction.created_at,
            restriction.updated_at,
        ],
    )?;
    Ok(restriction)
}

/// Flip a rule between enabled and disabled. Bumps `updated_at`.
///
/// Callers own cache invalidation; see [`crate::cache::RestrictionCache`].
pub fn set_state(conn: &Connection, id: &RestrictionId, state: RestrictionState) -> Result<()> {
    let n = conn.execute(
        "UPDATE restrictions SET state = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.as_str(), state.to_string(), now_ts()],
    )?;
    if n == 0 {
        return Err(RestrictionError::NotFound { id: id.clone() });
    }
    Ok(())
}

/// All rules currently in `state`, oldest first.
pub fn list_by_state(conn: &Connection, state: RestrictionState) -> Result<Vec<Restriction>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_SQL} WHERE state = ?1 ORDER BY created_at, id"
    ))?;
    let rows = stmt
        .query_map(params![state.to_string()], row_to_restriction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Number of rows in `category`, regardless of scope or state.
pub fn count_by_category(conn: &Connection, category: Category) -> Result<u64> {
    let n: u64 = conn.query_row(
        "SELECT COUNT(*) FROM restrictions WHERE category = ?1",
        params![category.to_string()],
        |row| row.get(0),
    )?;
    Ok(n)
}

// ── row mapping ──────────────────────────────────────────────────────────────

const SELECT_SQL: &str =
    "SELECT id, category, scope, value, state, created_at, updated_at FROM restrictions";

/// Map a row whose first seven columns are
/// `id, category, scope, value, state, created_at, updated_at`. Unknown enum
/// strings surface as conversion failures instead of being silently defaulted.
pub fn row_to_restriction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Restriction> {
    Ok(Restriction {
        id: RestrictionId::from(row.get::<_, String>(0)?),
        category: parse_column(row, 1)?,
        scope: parse_column(row, 2)?,
        value: row.get(3)?,
        state: parse_column(row, 4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    row.get::<_, String>(idx)?.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}
