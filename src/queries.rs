//! SQL against the samples table.
//!
//! Synchronous helpers over a borrowed connection; the async store runs
//! them on the blocking pool.

use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

use crate::clock::from_micros;
use crate::error::Result;
use crate::models::{Sample, SampleOrigin, SampleStats, SampleType};
use crate::schema::{self, samples};

/// Type/origin selection shared by read, iterator and reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFilter {
    /// Exact type to match
    pub sample_type: SampleType,
    /// Exact origin, or `Any` for every origin
    pub origin: SampleOrigin,
}

impl SampleFilter {
    fn where_clause(self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut clause = format!(" WHERE {} = ?", samples::TYPE);
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(self.sample_type)];

        if self.origin != SampleOrigin::Any {
            clause.push_str(&format!(" AND {} = ?", samples::ORIGIN));
            params.push(Box::new(self.origin));
        }

        (clause, params)
    }
}

/// Position of a row in newest-first order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    /// `created_at` of the last row seen
    pub created_at: i64,
    /// `id` of the last row seen
    pub id: i64,
}

/// Create the samples table and indexes if missing
pub fn bootstrap(conn: &Connection) -> Result<()> {
    conn.execute_batch(schema::CREATE_SAMPLES)?;
    Ok(())
}

/// Newest stored timestamp, 0 for an empty table
pub fn latest_created_at(conn: &Connection) -> Result<i64> {
    let latest = conn.query_row(
        &format!(
            "SELECT COALESCE(MAX({}), 0) FROM {}",
            samples::CREATED_AT,
            samples::TABLE
        ),
        [],
        |row| row.get(0),
    )?;
    Ok(latest)
}

/// Insert a sample or take over the row already holding `message`
pub fn upsert(
    conn: &Connection,
    sample_type: SampleType,
    origin: SampleOrigin,
    message: &str,
    created_at: i64,
) -> Result<()> {
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT INTO {table} ({ty}, {origin}, {msg}, {ts}) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT({msg}) DO UPDATE SET
             {ty} = excluded.{ty},
             {origin} = excluded.{origin},
             {ts} = excluded.{ts}",
        table = samples::TABLE,
        ty = samples::TYPE,
        origin = samples::ORIGIN,
        msg = samples::MESSAGE,
        ts = samples::CREATED_AT,
    ))?;
    stmt.execute(params![sample_type, origin, message, created_at])?;
    Ok(())
}

/// Delete by id, returning the number of removed rows
pub fn delete_by_id(conn: &Connection, id: i64) -> Result<usize> {
    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE {} = ?", samples::TABLE, samples::ID),
        params![id],
    )?;
    Ok(removed)
}

/// Delete by exact message text, returning the number of removed rows
pub fn delete_by_message(conn: &Connection, message: &str) -> Result<usize> {
    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE {} = ?", samples::TABLE, samples::MESSAGE),
        params![message],
    )?;
    Ok(removed)
}

/// Remove every row of one (type, origin) partition
pub fn delete_partition(conn: &Connection, sample_type: SampleType, origin: SampleOrigin) -> Result<usize> {
    let removed = conn.execute(
        &format!(
            "DELETE FROM {} WHERE {} = ? AND {} = ?",
            samples::TABLE,
            samples::TYPE,
            samples::ORIGIN
        ),
        params![sample_type, origin],
    )?;
    Ok(removed)
}

/// All messages matching `filter`, in no particular order
pub fn select_messages(conn: &Connection, filter: SampleFilter) -> Result<Vec<String>> {
    let (clause, params) = filter.where_clause();
    let query = format!("SELECT {} FROM {}{}", samples::MESSAGE, samples::TABLE, clause);
    let mut stmt = conn.prepare(&query)?;
    let message_iter = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| row.get(0))?;

    let mut results = Vec::new();
    for message in message_iter {
        results.push(message?);
    }

    Ok(results)
}

/// Up to `limit` messages matching `filter`, newest first, strictly after `after`
///
/// Keyset pagination: feeding the cursor of the last returned row back in
/// continues the walk without holding a statement open between pages.
pub fn newest_page(
    conn: &Connection,
    filter: SampleFilter,
    after: Option<PageCursor>,
    limit: usize,
) -> Result<Vec<(PageCursor, String)>> {
    let (clause, mut params) = filter.where_clause();
    let mut query = format!(
        "SELECT {}, {}, {} FROM {}{}",
        samples::CREATED_AT,
        samples::ID,
        samples::MESSAGE,
        samples::TABLE,
        clause
    );

    if let Some(cursor) = after {
        query.push_str(&format!(" AND ({}, {}) < (?, ?)", samples::CREATED_AT, samples::ID));
        params.push(Box::new(cursor.created_at));
        params.push(Box::new(cursor.id));
    }

    query.push_str(&format!(
        " ORDER BY {} DESC, {} DESC LIMIT ?",
        samples::CREATED_AT,
        samples::ID
    ));
    params.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));

    let mut stmt = conn.prepare_cached(&query)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
        Ok((
            PageCursor {
                created_at: row.get(0)?,
                id: row.get(1)?,
            },
            row.get(2)?,
        ))
    })?;

    let mut page = Vec::with_capacity(limit);
    for row in rows {
        page.push(row?);
    }

    Ok(page)
}

/// Look up the sample holding `message`
pub fn find_by_message(conn: &Connection, message: &str) -> Result<Option<Sample>> {
    let sample = conn
        .query_row(
            &format!(
                "SELECT {}, {}, {}, {}, {} FROM {} WHERE {} = ?",
                samples::ID,
                samples::TYPE,
                samples::ORIGIN,
                samples::MESSAGE,
                samples::CREATED_AT,
                samples::TABLE,
                samples::MESSAGE
            ),
            params![message],
            map_sample,
        )
        .optional()?;
    Ok(sample)
}

/// Six counters over the whole table in one pass
pub fn stats(conn: &Connection) -> Result<SampleStats> {
    let query = format!(
        "SELECT
            COALESCE(SUM(CASE WHEN {ty} = 'spam' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN {ty} = 'ham' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN {ty} = 'spam' AND {origin} = 'preset' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN {ty} = 'ham' AND {origin} = 'preset' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN {ty} = 'spam' AND {origin} = 'user' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN {ty} = 'ham' AND {origin} = 'user' THEN 1 ELSE 0 END), 0)
         FROM {table}",
        ty = samples::TYPE,
        origin = samples::ORIGIN,
        table = samples::TABLE,
    );

    let stats = conn.query_row(&query, [], |row| {
        let count = |idx: usize| -> rusqlite::Result<usize> {
            row.get::<_, i64>(idx).map(|n| usize::try_from(n).unwrap_or_default())
        };
        Ok(SampleStats {
            total_spam: count(0)?,
            total_ham: count(1)?,
            preset_spam: count(2)?,
            preset_ham: count(3)?,
            user_spam: count(4)?,
            user_ham: count(5)?,
        })
    })?;

    Ok(stats)
}

/// Map a database row to a Sample
fn map_sample(row: &Row<'_>) -> rusqlite::Result<Sample> {
    Ok(Sample {
        id: row.get(0)?,
        sample_type: row.get(1)?,
        origin: row.get(2)?,
        message: row.get(3)?,
        created_at: from_micros(row.get(4)?),
    })
}
