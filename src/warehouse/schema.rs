//! Warehouse table contracts.
//!
//! Seven tables: two staging landing tables holding raw records verbatim,
//! and the five tables of the play-event star schema. Column names, types
//! and nullability are the interface downstream queries depend on.
//!
//! Timestamps are INTEGER epoch values; event timestamps are epoch
//! milliseconds and `start_time` carries the same value through to the
//! fact and time tables. Key hints mark the natural keys and clustering
//! columns without enforcing them — staging rows may duplicate freely and
//! the target tables are append-targets across runs.

use crate::column_def;
use crate::error::EtlError;
use crate::sqlite_persistence::{SqlType, Table};
use rusqlite::Connection;

// =============================================================================
// Staging tables
// =============================================================================

/// Raw play-event log records, one row per source record.
pub const STG_EVENTS: Table = Table {
    name: "stg_events",
    columns: &[
        column_def!("artist", SqlType::Text),
        column_def!("auth", SqlType::Text, non_null = true),
        column_def!("first_name", SqlType::Text),
        column_def!("gender", SqlType::Text),
        column_def!("item_in_session", SqlType::Integer, non_null = true),
        column_def!("last_name", SqlType::Text),
        column_def!("length", SqlType::Real),
        column_def!("level", SqlType::Text, non_null = true),
        column_def!("location", SqlType::Text),
        column_def!("method", SqlType::Text, non_null = true),
        column_def!("page", SqlType::Text, non_null = true),
        column_def!("registration", SqlType::Real),
        column_def!("session_id", SqlType::Integer, non_null = true),
        column_def!("song", SqlType::Text),
        column_def!("status", SqlType::Integer, non_null = true),
        column_def!("ts", SqlType::Integer, non_null = true),
        column_def!("user_agent", SqlType::Text),
        column_def!("user_id", SqlType::Integer),
    ],
    key_hint: &["ts"],
};

/// Raw song-catalog records, one row per source record.
pub const STG_SONGS: Table = Table {
    name: "stg_songs",
    columns: &[
        column_def!("num_songs", SqlType::Integer, non_null = true),
        column_def!("artist_id", SqlType::Text, non_null = true),
        column_def!("artist_latitude", SqlType::Real),
        column_def!("artist_longitude", SqlType::Real),
        column_def!("artist_location", SqlType::Text),
        column_def!("artist_name", SqlType::Text, non_null = true),
        column_def!("song_id", SqlType::Text, non_null = true),
        column_def!("title", SqlType::Text, non_null = true),
        column_def!("duration", SqlType::Real, non_null = true),
        column_def!("year", SqlType::Integer, non_null = true),
    ],
    key_hint: &["song_id"],
};

// =============================================================================
// Star schema
// =============================================================================

/// Fact table, one row per qualifying play event.
pub const SONGPLAYS: Table = Table {
    name: "songplays",
    columns: &[
        column_def!("songplay_id", SqlType::Integer, is_primary_key = true),
        column_def!("start_time", SqlType::Integer, non_null = true),
        column_def!("user_id", SqlType::Integer, non_null = true),
        column_def!("level", SqlType::Text, non_null = true),
        column_def!("song_id", SqlType::Text, non_null = true),
        column_def!("artist_id", SqlType::Text, non_null = true),
        column_def!("session_id", SqlType::Integer, non_null = true),
        column_def!("location", SqlType::Text, non_null = true),
        column_def!("user_agent", SqlType::Text, non_null = true),
    ],
    key_hint: &["start_time"],
};

pub const USERS: Table = Table {
    name: "users",
    columns: &[
        column_def!("user_id", SqlType::Integer, non_null = true),
        column_def!("first_name", SqlType::Text, non_null = true),
        column_def!("last_name", SqlType::Text, non_null = true),
        column_def!("gender", SqlType::Text, non_null = true),
        column_def!("level", SqlType::Text, non_null = true),
    ],
    key_hint: &["user_id"],
};

pub const SONGS: Table = Table {
    name: "songs",
    columns: &[
        column_def!("song_id", SqlType::Text, non_null = true),
        column_def!("title", SqlType::Text, non_null = true),
        column_def!("artist_id", SqlType::Text, non_null = true),
        column_def!("year", SqlType::Integer, non_null = true),
        column_def!("duration", SqlType::Real, non_null = true),
    ],
    key_hint: &["song_id"],
};

pub const ARTISTS: Table = Table {
    name: "artists",
    columns: &[
        column_def!("artist_id", SqlType::Text, non_null = true),
        column_def!("name", SqlType::Text, non_null = true),
        column_def!("location", SqlType::Text),
        column_def!("latitude", SqlType::Real),
        column_def!("longitude", SqlType::Real),
    ],
    key_hint: &["artist_id"],
};

pub const TIME: Table = Table {
    name: "time",
    columns: &[
        column_def!("start_time", SqlType::Integer, non_null = true),
        column_def!("hour", SqlType::Integer, non_null = true),
        column_def!("day", SqlType::Integer, non_null = true),
        column_def!("week", SqlType::Integer, non_null = true),
        column_def!("month", SqlType::Integer, non_null = true),
        column_def!("year", SqlType::Integer, non_null = true),
        column_def!("weekday", SqlType::Text, non_null = true),
    ],
    key_hint: &["start_time"],
};

pub const STAGING_TABLES: &[&Table] = &[&STG_EVENTS, &STG_SONGS];

pub const TARGET_TABLES: &[&Table] = &[&SONGPLAYS, &USERS, &SONGS, &ARTISTS, &TIME];

// =============================================================================
// DDL operations
// =============================================================================

/// Drop all staging and target tables. Absent tables are ignored. This
/// is the full reset used when (re)provisioning the warehouse, not part
/// of the per-run sequence — target contents must survive runs.
pub fn drop_all(conn: &Connection) -> Result<(), EtlError> {
    for table in STAGING_TABLES.iter().chain(TARGET_TABLES) {
        table.drop(conn)?;
    }
    Ok(())
}

/// Create all staging and target tables. There are no foreign keys, so
/// creation order is unconstrained.
pub fn create_all(conn: &Connection) -> Result<(), EtlError> {
    for table in STAGING_TABLES.iter().chain(TARGET_TABLES) {
        table.create(conn)?;
    }
    Ok(())
}

/// Per-run staging truncation: drop and recreate both landing tables.
pub fn drop_staging(conn: &Connection) -> Result<(), EtlError> {
    for table in STAGING_TABLES {
        table.drop(conn)?;
    }
    Ok(())
}

pub fn create_staging(conn: &Connection) -> Result<(), EtlError> {
    for table in STAGING_TABLES {
        table.create(conn)?;
    }
    Ok(())
}

/// Create any target table that does not exist yet, leaving existing
/// contents alone.
pub fn ensure_targets(conn: &Connection) -> Result<(), EtlError> {
    for table in TARGET_TABLES {
        table.ensure(conn)?;
    }
    Ok(())
}

/// Check that both staging tables exist with the exact declared
/// structure. Run before any transform: a mismatch here is a
/// configuration error and aborts the pipeline.
pub fn validate_staging(conn: &Connection) -> Result<(), EtlError> {
    for table in STAGING_TABLES {
        table.validate(conn)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_persistence::Table;

    fn all_tables() -> impl Iterator<Item = &'static &'static Table> {
        STAGING_TABLES.iter().chain(TARGET_TABLES)
    }

    #[test]
    fn create_all_then_validate_every_table() {
        let conn = Connection::open_in_memory().unwrap();
        create_all(&conn).unwrap();
        for table in all_tables() {
            table.validate(&conn).unwrap();
        }
    }

    #[test]
    fn drop_all_without_tables_is_not_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        drop_all(&conn).unwrap();
        drop_all(&conn).unwrap();
    }

    #[test]
    fn drop_all_removes_every_table() {
        let conn = Connection::open_in_memory().unwrap();
        create_all(&conn).unwrap();
        drop_all(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn per_run_staging_reset_leaves_target_rows_alone() {
        let conn = Connection::open_in_memory().unwrap();
        create_all(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (user_id, first_name, last_name, gender, level)
             VALUES (8, 'Lily', 'Koch', 'F', 'paid')",
            [],
        )
        .unwrap();

        drop_staging(&conn).unwrap();
        create_staging(&conn).unwrap();
        ensure_targets(&conn).unwrap();

        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .unwrap();
        assert_eq!(users, 1);
    }

    #[test]
    fn staging_accepts_duplicate_rows() {
        let conn = Connection::open_in_memory().unwrap();
        create_all(&conn).unwrap();
        for _ in 0..2 {
            conn.execute(
                "INSERT INTO stg_songs (num_songs, artist_id, artist_name, song_id, title, duration, year)
                 VALUES (1, 'A1', 'Artist', 'S1', 'Song A', 200.5, 2018)",
                [],
            )
            .unwrap();
        }
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM stg_songs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn songplay_surrogate_id_is_assigned() {
        let conn = Connection::open_in_memory().unwrap();
        create_all(&conn).unwrap();
        conn.execute(
            "INSERT INTO songplays (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)
             VALUES (1541121934796, 8, 'paid', 'S1', 'A1', 139, 'L', 'UA')",
            [],
        )
        .unwrap();
        let id: i64 = conn
            .query_row("SELECT songplay_id FROM songplays", [], |r| r.get(0))
            .unwrap();
        assert!(id > 0);
    }

    #[test]
    fn validate_staging_detects_dropped_column() {
        let conn = Connection::open_in_memory().unwrap();
        create_all(&conn).unwrap();
        conn.execute("ALTER TABLE stg_events DROP COLUMN song", [])
            .unwrap();
        let err = validate_staging(&conn).unwrap_err();
        assert!(err.to_string().contains("stg_events"));
    }
}
