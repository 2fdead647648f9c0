//! Star-schema derivations.
//!
//! Five insert-select derivations over the staging tables: four
//! dimensions plus the fact table. Each query is built from the typed
//! table definitions, so identifiers come from one place and another
//! dialect can be produced without string surgery. Every derivation
//! deduplicates its own output against duplicate staging rows, but
//! re-running one against unchanged staging data appends the same
//! logical rows again — reload-vs-append is the pipeline's decision.
//!
//! Dimension dedup tie-break: when staging rows share a key but disagree
//! on other attributes, the latest arrival (greatest staging rowid) wins.

use crate::error::EtlError;
use crate::sqlite_persistence::Table;
use crate::star::time::TimeParts;
use crate::warehouse::{ARTISTS, SONGPLAYS, SONGS, STG_EVENTS, STG_SONGS, TIME, USERS};
use rusqlite::{params, Connection};
use tracing::info;

fn column_list(table: &Table) -> String {
    table
        .insert_columns()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Correlated filter keeping only the latest staging row per key.
fn latest_arrival_clause(source: &Table, key: &str) -> String {
    format!(
        "src.rowid = (SELECT MAX(rowid) FROM {source} WHERE {key} = src.{key})",
        source = source.name,
        key = key
    )
}

/// One row per distinct non-null user id, attributes from the latest
/// event for that user.
pub fn insert_users_sql(events: &Table, users: &Table) -> String {
    let key = users.key_hint[0];
    format!(
        "INSERT INTO {target} ({columns}) \
         SELECT {columns} FROM {source} AS src \
         WHERE src.{key} IS NOT NULL AND {latest}",
        target = users.name,
        columns = column_list(users),
        source = events.name,
        key = key,
        latest = latest_arrival_clause(events, key),
    )
}

/// One row per distinct song id, straight from the self-describing
/// catalog rows.
pub fn insert_songs_sql(catalog: &Table, songs: &Table) -> String {
    let key = songs.key_hint[0];
    format!(
        "INSERT INTO {target} ({columns}) \
         SELECT {columns} FROM {source} AS src \
         WHERE {latest}",
        target = songs.name,
        columns = column_list(songs),
        source = catalog.name,
        latest = latest_arrival_clause(catalog, key),
    )
}

/// One row per distinct artist id; catalog columns carry an artist_
/// prefix that the dimension drops.
pub fn insert_artists_sql(catalog: &Table, artists: &Table) -> String {
    let key = artists.key_hint[0];
    format!(
        "INSERT INTO {target} ({columns}) \
         SELECT artist_id, artist_name, artist_location, artist_latitude, artist_longitude \
         FROM {source} AS src \
         WHERE {latest}",
        target = artists.name,
        columns = column_list(artists),
        source = catalog.name,
        latest = latest_arrival_clause(catalog, key),
    )
}

/// One fact row per event whose song title matches a catalog title.
/// The title-equality join is inherited from the source data — titles
/// are the only correlating field in the event stream — and a title
/// held by several catalog entries fans out to one row per match.
pub fn insert_songplays_sql(events: &Table, catalog: &Table, songplays: &Table) -> String {
    format!(
        "INSERT INTO {target} ({columns}) \
         SELECT evt.ts, evt.user_id, evt.level, cat.song_id, cat.artist_id, \
                evt.session_id, evt.location, evt.user_agent \
         FROM {events} AS evt \
         INNER JOIN {catalog} AS cat ON evt.song = cat.title \
         WHERE evt.song IS NOT NULL",
        target = songplays.name,
        columns = column_list(songplays),
        events = events.name,
        catalog = catalog.name,
    )
}

pub fn populate_songplays(conn: &Connection) -> Result<u64, EtlError> {
    let rows = conn.execute(&insert_songplays_sql(&STG_EVENTS, &STG_SONGS, &SONGPLAYS), [])?;
    info!("Derived {} rows into {}", rows, SONGPLAYS.name);
    Ok(rows as u64)
}

pub fn populate_users(conn: &Connection) -> Result<u64, EtlError> {
    let rows = conn.execute(&insert_users_sql(&STG_EVENTS, &USERS), [])?;
    info!("Derived {} rows into {}", rows, USERS.name);
    Ok(rows as u64)
}

pub fn populate_songs(conn: &Connection) -> Result<u64, EtlError> {
    let rows = conn.execute(&insert_songs_sql(&STG_SONGS, &SONGS), [])?;
    info!("Derived {} rows into {}", rows, SONGS.name);
    Ok(rows as u64)
}

pub fn populate_artists(conn: &Connection) -> Result<u64, EtlError> {
    let rows = conn.execute(&insert_artists_sql(&STG_SONGS, &ARTISTS), [])?;
    info!("Derived {} rows into {}", rows, ARTISTS.name);
    Ok(rows as u64)
}

/// One row per distinct event timestamp, calendar fields derived in one
/// place so they cannot drift from `start_time`.
pub fn populate_time(conn: &mut Connection) -> Result<u64, EtlError> {
    let timestamps: Vec<i64> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {key} FROM {source} ORDER BY {key}",
            key = STG_EVENTS.key_hint[0],
            source = STG_EVENTS.name,
        ))?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&TIME.insert_sql())?;
        for ts in &timestamps {
            let parts = TimeParts::from_epoch_millis(*ts)?;
            stmt.execute(params![
                parts.start_time,
                parts.hour,
                parts.day,
                parts.week,
                parts.month,
                parts.year,
                parts.weekday,
            ])?;
        }
    }
    tx.commit()?;

    info!("Derived {} rows into {}", timestamps.len(), TIME.name);
    Ok(timestamps.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        warehouse::create_all(&conn).unwrap();
        conn
    }

    fn stage_event(conn: &Connection, user_id: Option<i64>, level: &str, song: Option<&str>, ts: i64) {
        conn.execute(
            "INSERT INTO stg_events (auth, first_name, gender, item_in_session, last_name, \
             level, location, method, page, session_id, song, status, ts, user_agent, user_id) \
             VALUES ('Logged In', 'Lily', 'F', 0, 'Koch', ?1, 'L', 'PUT', 'NextSong', 139, ?2, \
             200, ?3, 'UA', ?4)",
            params![level, song, ts, user_id],
        )
        .unwrap();
    }

    fn stage_song(conn: &Connection, song_id: &str, title: &str, artist_id: &str, artist: &str) {
        conn.execute(
            "INSERT INTO stg_songs (num_songs, artist_id, artist_name, artist_location, \
             song_id, title, duration, year) \
             VALUES (1, ?1, ?2, 'Memphis', ?3, ?4, 200.5, 2018)",
            params![artist_id, artist, song_id, title],
        )
        .unwrap();
    }

    #[test]
    fn duplicate_user_rows_collapse_to_one_with_latest_level() {
        let conn = test_conn();
        stage_event(&conn, Some(8), "free", None, 1541121934796);
        stage_event(&conn, Some(8), "paid", None, 1541121935000);

        let rows = populate_users(&conn).unwrap();
        assert_eq!(rows, 1);

        let (count, level): (i64, String) = conn
            .query_row(
                "SELECT COUNT(*), MAX(level) FROM users WHERE user_id = 8",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(level, "paid");
    }

    #[test]
    fn events_without_user_id_produce_no_user_rows() {
        let conn = test_conn();
        stage_event(&conn, None, "free", None, 1541121934796);
        assert_eq!(populate_users(&conn).unwrap(), 0);
    }

    #[test]
    fn duplicate_catalog_rows_collapse_per_song_and_artist() {
        let conn = test_conn();
        stage_song(&conn, "S1", "Song A", "A1", "First Name");
        stage_song(&conn, "S1", "Song A", "A1", "Latest Name");

        assert_eq!(populate_songs(&conn).unwrap(), 1);
        assert_eq!(populate_artists(&conn).unwrap(), 1);

        let name: String = conn
            .query_row("SELECT name FROM artists WHERE artist_id = 'A1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(name, "Latest Name");
    }

    #[test]
    fn matching_event_yields_exactly_one_fact_row() {
        let conn = test_conn();
        stage_song(&conn, "S1", "Song A", "A1", "The Artist");
        stage_event(&conn, Some(8), "paid", Some("Song A"), 1541121934796);

        assert_eq!(populate_songplays(&conn).unwrap(), 1);

        let (song_id, artist_id, user_id, start_time): (String, String, i64, i64) = conn
            .query_row(
                "SELECT song_id, artist_id, user_id, start_time FROM songplays",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(song_id, "S1");
        assert_eq!(artist_id, "A1");
        assert_eq!(user_id, 8);
        assert_eq!(start_time, 1541121934796);
    }

    #[test]
    fn null_song_titles_and_unmatched_titles_produce_no_fact_rows() {
        let conn = test_conn();
        stage_song(&conn, "S1", "Song A", "A1", "The Artist");
        stage_event(&conn, Some(8), "paid", None, 1541121934796);
        stage_event(&conn, Some(8), "paid", Some("Unknown Song"), 1541121935000);

        assert_eq!(populate_songplays(&conn).unwrap(), 0);
    }

    #[test]
    fn duplicate_titles_fan_out_one_fact_row_per_match() {
        let conn = test_conn();
        stage_song(&conn, "S1", "Song A", "A1", "The Artist");
        stage_song(&conn, "S2", "Song A", "A2", "Another Artist");
        stage_event(&conn, Some(8), "paid", Some("Song A"), 1541121934796);

        assert_eq!(populate_songplays(&conn).unwrap(), 2);
    }

    #[test]
    fn fact_rows_reference_dimension_rows_from_the_same_snapshot() {
        let conn = test_conn();
        stage_song(&conn, "S1", "Song A", "A1", "The Artist");
        stage_song(&conn, "S2", "Song B", "A2", "Another Artist");
        stage_event(&conn, Some(8), "paid", Some("Song A"), 1541121934796);
        stage_event(&conn, Some(9), "free", Some("Song B"), 1541121935000);

        populate_songplays(&conn).unwrap();
        populate_songs(&conn).unwrap();
        populate_artists(&conn).unwrap();

        let orphans: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM songplays sp \
                 WHERE NOT EXISTS (SELECT 1 FROM songs s WHERE s.song_id = sp.song_id) \
                 OR NOT EXISTS (SELECT 1 FROM artists a WHERE a.artist_id = sp.artist_id)",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn time_rows_cover_every_distinct_event_timestamp_once() {
        let mut conn = test_conn();
        stage_event(&conn, Some(8), "paid", Some("Song A"), 1541121934796);
        stage_event(&conn, Some(8), "paid", Some("Song B"), 1541121934796);
        stage_event(&conn, Some(9), "free", None, 1541121935000);

        assert_eq!(populate_time(&mut conn).unwrap(), 2);
    }

    #[test]
    fn stored_time_fields_rederive_exactly_from_start_time() {
        let mut conn = test_conn();
        stage_event(&conn, Some(8), "paid", Some("Song A"), 1541121934796);
        stage_event(&conn, Some(9), "free", None, 1546214400000);
        populate_time(&mut conn).unwrap();

        let mut stmt = conn
            .prepare("SELECT start_time, hour, day, week, month, year, weekday FROM time")
            .unwrap();
        let stored: Vec<TimeParts> = stmt
            .query_map([], |r| {
                Ok(TimeParts {
                    start_time: r.get(0)?,
                    hour: r.get(1)?,
                    day: r.get(2)?,
                    week: r.get(3)?,
                    month: r.get(4)?,
                    year: r.get(5)?,
                    weekday: r.get(6)?,
                })
            })
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(stored.len(), 2);
        for parts in stored {
            assert_eq!(
                parts,
                TimeParts::from_epoch_millis(parts.start_time).unwrap()
            );
        }
    }

    #[test]
    fn rerunning_a_derivation_appends_duplicates() {
        let conn = test_conn();
        stage_song(&conn, "S1", "Song A", "A1", "The Artist");
        populate_songs(&conn).unwrap();
        populate_songs(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM songs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
