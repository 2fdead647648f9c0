//! Shared fixtures for pipeline integration tests.

use serde_json::{json, Value};
use std::path::Path;

/// A play event as it appears in the source logs, with the source-side
/// field names.
pub fn event(user_id: i64, name: (&str, &str), level: &str, song: Option<&str>, ts: i64) -> Value {
    json!({
        "artist": song.map(|_| "The Artist"),
        "auth": "Logged In",
        "firstName": name.0,
        "gender": "F",
        "itemInSession": 0,
        "lastName": name.1,
        "length": song.map(|_| 200.5),
        "level": level,
        "location": "San Francisco-Oakland-Hayward, CA",
        "method": "PUT",
        "page": if song.is_some() { "NextSong" } else { "Home" },
        "registration": 1540266185796.0_f64,
        "sessionId": 139,
        "song": song,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0",
        "userId": user_id,
    })
}

/// A catalog record, field names already matching the staging columns.
pub fn song(song_id: &str, title: &str, artist_id: &str, artist_name: &str) -> Value {
    json!({
        "num_songs": 1,
        "artist_id": artist_id,
        "artist_latitude": 35.14968,
        "artist_longitude": -90.04892,
        "artist_location": "Memphis, TN",
        "artist_name": artist_name,
        "song_id": song_id,
        "title": title,
        "duration": 200.5,
        "year": 2018,
    })
}

pub fn write_ndjson(path: &Path, records: &[Value]) {
    let lines: Vec<String> = records.iter().map(|r| r.to_string()).collect();
    std::fs::write(path, lines.join("\n")).unwrap();
}

/// Write raw lines verbatim, for malformed-record scenarios.
pub fn write_lines(path: &Path, lines: &[&str]) {
    std::fs::write(path, lines.join("\n")).unwrap();
}
