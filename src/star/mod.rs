mod time;
mod transformer;

pub use time::TimeParts;
pub use transformer::{
    insert_artists_sql, insert_songplays_sql, insert_songs_sql, insert_users_sql,
    populate_artists, populate_songplays, populate_songs, populate_time, populate_users,
};
