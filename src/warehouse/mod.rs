mod schema;

pub use schema::{
    create_all, create_staging, drop_all, drop_staging, ensure_targets, validate_staging, ARTISTS,
    SONGPLAYS, SONGS, STAGING_TABLES, STG_EVENTS, STG_SONGS, TARGET_TABLES, TIME, USERS,
};
