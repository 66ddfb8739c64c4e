//! Minimal WordPress tables for SQLite.
//!
//! Only the columns the loader reads are created. Production databases are
//! managed by WordPress itself; this is for local development databases and
//! the integration tests.

use sqlx::AnyPool;

/// Create the blog tables under `prefix` plus the global `users` and `blogs`
/// tables under `global_prefix`.
pub async fn install(pool: &AnyPool, prefix: &str, global_prefix: &str) -> Result<(), sqlx::Error> {
    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS {p}_options (
                option_id INTEGER PRIMARY KEY,
                option_name TEXT NOT NULL UNIQUE,
                option_value TEXT NOT NULL,
                autoload TEXT NOT NULL DEFAULT 'yes'
            )",
            p = prefix
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {p}_terms (
                term_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL
            )",
            p = prefix
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {p}_term_taxonomy (
                term_taxonomy_id INTEGER PRIMARY KEY,
                term_id INTEGER NOT NULL,
                taxonomy TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                parent INTEGER NOT NULL DEFAULT 0,
                count INTEGER NOT NULL DEFAULT 0
            )",
            p = prefix
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {p}_term_relationships (
                object_id INTEGER NOT NULL,
                term_taxonomy_id INTEGER NOT NULL,
                PRIMARY KEY (object_id, term_taxonomy_id)
            )",
            p = prefix
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {p}_posts (
                ID INTEGER PRIMARY KEY,
                post_author INTEGER NOT NULL DEFAULT 0,
                post_date_gmt TEXT NOT NULL DEFAULT '0000-00-00 00:00:00',
                post_content TEXT NOT NULL DEFAULT '',
                post_title TEXT NOT NULL DEFAULT '',
                post_excerpt TEXT NOT NULL DEFAULT '',
                post_status TEXT NOT NULL DEFAULT 'publish',
                post_name TEXT NOT NULL DEFAULT '',
                post_modified_gmt TEXT NOT NULL DEFAULT '0000-00-00 00:00:00',
                guid TEXT NOT NULL DEFAULT '',
                post_type TEXT NOT NULL DEFAULT 'post'
            )",
            p = prefix
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {p}_postmeta (
                meta_id INTEGER PRIMARY KEY,
                post_id INTEGER NOT NULL,
                meta_key TEXT,
                meta_value TEXT
            )",
            p = prefix
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {g}_users (
                ID INTEGER PRIMARY KEY,
                user_login TEXT NOT NULL,
                user_email TEXT,
                display_name TEXT NOT NULL DEFAULT ''
            )",
            g = global_prefix
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {g}_blogs (
                blog_id INTEGER PRIMARY KEY,
                site_id INTEGER NOT NULL DEFAULT 1,
                path TEXT NOT NULL,
                public INTEGER NOT NULL DEFAULT 1
            )",
            g = global_prefix
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{i}_posts_status ON {p}_posts(post_type, post_status)",
            i = prefix.replace('.', "_"),
            p = prefix
        ),
    ];

    for sql in &statements {
        sqlx::query(sql).execute(pool).await?;
    }

    tracing::debug!("Installed WordPress tables with prefix {}", prefix);
    Ok(())
}
