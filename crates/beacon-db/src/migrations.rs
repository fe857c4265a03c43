use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id                  INTEGER PRIMARY KEY,
            distribution_id     TEXT NOT NULL,
            sender_id           TEXT NOT NULL,
            sent_at             INTEGER NOT NULL,
            distribution_type   TEXT NOT NULL,
            body                TEXT NOT NULL,
            delete_pending      INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_sent
            ON messages(sent_at);

        CREATE TABLE IF NOT EXISTS content_items (
            id          INTEGER PRIMARY KEY,
            message_id  INTEGER NOT NULL REFERENCES messages(id),
            expires_at  INTEGER NOT NULL,
            payload     TEXT NOT NULL,
            terms       TEXT NOT NULL DEFAULT '{}',
            feed_ids    TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_content_message
            ON content_items(message_id);

        CREATE INDEX IF NOT EXISTS idx_content_expires
            ON content_items(expires_at);

        CREATE TABLE IF NOT EXISTS feed_content (
            content_id      INTEGER PRIMARY KEY REFERENCES content_items(id),
            message_id      INTEGER NOT NULL,
            title           TEXT NOT NULL DEFAULT '',
            friendly_name   TEXT NOT NULL DEFAULT '',
            description     TEXT NOT NULL DEFAULT '',
            icon_url        TEXT NOT NULL DEFAULT '',
            image_url       TEXT NOT NULL DEFAULT '',
            latitude        REAL,
            longitude       REAL,
            expires_at      INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS feeds (
            id              INTEGER PRIMARY KEY,
            source_id       TEXT,
            source_value    TEXT,
            view_name       TEXT UNIQUE,
            content_ids     TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS rules (
            id                  INTEGER PRIMARY KEY,
            element_name        TEXT NOT NULL DEFAULT '',
            source_id           TEXT NOT NULL,
            source_value        TEXT NOT NULL,
            feed_ids            TEXT NOT NULL DEFAULT '[]',
            federation_uris     TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_rules_source
            ON rules(source_id COLLATE NOCASE, source_value);

        CREATE TABLE IF NOT EXISTS source_values (
            id          INTEGER PRIMARY KEY,
            list_id     INTEGER NOT NULL,
            source_id   TEXT NOT NULL,
            value       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_source_values_list
            ON source_values(list_id);

        -- Audit trail, append only
        CREATE TABLE IF NOT EXISTS archive (
            seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id          INTEGER NOT NULL,
            distribution_id     TEXT NOT NULL,
            sender_id           TEXT NOT NULL,
            sent_at             INTEGER NOT NULL,
            source_ip           TEXT NOT NULL,
            logged_at           INTEGER NOT NULL,
            body                TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
