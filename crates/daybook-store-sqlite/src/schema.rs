//! SQL schema for the Daybook SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Inputs written by collaborators. Read in id order.
CREATE TABLE IF NOT EXISTS raw_attendance_events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id  TEXT NOT NULL,
    date        TEXT NOT NULL,   -- YYYY-MM-DD
    event_type  TEXT NOT NULL,
    payload     TEXT,            -- producer JSON, unvalidated
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS daily_node_events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id  TEXT NOT NULL,
    date        TEXT NOT NULL,
    event_type  TEXT NOT NULL,
    payload     TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subject_month_profiles (
    subject_id          TEXT NOT NULL,
    month               TEXT NOT NULL,   -- YYYY-MM
    base_category_code  TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    PRIMARY KEY (subject_id, month)
);

-- Dictionaries outlive the process that generated them.
CREATE TABLE IF NOT EXISTS dictionaries (
    dict_id     TEXT PRIMARY KEY,
    mapping     TEXT NOT NULL,   -- {\"0\": \"<state>\", ...}
    created_at  TEXT NOT NULL
);

-- Versioned daily nodes. Rows are never deleted; a superseded row is frozen.
CREATE TABLE IF NOT EXISTS daily_nodes (
    id                     TEXT PRIMARY KEY,
    subject_id             TEXT NOT NULL,
    date                   TEXT NOT NULL,
    version                INTEGER NOT NULL,
    status                 TEXT NOT NULL CHECK (status IN ('ACTIVE', 'SUPERSEDED')),
    valid_from             TEXT NOT NULL,
    valid_to               TEXT,
    supersedes_id          TEXT REFERENCES daily_nodes(id),
    superseded_by_id       TEXT,
    change_reason_code     TEXT NOT NULL,
    change_note            TEXT,
    statement_id           TEXT NOT NULL,
    inputs_hash            TEXT NOT NULL,
    derived_category_code  TEXT,
    raw_minutes            INTEGER NOT NULL,
    ext_minutes            INTEGER NOT NULL,
    state_token            TEXT NOT NULL,
    dict_id                TEXT NOT NULL REFERENCES dictionaries(dict_id),
    UNIQUE (subject_id, date, version)
);

-- At most one ACTIVE node per (subject, date).
CREATE UNIQUE INDEX IF NOT EXISTS daily_nodes_active_idx
    ON daily_nodes(subject_id, date) WHERE status = 'ACTIVE';

CREATE TRIGGER IF NOT EXISTS daily_nodes_superseded_frozen
BEFORE UPDATE ON daily_nodes WHEN OLD.status = 'SUPERSEDED'
BEGIN
    SELECT RAISE(ABORT, 'superseded daily nodes are immutable');
END;

CREATE TRIGGER IF NOT EXISTS daily_nodes_no_delete
BEFORE DELETE ON daily_nodes
BEGIN
    SELECT RAISE(ABORT, 'daily nodes are never deleted');
END;

-- Append-only audit trail.
CREATE TABLE IF NOT EXISTS calc_history (
    entry_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    daily_node_id  TEXT NOT NULL REFERENCES daily_nodes(id),
    payload        TEXT NOT NULL,   -- canonical JSON of CalcPayload
    recorded_at    TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS calc_history_no_update
BEFORE UPDATE ON calc_history
BEGIN
    SELECT RAISE(ABORT, 'calc history is append-only');
END;

CREATE TRIGGER IF NOT EXISTS calc_history_no_delete
BEFORE DELETE ON calc_history
BEGIN
    SELECT RAISE(ABORT, 'calc history is append-only');
END;

-- Single-row table holding the Unicode pool partition.
CREATE TABLE IF NOT EXISTS codec_pools (
    slot        INTEGER PRIMARY KEY CHECK (slot = 0),
    partition   TEXT NOT NULL,   -- JSON array of 10 arrays of chars
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS raw_events_subject_date_idx
    ON raw_attendance_events(subject_id, date);
CREATE INDEX IF NOT EXISTS node_events_subject_date_idx
    ON daily_node_events(subject_id, date);
CREATE INDEX IF NOT EXISTS daily_nodes_subject_idx  ON daily_nodes(subject_id);
CREATE INDEX IF NOT EXISTS calc_history_node_idx    ON calc_history(daily_node_id);

PRAGMA user_version = 1;
";
