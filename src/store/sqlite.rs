//! Reference relational store (spec.md §6 schema), backed by a bundled
//! SQLite via `rusqlite` so the crate has no system SQLite dependency.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::hasher::Fingerprint;

use super::{Counts, FingerprintStore, Track};

const CREATE_SONGS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS songs (
    song_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    song_name     TEXT NOT NULL,
    fingerprinted INTEGER NOT NULL DEFAULT 0,
    file_sha1     TEXT NOT NULL UNIQUE,
    total_hashes  INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at    TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

const CREATE_FINGERPRINTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS fingerprints (
    hash    BLOB NOT NULL,
    song_id INTEGER NOT NULL REFERENCES songs(song_id) ON DELETE CASCADE,
    offset  INTEGER NOT NULL,
    UNIQUE(song_id, offset, hash)
)";

const CREATE_HASH_INDEX: &str = "
CREATE INDEX IF NOT EXISTS fingerprints_hash_idx ON fingerprints(hash)";

/// SQLite-backed `FingerprintStore`.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let mut store = SqliteStore { conn };
        store.setup()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let mut store = SqliteStore { conn };
        store.setup()?;
        Ok(store)
    }

    fn row_to_track(
        id: i64,
        name: String,
        fingerprinted: i64,
        sha1: String,
        total_hashes: i64,
    ) -> Track {
        Track {
            id,
            name,
            content_sha1: sha1,
            fingerprinted: fingerprinted != 0,
            total_hashes,
        }
    }
}

impl FingerprintStore for SqliteStore {
    fn setup(&mut self) -> Result<()> {
        self.conn.execute_batch(CREATE_SONGS_TABLE)?;
        self.conn.execute_batch(CREATE_FINGERPRINTS_TABLE)?;
        self.conn.execute_batch(CREATE_HASH_INDEX)?;
        self.delete_unfingerprinted()?;
        Ok(())
    }

    fn empty(&mut self) -> Result<()> {
        self.conn.execute_batch("DROP TABLE IF EXISTS fingerprints")?;
        self.conn.execute_batch("DROP TABLE IF EXISTS songs")?;
        self.setup()
    }

    fn insert_track(&mut self, name: &str, content_sha1: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO songs (song_name, fingerprinted, file_sha1, total_hashes) \
             VALUES (?1, 0, ?2, 0)",
            params![name, content_sha1],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn set_track_fingerprinted(&mut self, track_id: i64, total_hashes: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE songs SET fingerprinted = 1, total_hashes = ?2, \
             updated_at = CURRENT_TIMESTAMP WHERE song_id = ?1",
            params![track_id, total_hashes],
        )?;
        Ok(())
    }

    fn insert_hashes(
        &mut self,
        track_id: i64,
        hashes: &[Fingerprint],
        batch_size: usize,
    ) -> Result<()> {
        let batch_size = batch_size.max(1);
        for chunk in hashes.chunks(batch_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO fingerprints (hash, song_id, offset) \
                     VALUES (?1, ?2, ?3)",
                )?;
                for fp in chunk {
                    stmt.execute(params![fp.hash, track_id, fp.offset])
                        .map_err(|e| Error::StoreTransient(e.to_string()))?;
                }
            }
            tx.commit()?;
        }
        Ok(())
    }

    fn get_track(&mut self, track_id: i64) -> Result<Option<Track>> {
        self.conn
            .query_row(
                "SELECT song_id, song_name, fingerprinted, file_sha1, total_hashes \
                 FROM songs WHERE song_id = ?1",
                params![track_id],
                |row| {
                    Ok(Self::row_to_track(
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_tracks(&mut self) -> Result<Vec<Track>> {
        let mut stmt = self.conn.prepare(
            "SELECT song_id, song_name, fingerprinted, file_sha1, total_hashes \
             FROM songs WHERE fingerprinted = 1",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Self::row_to_track(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_tracks(&mut self, track_ids: &[i64]) -> Result<()> {
        if track_ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; track_ids.len()].join(",");
        let sql = format!("DELETE FROM songs WHERE song_id IN ({placeholders})");
        self.conn
            .execute(&sql, params_from_iter(track_ids.iter()))?;
        Ok(())
    }

    fn delete_unfingerprinted(&mut self) -> Result<()> {
        self.conn
            .execute("DELETE FROM songs WHERE fingerprinted = 0", [])?;
        Ok(())
    }

    fn return_matches(
        &mut self,
        hashes: &[Vec<u8>],
        batch_size: usize,
    ) -> Result<Vec<(Vec<u8>, i64, i64)>> {
        let batch_size = batch_size.max(1);
        let mut results = Vec::new();

        for chunk in hashes.chunks(batch_size) {
            if chunk.is_empty() {
                continue;
            }
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT hash, song_id, offset FROM fingerprints WHERE hash IN ({placeholders})"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                let hash: Vec<u8> = row.get(0)?;
                let song_id: i64 = row.get(1)?;
                let offset: i64 = row.get(2)?;
                Ok((hash, song_id, offset))
            })?;
            for row in rows {
                results.push(row.map_err(Error::from)?);
            }
        }

        Ok(results)
    }

    fn counts(&mut self) -> Result<Counts> {
        let tracks: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM songs WHERE fingerprinted = 1", [], |r| {
                    r.get(0)
                })?;
        let hashes: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM fingerprints", [], |r| r.get(0))?;
        Ok(Counts { tracks, hashes })
    }
}
