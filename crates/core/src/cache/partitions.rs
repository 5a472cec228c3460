//! Named partitions of request→response pairs.
//!
//! A partition behaves like a browser cache storage bucket: it is created
//! on first open, holds one response per canonical URL, and is dropped as
//! a unit. Only retrieval (`GET`) responses are ever stored.

use super::connection::CacheDb;
use super::hash::compute_entry_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Canonical request URL.
    pub url: String,
    pub status: u16,
    /// Response headers as ordered name/value pairs.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl CacheEntry {
    /// Build an entry stamped with the current time.
    pub fn new(url: impl Into<String>, status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self { url: url.into(), status, headers, body, stored_at: stamp_now() }
    }

    /// Look up a header value, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Fixed-width UTC timestamp, so stored values order lexically.
fn stamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Summary of a partition for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PartitionInfo {
    pub name: String,
    pub created_at: String,
    pub entries: u64,
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, u16, String, Vec<u8>, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_entry(raw: (String, u16, String, Vec<u8>, String)) -> Result<CacheEntry, Error> {
    let (url, status, headers_json, body, stored_at) = raw;
    let headers = serde_json::from_str(&headers_json)
        .map_err(|e| Error::CorruptEntry(format!("headers for {url}: {e}")))?;
    Ok(CacheEntry { url, status, headers, body, stored_at })
}

fn insert_entry(conn: &rusqlite::Connection, partition: &str, entry: &CacheEntry) -> Result<(), Error> {
    let headers_json =
        serde_json::to_string(&entry.headers).map_err(|e| Error::InvalidInput(format!("headers: {e}")))?;
    conn.execute(
        "INSERT INTO partition_entries (partition, key_hash, url, method, status, headers_json, body, stored_at)
         VALUES (?1, ?2, ?3, 'GET', ?4, ?5, ?6, ?7)
         ON CONFLICT(partition, key_hash) DO UPDATE SET
            url = excluded.url,
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            partition,
            compute_entry_key(&entry.url),
            &entry.url,
            entry.status,
            headers_json,
            &entry.body,
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

fn ensure_partition(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

impl CacheDb {
    /// Open a partition, creating it if it doesn't exist.
    pub async fn open_partition(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> { ensure_partition(conn, &name) })
            .await
            .map_err(Error::from)
    }

    /// Check whether a partition exists.
    pub async fn has_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM partitions WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// List partition names in creation order.
    pub async fn list_partitions(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// List partitions with their entry counts, in creation order.
    pub async fn partition_stats(&self) -> Result<Vec<PartitionInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<PartitionInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT p.name, p.created_at, COUNT(e.key_hash)
                     FROM partitions p LEFT JOIN partition_entries e ON e.partition = p.name
                     GROUP BY p.name ORDER BY p.rowid ASC",
                )?;
                let stats = stmt
                    .query_map([], |row| {
                        Ok(PartitionInfo {
                            name: row.get(0)?,
                            created_at: row.get(1)?,
                            entries: row.get::<_, i64>(2)? as u64,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(stats)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and everything stored in it.
    ///
    /// Returns false if the partition didn't exist.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace one entry, opening the partition if needed.
    pub async fn put_entry(&self, partition: &str, entry: &CacheEntry) -> Result<(), Error> {
        let partition = partition.to_string();
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                ensure_partition(conn, &partition)?;
                insert_entry(conn, &partition, &entry)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert many entries in a single transaction.
    ///
    /// Either every entry is stored or none is.
    pub async fn put_entries(&self, partition: &str, entries: Vec<CacheEntry>) -> Result<(), Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_partition(&tx, &partition)?;
                for entry in &entries {
                    insert_entry(&tx, &partition, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Find the entry for a URL in one partition.
    pub async fn match_entry(&self, partition: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
        let partition = partition.to_string();
        let key = compute_entry_key(url);
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<_>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, status, headers_json, body, stored_at
                     FROM partition_entries WHERE partition = ?1 AND key_hash = ?2",
                )?;
                match stmt.query_row(params![partition, key], row_to_entry) {
                    Ok(raw) => Ok(Some(raw)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        raw.map(decode_entry).transpose()
    }

    /// Find the entry for a URL in any partition.
    ///
    /// The most recently stored copy wins; ties go to the older partition.
    pub async fn match_any(&self, url: &str) -> Result<Option<CacheEntry>, Error> {
        let key = compute_entry_key(url);
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<_>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT e.url, e.status, e.headers_json, e.body, e.stored_at
                     FROM partition_entries e JOIN partitions p ON p.name = e.partition
                     WHERE e.key_hash = ?1
                     ORDER BY e.stored_at DESC, p.rowid ASC LIMIT 1",
                )?;
                match stmt.query_row(params![key], row_to_entry) {
                    Ok(raw) => Ok(Some(raw)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        raw.map(decode_entry).transpose()
    }

    /// Delete the entry for a URL from one partition.
    pub async fn delete_entry(&self, partition: &str, url: &str) -> Result<bool, Error> {
        let partition = partition.to_string();
        let key = compute_entry_key(url);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM partition_entries WHERE partition = ?1 AND key_hash = ?2",
                    params![partition, key],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Count entries stored in a partition.
    pub async fn count_entries(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM partition_entries WHERE partition = ?1",
                    params![partition],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &str) -> CacheEntry {
        CacheEntry::new(url, 200, vec![("Content-Type".into(), "text/css".into())], body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("static-v1", &entry("https://site.test/styles.css", "body{}"))
            .await
            .unwrap();

        let hit = db
            .match_entry("static-v1", "https://site.test/styles.css")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.body, b"body{}");
        assert_eq!(hit.header("content-type"), Some("text/css"));
        assert!(db.match_entry("other", "https://site.test/styles.css").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_any_prefers_freshest_copy() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_partition("first").await.unwrap();
        db.open_partition("second").await.unwrap();

        let mut older = entry("https://site.test/a.js", "first");
        older.stored_at = "2026-01-01T00:00:00.000000Z".into();
        let mut newer = entry("https://site.test/a.js", "second");
        newer.stored_at = "2026-01-02T00:00:00.000000Z".into();
        db.put_entry("first", &older).await.unwrap();
        db.put_entry("second", &newer).await.unwrap();

        let hit = db.match_any("https://site.test/a.js").await.unwrap().unwrap();
        assert_eq!(hit.body, b"second");
        assert!(db.match_any("https://site.test/missing.js").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_any_tie_goes_to_oldest_partition() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_partition("first").await.unwrap();
        let mut a = entry("https://site.test/a.js", "second");
        a.stored_at = "2026-01-01T00:00:00.000000Z".into();
        db.put_entry("second", &a).await.unwrap();
        a.body = b"first".to_vec();
        db.put_entry("first", &a).await.unwrap();

        let hit = db.match_any("https://site.test/a.js").await.unwrap().unwrap();
        assert_eq!(hit.body, b"first");
    }

    #[tokio::test]
    async fn test_upsert_replaces_body() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("p", &entry("https://site.test/", "old")).await.unwrap();
        db.put_entry("p", &entry("https://site.test/", "new")).await.unwrap();

        assert_eq!(db.count_entries("p").await.unwrap(), 1);
        let hit = db.match_entry("p", "https://site.test/").await.unwrap().unwrap();
        assert_eq!(hit.body, b"new");
    }

    #[tokio::test]
    async fn test_delete_partition_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entries(
            "old-v0",
            vec![entry("https://site.test/a.css", "a"), entry("https://site.test/b.css", "b")],
        )
        .await
        .unwrap();
        assert_eq!(db.count_entries("old-v0").await.unwrap(), 2);

        assert!(db.delete_partition("old-v0").await.unwrap());
        assert!(!db.delete_partition("old-v0").await.unwrap());
        assert_eq!(db.count_entries("old-v0").await.unwrap(), 0);
        assert!(db.match_any("https://site.test/a.css").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_stats_in_creation_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_partition("b").await.unwrap();
        db.put_entry("a", &entry("https://site.test/x", "x")).await.unwrap();

        assert_eq!(db.list_partitions().await.unwrap(), vec!["b".to_string(), "a".to_string()]);

        let stats = db.partition_stats().await.unwrap();
        assert_eq!(stats[0].entries, 0);
        assert_eq!(stats[1].name, "a");
        assert_eq!(stats[1].entries, 1);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("p", &entry("https://site.test/x", "x")).await.unwrap();
        assert!(db.delete_entry("p", "https://site.test/x").await.unwrap());
        assert!(!db.delete_entry("p", "https://site.test/x").await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_headers_are_corrupt() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("static-v1", &entry("https://site.test/styles.css", "body{}")).await.unwrap();
        db.conn
            .call(|conn| conn.execute("UPDATE partition_entries SET headers_json = '{not json'", []))
            .await
            .unwrap();

        let err = db.match_any("https://site.test/styles.css").await.unwrap_err();
        assert!(matches!(err, Error::CorruptEntry(_)));
        let err = db.match_entry("static-v1", "https://site.test/styles.css").await.unwrap_err();
        assert!(matches!(err, Error::CorruptEntry(_)));
    }
}
