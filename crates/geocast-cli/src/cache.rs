use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::ForecastPeriod;

/// TTL-bounded storage for fetched forecast periods. Expired entries read
/// as a miss.
pub trait ForecastStore {
    fn read(&self, key: &str, now: DateTime<Utc>) -> io::Result<Option<Vec<ForecastPeriod>>>;
    fn write(
        &self,
        key: &str,
        periods: &[ForecastPeriod],
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> io::Result<()>;
}

impl<S: ForecastStore + ?Sized> ForecastStore for Arc<S> {
    fn read(&self, key: &str, now: DateTime<Utc>) -> io::Result<Option<Vec<ForecastPeriod>>> {
        (**self).read(key, now)
    }

    fn write(
        &self,
        key: &str,
        periods: &[ForecastPeriod],
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> io::Result<()> {
        (**self).write(key, periods, now, ttl)
    }
}

impl<S: ForecastStore + ?Sized> ForecastStore for &S {
    fn read(&self, key: &str, now: DateTime<Utc>) -> io::Result<Option<Vec<ForecastPeriod>>> {
        (**self).read(key, now)
    }

    fn write(
        &self,
        key: &str,
        periods: &[ForecastPeriod],
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> io::Result<()> {
        (**self).write(key, periods, now, ttl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub age_secs: u64,
    pub is_fresh: bool,
}

/// Unknown fetch times are treated as already expired.
pub fn evaluate_freshness(
    fetched_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    ttl_secs: u64,
) -> Freshness {
    let Some(fetched_at) = fetched_at else {
        return Freshness {
            age_secs: ttl_secs.saturating_add(1),
            is_fresh: false,
        };
    };
    let age_secs = now
        .signed_duration_since(fetched_at)
        .num_seconds()
        .max(0)
        .try_into()
        .unwrap_or(u64::MAX);

    Freshness {
        age_secs,
        is_fresh: age_secs <= ttl_secs,
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    periods: Vec<ForecastPeriod>,
    fetched_at: DateTime<Utc>,
    ttl_secs: u64,
}

/// Process-local store shared behind a read/write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ForecastStore for MemoryStore {
    fn read(&self, key: &str, now: DateTime<Utc>) -> io::Result<Option<Vec<ForecastPeriod>>> {
        {
            let entries = self.entries.read();
            let Some(entry) = entries.get(key) else {
                return Ok(None);
            };
            if evaluate_freshness(Some(entry.fetched_at), now, entry.ttl_secs).is_fresh {
                return Ok(Some(entry.periods.clone()));
            }
        }

        let mut entries = self.entries.write();
        let still_stale = entries.get(key).is_some_and(|entry| {
            !evaluate_freshness(Some(entry.fetched_at), now, entry.ttl_secs).is_fresh
        });
        if still_stale {
            entries.remove(key);
        }
        Ok(None)
    }

    fn write(
        &self,
        key: &str,
        periods: &[ForecastPeriod],
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> io::Result<()> {
        self.entries.write().insert(
            key.to_string(),
            MemoryEntry {
                periods: periods.to_vec(),
                fetched_at: now,
                ttl_secs: ttl.as_secs(),
            },
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub key: String,
    pub periods: Vec<ForecastPeriod>,
    pub fetched_at: String,
    pub ttl_secs: u64,
}

impl CacheRecord {
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.fetched_at)
            .ok()
            .map(|value| value.with_timezone(&Utc))
    }
}

/// One JSON record per key under `{root}/geocast/`, so the cache outlives
/// a single process.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: cache_dir.into(),
        }
    }

    pub fn cache_path(&self, key: &str) -> PathBuf {
        self.root
            .join("geocast")
            .join(format!("{}.json", slugify(key)))
    }
}

impl ForecastStore for FileStore {
    fn read(&self, key: &str, now: DateTime<Utc>) -> io::Result<Option<Vec<ForecastPeriod>>> {
        let path = self.cache_path(key);
        let Some(record) = read_record(&path)? else {
            return Ok(None);
        };
        if record.key != key {
            return Ok(None);
        }

        let freshness = evaluate_freshness(record.fetched_at(), now, record.ttl_secs);
        if !freshness.is_fresh {
            tracing::debug!(key, age_secs = freshness.age_secs, "evicting stale cache record");
            if let Err(error) = fs::remove_file(&path) {
                tracing::debug!(%error, path = %path.display(), "stale cache record not removed");
            }
            return Ok(None);
        }

        Ok(Some(record.periods))
    }

    fn write(
        &self,
        key: &str,
        periods: &[ForecastPeriod],
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> io::Result<()> {
        let record = CacheRecord {
            key: key.to_string(),
            periods: periods.to_vec(),
            fetched_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            ttl_secs: ttl.as_secs(),
        };
        let payload = serde_json::to_vec(&record)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error.to_string()))?;
        write_atomic(&self.cache_path(key), &payload)
    }
}

/// Corrupt payloads read as `None`.
fn read_record(path: &Path) -> io::Result<Option<CacheRecord>> {
    if !path.exists() {
        return Ok(None);
    }

    let payload = fs::read_to_string(path)?;
    Ok(serde_json::from_str::<CacheRecord>(&payload).ok())
}

static TMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "cache path must have a parent directory",
        )
    })?;
    fs::create_dir_all(parent)?;

    // Temp names are unique per write within the process.
    let sequence = TMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let tmp_path = path.with_extension(format!("{}.{sequence}.tmp", std::process::id()));
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_dash = false;

    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            prev_dash = false;
            out.push(ch.to_ascii_lowercase());
            continue;
        }

        if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }

    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const TTL: Duration = Duration::from_secs(30 * 60);

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 20, hour, minute, 0)
            .single()
            .expect("time")
    }

    fn periods() -> Vec<ForecastPeriod> {
        vec![ForecastPeriod {
            name: "This Afternoon".to_string(),
            temperature: 75,
            short_forecast: "Sunny".to_string(),
            icon: "https://api.weather.gov/icons/land/day/skc?size=medium".to_string(),
            start_time: "2024-11-20T10:00:00-06:00".to_string(),
            precipitation_probability: None,
        }]
    }

    #[test]
    fn freshness_marks_record_as_fresh_within_ttl() {
        let result = evaluate_freshness(Some(at(12, 0)), at(12, 4), 300);
        assert_eq!(result.age_secs, 240);
        assert!(result.is_fresh);
    }

    #[test]
    fn freshness_marks_record_as_stale_after_ttl() {
        let result = evaluate_freshness(Some(at(12, 0)), at(12, 6), 300);
        assert_eq!(result.age_secs, 360);
        assert!(!result.is_fresh);
    }

    #[test]
    fn freshness_treats_unknown_fetch_time_as_stale() {
        assert!(!evaluate_freshness(None, at(12, 0), 300).is_fresh);
    }

    #[test]
    fn memory_store_round_trips_within_ttl() {
        let store = MemoryStore::new();
        store
            .write("weather_forecast:94087", &periods(), at(12, 0), TTL)
            .expect("write");

        let loaded = store.read("weather_forecast:94087", at(12, 29)).expect("read");
        assert_eq!(loaded, Some(periods()));
        assert_eq!(store.read("weather_forecast:10001", at(12, 29)).expect("read"), None);
    }

    #[test]
    fn memory_store_evicts_expired_entries_on_read() {
        let store = MemoryStore::new();
        store
            .write("weather_forecast:94087", &periods(), at(12, 0), TTL)
            .expect("write");

        assert_eq!(store.read("weather_forecast:94087", at(12, 31)).expect("read"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn memory_store_is_shareable_through_arc() {
        let store = Arc::new(MemoryStore::new());
        let writer = Arc::clone(&store);
        writer
            .write("weather_forecast:00000", &periods(), at(12, 0), TTL)
            .expect("write");

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.read("weather_forecast:00000", at(12, 1)).expect("read"),
            Some(periods())
        );
    }

    fn store_round_trip<S: ForecastStore>(store: S) -> Option<Vec<ForecastPeriod>> {
        store
            .write("weather_forecast:94087", &periods(), at(12, 0), TTL)
            .expect("write");
        store.read("weather_forecast:94087", at(12, 5)).expect("read")
    }

    #[test]
    fn borrowed_store_is_a_store() {
        let store = MemoryStore::new();

        assert_eq!(store_round_trip(&store), Some(periods()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_store_path_is_slugged_key() {
        let store = FileStore::new("/tmp/cache");
        assert_eq!(
            store.cache_path("weather_forecast:SW1A 1AA"),
            PathBuf::from("/tmp/cache/geocast/weather-forecast-sw1a-1aa.json")
        );
    }

    #[test]
    fn file_store_round_trips_within_ttl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());

        store
            .write("weather_forecast:94087", &periods(), at(12, 0), TTL)
            .expect("write");
        let loaded = store.read("weather_forecast:94087", at(12, 10)).expect("read");

        assert_eq!(loaded, Some(periods()));
    }

    #[test]
    fn file_store_removes_stale_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        let key = "weather_forecast:94087";

        store.write(key, &periods(), at(12, 0), TTL).expect("write");
        assert_eq!(store.read(key, at(13, 0)).expect("read"), None);
        assert!(!store.cache_path(key).exists());
    }

    #[test]
    fn file_store_handles_corrupt_payload_as_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        let path = store.cache_path("weather_forecast:94087");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "{not-json").expect("write");

        assert_eq!(store.read("weather_forecast:94087", at(12, 0)).expect("read"), None);
    }

    #[test]
    fn file_store_concurrent_writes_of_one_key_all_succeed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        let key = "weather_forecast:94087";

        let results: Vec<io::Result<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| store.write(key, &periods(), at(12, 0), TTL)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread"))
                .collect()
        });

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(store.read(key, at(12, 1)).expect("read"), Some(periods()));
        let leftovers = fs::read_dir(store.cache_path(key).parent().expect("parent"))
            .expect("read dir")
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn file_store_ignores_record_written_for_colliding_slug() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());

        store
            .write("weather_forecast:SW1A 1AA", &periods(), at(12, 0), TTL)
            .expect("write");

        assert_eq!(
            store.read("weather_forecast:sw1a-1aa", at(12, 1)).expect("read"),
            None
        );
    }
}
