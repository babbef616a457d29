//! Durable snapshot store: one JSON object per
//! device, one per line, written atomically (temp file + rename, grounded
//! on `write_atomic`'s original header-and-rename shape) on a fixed
//! cadence and on shutdown. Two in-memory indexes are rebuilt from the
//! file on load: by `mac` for point
//! lookups on cache miss, and by `last_seen` for eviction-order
//! inspection/ops tooling.
use crate::model::Device;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::thread;

struct Indexes {
    by_mac: std::collections::HashMap<String, Device>,
    by_last_seen: BTreeMap<(DateTime<Utc>, String), ()>,
}

impl Indexes {
    fn empty() -> Self {
        Self {
            by_mac: std::collections::HashMap::new(),
            by_last_seen: BTreeMap::new(),
        }
    }

    fn insert(&mut self, device: Device) {
        if let Some(prev) = self.by_mac.get(&device.mac) {
            self.by_last_seen.remove(&(prev.last_seen, prev.mac.clone()));
        }
        self.by_last_seen
            .insert((device.last_seen, device.mac.clone()), ());
        self.by_mac.insert(device.mac.clone(), device);
    }
}

/// The durable store. `path` holds the current snapshot; writes land in a
/// sibling `.partial` file and are renamed into place so a reader never
/// observes a half-written snapshot.
pub struct SnapshotStore {
    path: PathBuf,
    indexes: RwLock<Indexes>,
}

impl SnapshotStore {
    /// Opens (and, if present, loads) the snapshot at `path`. A missing
    /// file is not an error: the store starts empty, matching a
    /// first-run agent with no prior history.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let indexes = if path.exists() {
            load_indexes(&path)?
        } else {
            Indexes::empty()
        };
        Ok(Self {
            path,
            indexes: RwLock::new(indexes),
        })
    }

    /// Rehydrates a device record by `mac` on aggregator cache miss.
    pub fn get(&self, mac: &str) -> Option<Device> {
        self.indexes.read().unwrap().by_mac.get(mac).cloned()
    }

    pub fn len(&self) -> usize {
        self.indexes.read().unwrap().by_mac.len()
    }

    /// Upserts `devices` into the existing index set and flushes the
    /// merged result to disk atomically. Called by the periodic snapshot
    /// worker with the aggregator's current cache-resident device list
    /// (enumerate then serialize outside the aggregator's lock). A device
    /// evicted from the in-memory cache is not in `devices` but keeps its
    /// previously persisted record here: eviction must not erase history.
    pub fn flush(&self, devices: Vec<Device>) -> anyhow::Result<()> {
        let merged = {
            let mut indexes = self.indexes.write().unwrap();
            for d in devices {
                indexes.insert(d);
            }
            indexes.by_mac.values().cloned().collect::<Vec<_>>()
        };
        write_atomic(&self.path, merged.iter())?;
        Ok(())
    }

    /// Devices ordered oldest-`last_seen`-first, for ops inspection.
    pub fn oldest_first(&self) -> Vec<Device> {
        let idx = self.indexes.read().unwrap();
        idx.by_last_seen
            .keys()
            .filter_map(|(_, mac)| idx.by_mac.get(mac).cloned())
            .collect()
    }
}

fn write_atomic<'a>(path: &Path, devices: impl Iterator<Item = &'a Device>) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let tmp = tmp_path(path);
    {
        let mut f = File::create(&tmp).with_context(|| format!("create tmp snapshot {:?}", tmp))?;
        for device in devices {
            let line = serde_json::to_string(device)?;
            writeln!(f, "{line}")?;
        }
        f.sync_all().ok();
    }
    fs::rename(&tmp, path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))?;
    Ok(())
}

fn load_indexes(path: &Path) -> anyhow::Result<Indexes> {
    let f = File::open(path).with_context(|| format!("open snapshot {:?}", path))?;
    let mut indexes = Indexes::empty();
    for line in BufReader::new(f).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let device: Device = serde_json::from_str(&line)
            .with_context(|| "malformed snapshot line, skipping rest of file")?;
        indexes.insert(device);
    }
    Ok(indexes)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("tmp");
    p.set_extension(format!("{ext}.partial"));
    p
}

/// Background worker: flushes the store on a fixed cadence, and once more
/// when `stop` fires (a final flush before interface
/// detach).
pub fn spawn_periodic_flush(
    store: std::sync::Arc<SnapshotStore>,
    devices: impl Fn() -> Vec<Device> + Send + 'static,
    period: std::time::Duration,
    stop: std::sync::Arc<crate::util::BarrierFlag>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("snapshot-writer".into())
        .spawn(move || {
            log::info!("snapshot writer started -> {:?}", store.path);
            let tick = std::time::Duration::from_millis(200).min(period);
            let mut elapsed = std::time::Duration::ZERO;
            while !stop.is_raised() {
                thread::sleep(tick);
                elapsed += tick;
                if elapsed >= period {
                    elapsed = std::time::Duration::ZERO;
                    if let Err(e) = store.flush(devices()) {
                        log::error!("periodic snapshot flush failed: {e:?}");
                    }
                }
            }
            if let Err(e) = store.flush(devices()) {
                log::error!("final snapshot flush failed: {e:?}");
            }
        })
        .expect("spawn snapshot writer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dev(mac: &str) -> Device {
        Device::new(mac.into(), "Unknown".into(), "eth0".into(), Utc::now())
    }

    #[test]
    fn flush_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.jsonl");
        let store = SnapshotStore::open(&path).unwrap();
        store.flush(vec![dev("aa:bb:cc:dd:ee:01"), dev("aa:bb:cc:dd:ee:02")]).unwrap();

        let reloaded = SnapshotStore::open(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.get("aa:bb:cc:dd:ee:01").is_some());
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().join("missing.jsonl")).unwrap();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn evicted_device_survives_later_partial_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.jsonl");
        let store = SnapshotStore::open(&path).unwrap();
        store
            .flush(vec![dev("aa:bb:cc:dd:ee:01"), dev("aa:bb:cc:dd:ee:02")])
            .unwrap();

        // Second flush only carries the still-cache-resident device; the
        // other one was evicted from memory but must remain on disk.
        store.flush(vec![dev("aa:bb:cc:dd:ee:02")]).unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get("aa:bb:cc:dd:ee:01").is_some());

        let reloaded = SnapshotStore::open(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.get("aa:bb:cc:dd:ee:01").is_some());
    }

    #[test]
    fn oldest_first_orders_by_last_seen() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().join("snap.jsonl")).unwrap();
        let mut older = dev("aa:bb:cc:dd:ee:01");
        older.last_seen = Utc::now() - chrono::Duration::seconds(60);
        let newer = dev("aa:bb:cc:dd:ee:02");
        store.flush(vec![newer, older]).unwrap();
        let ordered = store.oldest_first();
        assert_eq!(ordered[0].mac, "aa:bb:cc:dd:ee:01");
    }
}
