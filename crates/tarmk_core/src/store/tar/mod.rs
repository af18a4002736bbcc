//! Tar-backed segment store.
//!
//! Segments are appended as tar entries to numbered containers
//! (`data00000.tar`, `data00001.tar`, ...). Only the last container accepts
//! writes; once the next entry would push it past `max_container_size` it
//! is closed with an end-of-archive marker, synced and sealed, and a new
//! container is started. Sealed containers are valid tar archives.
//!
//! The index `segment id -> (container, offset, length, generation)` lives
//! in memory. It is rebuilt at open by scanning every container's headers:
//!
//! - a zero block or the end of file ends a container
//! - a damaged entry (bad header checksum, unknown name, short payload,
//!   failed crc) is a torn tail: the active container is truncated back to
//!   the last good entry, while damage in a sealed container is fatal
//! - a last container that already carries its end-of-archive marker was
//!   sealed by an interrupted rollover; it stays sealed and a fresh
//!   container becomes active
//! - a sealed container missing its marker gets one
//!
//! The first failed write (an append, a rollover, a journal line, a flush
//! or a container deletion) fails the store: later changes are refused with
//! `StoreFailed` until it is reopened, since the failure may have left
//! partial bytes that only recovery removes.
//!
//! Deleting single segments only drops them from the index; the bytes stay
//! in their container until the whole container is reclaimed. A deleted
//! segment therefore reappears after reopen, which is harmless because
//! nothing reachable refers to it.

mod dir;
mod entry;
mod journal_log;
mod latch;

use self::dir::StoreDir;
use self::entry::{ScannedEntry, END_OF_ARCHIVE};
use self::journal_log::TarJournalLog;
use self::latch::FailureLatch;
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::segment::Segment;
use crate::stats::{StatsSnapshot, StoreStats};
use crate::store::{Journal, JournalLog, ReclaimReport, SegmentStore};
use crate::types::{Generation, RecordId, SegmentId};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tarmk_storage::{FileBackend, StorageBackend};
use tracing::{debug, info, warn};

/// Where a segment lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexEntry {
    container: u32,
    offset: u64,
    length: u64,
    generation: Generation,
}

/// One tar file.
struct Container {
    path: PathBuf,
    backend: RwLock<Box<dyn StorageBackend>>,
}

impl Container {
    fn open(path: PathBuf) -> CoreResult<Self> {
        let backend = FileBackend::open(&path)?;
        Ok(Self {
            path,
            backend: RwLock::new(Box::new(backend)),
        })
    }

    fn read(&self, offset: u64, len: u64) -> CoreResult<Vec<u8>> {
        let len = usize::try_from(len)
            .map_err(|_| CoreError::segment_corruption("entry length exceeds address space"))?;
        Ok(self.backend.read().read_at(offset, len)?)
    }
}

struct TarState {
    containers: BTreeMap<u32, Arc<Container>>,
    active: u32,
    index: HashMap<SegmentId, IndexEntry>,
}

impl TarState {
    fn active(&self) -> CoreResult<Arc<Container>> {
        self.containers
            .get(&self.active)
            .cloned()
            .ok_or_else(|| CoreError::invalid_operation("active container missing"))
    }

    fn locate(&self, id: SegmentId) -> CoreResult<(IndexEntry, Arc<Container>)> {
        let entry = *self
            .index
            .get(&id)
            .ok_or(CoreError::SegmentNotFound { id })?;
        let container = self
            .containers
            .get(&entry.container)
            .cloned()
            .ok_or(CoreError::SegmentNotFound { id })?;
        Ok((entry, container))
    }
}

/// Segment store persisting to tar containers in one directory.
///
/// # Example
///
/// ```rust,no_run
/// use tarmk_core::{SegmentStore, StoreConfig, TarStore};
/// use std::path::Path;
///
/// let store = TarStore::open(Path::new("repository"), StoreConfig::default())?;
/// let root = store.journal("root")?;
/// println!("head: {:?}", root.head());
/// # Ok::<(), tarmk_core::CoreError>(())
/// ```
pub struct TarStore {
    dir: StoreDir,
    config: StoreConfig,
    state: RwLock<TarState>,
    /// Serializes appends, rollover and reclamation.
    append: Mutex<()>,
    journals: Mutex<HashMap<String, Arc<Journal>>>,
    journal_log: Arc<TarJournalLog>,
    failed: Arc<FailureLatch>,
    stats: Arc<StoreStats>,
}

impl TarStore {
    /// Opens the store at `path`, rebuilding the index and journals.
    ///
    /// # Errors
    ///
    /// Returns `StoreLocked` if another instance holds the directory,
    /// `SegmentCorruption` if a sealed container is damaged, or an I/O
    /// error.
    pub fn open(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        let dir = StoreDir::open(path, config.create_if_missing)?;
        let stats = Arc::new(StoreStats::new());

        let mut numbers = dir.container_numbers()?;
        if numbers.is_empty() {
            numbers.push(0);
            stats.record_container_created();
        }
        let mut active = numbers.last().copied().unwrap_or(0);
        let mut active_closed = false;

        let mut containers = BTreeMap::new();
        let mut index = HashMap::new();
        for number in numbers {
            let container = Container::open(dir.container_path(number))?;
            let is_active = number == active;
            let (entries, closed) = recover_container(&container, number, is_active)?;
            if is_active && closed {
                active_closed = true;
            }
            for entry in entries {
                if index.contains_key(&entry.id) {
                    warn!(segment = %entry.id, container = number, "duplicate segment entry ignored");
                    continue;
                }
                index.insert(
                    entry.id,
                    IndexEntry {
                        container: number,
                        offset: entry.offset,
                        length: entry.length,
                        generation: entry.generation,
                    },
                );
            }
            if !is_active || closed {
                container.backend.write().seal();
            }
            containers.insert(number, Arc::new(container));
        }
        if active_closed {
            warn!(container = active, "last container already sealed, starting the next one");
            active += 1;
            containers.insert(active, Arc::new(Container::open(dir.container_path(active))?));
            stats.record_container_created();
        }

        let failed = Arc::new(FailureLatch::new());
        let (journal_log, updates) = TarJournalLog::open(
            &dir.journal_path(),
            config.sync_on_flush,
            Arc::clone(&failed),
        )?;
        let journal_log = Arc::new(journal_log);
        let mut heads: HashMap<String, RecordId> = HashMap::new();
        for (name, head) in updates {
            if index.contains_key(&head.segment()) {
                heads.insert(name, head);
            } else {
                warn!(journal = %name, %head, "skipping journal entry for missing segment");
            }
        }

        let log: Arc<dyn JournalLog> = journal_log.clone();
        let journals = heads
            .into_iter()
            .map(|(name, head)| {
                let journal = Journal::new(&name, Some(head), Some(Arc::clone(&log)), Arc::clone(&stats));
                (name, Arc::new(journal))
            })
            .collect::<HashMap<_, _>>();

        info!(
            path = %dir.path().display(),
            containers = containers.len(),
            segments = index.len(),
            journals = journals.len(),
            "tar store opened"
        );

        Ok(Self {
            dir,
            config,
            state: RwLock::new(TarState {
                containers,
                active,
                index,
            }),
            append: Mutex::new(()),
            journals: Mutex::new(journals),
            journal_log,
            failed,
            stats,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the number of containers on disk.
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.state.read().containers.len()
    }

    /// Returns the container file paths, oldest first.
    #[must_use]
    pub fn container_paths(&self) -> Vec<PathBuf> {
        self.state
            .read()
            .containers
            .values()
            .map(|c| c.path.clone())
            .collect()
    }

    /// Returns the number of indexed segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.state.read().index.len()
    }

    /// Seals the active container and opens the next one.
    ///
    /// The next file exists before the marker is written, so a crash in
    /// between leaves a container that open seals and never one that
    /// reopens as active behind its own marker.
    ///
    /// Caller holds the append lock.
    fn roll_over(&self) -> CoreResult<()> {
        let (current, next) = {
            let state = self.state.read();
            (state.active()?, state.active + 1)
        };
        let container = Arc::new(Container::open(self.dir.container_path(next))?);
        {
            let mut backend = current.backend.write();
            close_archive(&mut **backend)?;
            backend.seal();
        }

        let mut state = self.state.write();
        state.containers.insert(next, container);
        state.active = next;
        drop(state);

        self.stats.record_container_created();
        debug!(sealed = %current.path.display(), active = next, "container rolled over");
        Ok(())
    }

    /// Appends one encoded entry, rolling over first if it would not fit.
    /// Returns the container number and the entry's offset.
    ///
    /// Caller holds the append lock.
    fn append_entry(&self, bytes: &[u8]) -> CoreResult<(u32, u64)> {
        let active_size = self.state.read().active()?.backend.read().size()?;
        if active_size > 0 && active_size + bytes.len() as u64 > self.config.max_container_size {
            self.roll_over()?;
        }

        let (container, number) = {
            let state = self.state.read();
            (state.active()?, state.active)
        };
        let offset = container.backend.write().append(bytes)?;
        Ok((number, offset))
    }
}

/// Appends the end-of-archive marker and syncs.
fn close_archive(backend: &mut dyn StorageBackend) -> CoreResult<()> {
    backend.append(&END_OF_ARCHIVE)?;
    backend.flush()?;
    backend.sync()?;
    Ok(())
}

/// Scans one container at open, cutting a torn tail off the active one
/// and making sure every closed container ends in exactly one marker.
///
/// Returns the entries and whether the container is closed.
fn recover_container(
    container: &Container,
    number: u32,
    is_active: bool,
) -> CoreResult<(Vec<ScannedEntry>, bool)> {
    let scan = {
        let backend = container.backend.read();
        entry::scan(&**backend)?
    };
    let mut backend = container.backend.write();
    let size = backend.size()?;

    if let Some(reason) = scan.torn {
        if !is_active {
            return Err(CoreError::segment_corruption(format!(
                "sealed container {} is damaged: {reason}",
                container.path.display()
            )));
        }
        backend.truncate(scan.end)?;
        backend.sync()?;
        warn!(container = number, dropped = size - scan.end, %reason, "truncated torn container tail");
        return Ok((scan.entries, false));
    }

    if scan.closed {
        let marker_end = scan.end + END_OF_ARCHIVE.len() as u64;
        if size != marker_end {
            backend.truncate(scan.end)?;
            close_archive(&mut **backend)?;
            warn!(container = number, tail = size - scan.end, "rewrote end-of-archive marker");
        }
        return Ok((scan.entries, true));
    }

    if !is_active {
        close_archive(&mut **backend)?;
        debug!(container = number, "sealed container was missing its end-of-archive marker");
    }
    Ok((scan.entries, !is_active))
}

impl SegmentStore for TarStore {
    fn write(&self, id: SegmentId, data: Bytes, references: Vec<SegmentId>) -> CoreResult<()> {
        let segment = Segment::parse(id, data, references)?;
        let _append = self.append.lock();
        self.failed.check()?;

        {
            let state = self.state.read();
            if state.index.contains_key(&id) {
                return Err(CoreError::SegmentExists { id });
            }
            if let Some(missing) = segment
                .references()
                .iter()
                .find(|r| !state.index.contains_key(r))
            {
                return Err(CoreError::SegmentNotFound { id: *missing });
            }
        }

        let bytes = entry::encode_entry(id, segment.generation(), segment.data(), segment.references())?;
        let (number, offset) = self.failed.guard(self.append_entry(&bytes))?;

        self.state.write().index.insert(
            id,
            IndexEntry {
                container: number,
                offset: offset + entry::BLOCK,
                length: (4 + segment.references().len() * 16 + segment.data().len() + 4) as u64,
                generation: segment.generation(),
            },
        );
        self.stats.record_write(segment.data().len() as u64);
        Ok(())
    }

    fn read(&self, id: SegmentId) -> CoreResult<Arc<Segment>> {
        let (entry, container) = self.state.read().locate(id)?;
        let payload = container.read(entry.offset, entry.length)?;
        let (data, references) = entry::decode_payload(id, &payload)?;
        let segment = Segment::parse(id, data, references)?;
        if segment.generation() != entry.generation {
            return Err(CoreError::segment_corruption(format!(
                "segment {id} header says generation {}, entry name says {}",
                segment.generation(),
                entry.generation
            )));
        }
        self.stats.record_read(segment.data().len() as u64);
        Ok(Arc::new(segment))
    }

    fn delete(&self, id: SegmentId) -> CoreResult<()> {
        self.state
            .write()
            .index
            .remove(&id)
            .ok_or(CoreError::SegmentNotFound { id })?;
        self.stats.record_delete(1);
        Ok(())
    }

    fn contains(&self, id: SegmentId) -> bool {
        self.state.read().index.contains_key(&id)
    }

    fn segment_ids(&self) -> Vec<SegmentId> {
        self.state.read().index.keys().copied().collect()
    }

    fn generation(&self, id: SegmentId) -> CoreResult<Generation> {
        self.state
            .read()
            .index
            .get(&id)
            .map(|e| e.generation)
            .ok_or(CoreError::SegmentNotFound { id })
    }

    fn references(&self, id: SegmentId) -> CoreResult<Vec<SegmentId>> {
        let (entry, container) = self.state.read().locate(id)?;
        let backend = container.backend.read();
        entry::read_references(&**backend, id, entry.offset)
    }

    fn journal(&self, name: &str) -> CoreResult<Arc<Journal>> {
        if name.is_empty() || name.contains('\n') {
            return Err(CoreError::invalid_operation(format!(
                "invalid journal name {name:?}"
            )));
        }
        let mut journals = self.journals.lock();
        let journal = journals.entry(name.to_string()).or_insert_with(|| {
            let log: Arc<dyn JournalLog> = self.journal_log.clone();
            Arc::new(Journal::new(name, None, Some(log), Arc::clone(&self.stats)))
        });
        Ok(Arc::clone(journal))
    }

    fn journal_head(&self, name: &str) -> CoreResult<Arc<Journal>> {
        self.journals
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::JournalNotFound {
                name: name.to_string(),
            })
    }

    fn journal_names(&self) -> Vec<String> {
        self.journals.lock().keys().cloned().collect()
    }

    fn flush(&self) -> CoreResult<()> {
        self.failed.check()?;
        let container = self.state.read().active()?;
        let mut backend = container.backend.write();
        self.failed.guard(backend.flush())?;
        if self.config.sync_on_flush {
            self.failed.guard(backend.sync())?;
            self.failed.guard(self.journal_log.sync())?;
        }
        Ok(())
    }

    fn reclaim(
        &self,
        keep: &HashSet<SegmentId>,
        below_generation: Generation,
    ) -> CoreResult<ReclaimReport> {
        let _append = self.append.lock();
        self.failed.check()?;
        let mut state = self.state.write();

        let mut by_container: BTreeMap<u32, Vec<(SegmentId, Generation)>> = state
            .containers
            .keys()
            .map(|n| (*n, Vec::new()))
            .collect();
        for (id, entry) in &state.index {
            if let Some(members) = by_container.get_mut(&entry.container) {
                members.push((*id, entry.generation));
            }
        }

        let mut report = ReclaimReport::default();
        for (number, members) in by_container {
            if number == state.active {
                continue;
            }
            let reclaimable = members
                .iter()
                .all(|(id, generation)| !keep.contains(id) && *generation < below_generation);
            if !reclaimable {
                continue;
            }

            let Some(container) = state.containers.remove(&number) else {
                continue;
            };
            for (id, _) in &members {
                state.index.remove(id);
            }
            let size = self.failed.guard(container.backend.read().size())?;
            self.failed.guard(fs::remove_file(&container.path))?;

            report.containers += 1;
            report.segments += members.len() as u64;
            report.bytes += size;
            self.stats.record_container_reclaimed();
            self.stats.record_delete(members.len() as u64);
            debug!(container = number, segments = members.len(), "container reclaimed");
        }
        Ok(report)
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for TarStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("TarStore")
            .field("path", &self.dir.path())
            .field("containers", &state.containers.len())
            .field("active", &state.active)
            .field("segments", &state.index.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentBuilder;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    fn segment(generation: Generation, payload: &[u8], refs: &[SegmentId]) -> (SegmentId, Bytes, Vec<SegmentId>) {
        let mut builder = SegmentBuilder::new(generation);
        builder.add_record(payload, refs.iter().copied());
        builder.finish()
    }

    fn config() -> StoreConfig {
        StoreConfig::default().sync_on_flush(false)
    }

    #[test]
    fn write_read_and_reopen() {
        let dir = tempdir().unwrap();
        let (a, data_a, refs_a) = segment(0, b"alpha", &[]);
        let (b, data_b, refs_b) = segment(1, b"beta", &[a]);
        {
            let store = TarStore::open(dir.path(), config()).unwrap();
            store.write(a, data_a.clone(), refs_a).unwrap();
            store.write(b, data_b.clone(), refs_b).unwrap();
            let root = store.journal("root").unwrap();
            assert!(root.compare_and_set(None, RecordId::new(b, 0)).unwrap());
            store.flush().unwrap();
        }

        let store = TarStore::open(dir.path(), config()).unwrap();
        assert_eq!(store.segment_count(), 2);
        assert_eq!(store.read(a).unwrap().data(), &data_a);
        let read_b = store.read(b).unwrap();
        assert_eq!(read_b.data(), &data_b);
        assert_eq!(read_b.references(), &[a]);
        assert_eq!(store.references(b).unwrap(), vec![a]);
        assert_eq!(store.generation(b).unwrap(), 1);
        assert_eq!(
            store.journal_head("root").unwrap().head(),
            Some(RecordId::new(b, 0))
        );
    }

    #[test]
    fn duplicate_write_rejected() {
        let dir = tempdir().unwrap();
        let store = TarStore::open(dir.path(), config()).unwrap();
        let (id, data, refs) = segment(0, b"x", &[]);
        store.write(id, data.clone(), refs.clone()).unwrap();
        assert!(matches!(
            store.write(id, data, refs),
            Err(CoreError::SegmentExists { .. })
        ));
        assert_eq!(store.segment_count(), 1);
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _store = TarStore::open(dir.path(), config()).unwrap();
        assert!(matches!(
            TarStore::open(dir.path(), config()),
            Err(CoreError::StoreLocked)
        ));
    }

    #[test]
    fn containers_roll_over() {
        let dir = tempdir().unwrap();
        let store = TarStore::open(dir.path(), config().max_container_size(4096)).unwrap();
        let mut ids = Vec::new();
        for _ in 0..8 {
            let (id, data, refs) = segment(0, &[3u8; 1500], &[]);
            store.write(id, data, refs).unwrap();
            ids.push(id);
        }
        assert!(store.container_count() > 1);
        for id in &ids {
            assert!(store.read(*id).is_ok());
        }
        assert_eq!(store.stats().containers_created, store.container_count() as u64);

        drop(store);
        let store = TarStore::open(dir.path(), config().max_container_size(4096)).unwrap();
        for id in &ids {
            assert!(store.read(*id).is_ok());
        }
    }

    #[test]
    fn torn_tail_truncated_on_reopen() {
        let dir = tempdir().unwrap();
        let (good, data, refs) = segment(0, b"survivor", &[]);
        {
            let store = TarStore::open(dir.path(), config()).unwrap();
            store.write(good, data.clone(), refs).unwrap();
        }

        let path = dir.path().join("data00000.tar");
        let clean_len = fs::metadata(&path).unwrap().len();
        let torn = entry::encode_entry(SegmentId::new(), 0, &[9u8; 3000], &[]).unwrap();
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&torn[..1200])
            .unwrap();

        let store = TarStore::open(dir.path(), config()).unwrap();
        assert_eq!(store.segment_count(), 1);
        assert_eq!(store.read(good).unwrap().data(), &data);
        assert_eq!(fs::metadata(&path).unwrap().len(), clean_len);
    }

    #[test]
    fn closed_last_container_stays_sealed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data00000.tar");
        let (first, data, refs) = segment(0, b"first", &[]);
        {
            let store = TarStore::open(dir.path(), config()).unwrap();
            store.write(first, data, refs).unwrap();
            store.flush().unwrap();
        }
        // Marker written, next container never created.
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&END_OF_ARCHIVE)
            .unwrap();
        let closed_len = fs::metadata(&path).unwrap().len();

        let (second, data, refs) = segment(0, b"second", &[first]);
        {
            let store = TarStore::open(dir.path(), config()).unwrap();
            assert_eq!(store.container_count(), 2);
            store.write(second, data.clone(), refs).unwrap();
            store.flush().unwrap();
        }
        assert_eq!(fs::metadata(&path).unwrap().len(), closed_len);

        let store = TarStore::open(dir.path(), config()).unwrap();
        assert!(store.contains(first));
        assert_eq!(store.read(second).unwrap().data(), &data);
        assert_eq!(store.container_count(), 2);
    }

    #[test]
    fn partial_marker_is_completed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data00000.tar");
        let (id, data, refs) = segment(0, b"x", &[]);
        {
            let store = TarStore::open(dir.path(), config()).unwrap();
            store.write(id, data, refs).unwrap();
        }
        let clean_len = fs::metadata(&path).unwrap().len();
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&[0u8; 512])
            .unwrap();

        let store = TarStore::open(dir.path(), config()).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), clean_len + 1024);
        assert_eq!(store.container_count(), 2);
        assert!(store.read(id).is_ok());
    }

    #[test]
    fn sealed_container_without_marker_gets_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data00000.tar");
        let (id, data, refs) = segment(0, b"x", &[]);
        {
            let store = TarStore::open(dir.path(), config()).unwrap();
            store.write(id, data, refs).unwrap();
        }
        // Next container created, marker never written.
        let clean_len = fs::metadata(&path).unwrap().len();
        fs::File::create(dir.path().join("data00001.tar")).unwrap();

        let store = TarStore::open(dir.path(), config()).unwrap();
        assert_eq!(store.container_count(), 2);
        assert_eq!(fs::metadata(&path).unwrap().len(), clean_len + 1024);
        assert!(store.read(id).is_ok());
    }

    #[test]
    fn failed_append_fails_store_until_reopen() {
        let dir = tempdir().unwrap();
        let (kept, data, refs) = segment(0, b"kept", &[]);
        let head = RecordId::new(kept, 0);
        {
            let store = TarStore::open(dir.path(), config()).unwrap();
            store.write(kept, data, refs).unwrap();
            let root = store.journal("root").unwrap();
            assert!(root.compare_and_set(None, head).unwrap());

            // Appends to the active container now fail.
            store.state.read().active().unwrap().backend.write().seal();
            let (lost, data, refs) = segment(0, b"lost", &[]);
            assert!(matches!(store.write(lost, data, refs), Err(CoreError::Storage(_))));

            let (later, data, refs) = segment(0, b"later", &[]);
            assert!(matches!(
                store.write(later, data, refs),
                Err(CoreError::StoreFailed { .. })
            ));
            assert!(matches!(store.flush(), Err(CoreError::StoreFailed { .. })));
            assert!(matches!(
                root.compare_and_set(Some(head), RecordId::new(kept, 1)),
                Err(CoreError::StoreFailed { .. })
            ));
            assert_eq!(root.head(), Some(head));
            assert!(store.read(kept).is_ok());
        }

        let store = TarStore::open(dir.path(), config()).unwrap();
        assert_eq!(store.journal_head("root").unwrap().head(), Some(head));
        let (fresh, data, refs) = segment(0, b"fresh", &[]);
        store.write(fresh, data, refs).unwrap();
        store.flush().unwrap();
    }

    #[test]
    fn journal_line_for_missing_segment_is_skipped() {
        let dir = tempdir().unwrap();
        let (id, data, refs) = segment(0, b"x", &[]);
        {
            let store = TarStore::open(dir.path(), config()).unwrap();
            store.write(id, data, refs).unwrap();
            let root = store.journal("root").unwrap();
            root.compare_and_set(None, RecordId::new(id, 0)).unwrap();
        }
        let ghost = RecordId::new(SegmentId::new(), 0);
        OpenOptions::new()
            .append(true)
            .open(dir.path().join("journal.log"))
            .unwrap()
            .write_all(format!("root {ghost}\n").as_bytes())
            .unwrap();

        let store = TarStore::open(dir.path(), config()).unwrap();
        assert_eq!(
            store.journal_head("root").unwrap().head(),
            Some(RecordId::new(id, 0))
        );
    }

    #[test]
    fn reclaim_deletes_only_dead_sealed_containers() {
        let dir = tempdir().unwrap();
        let store = TarStore::open(dir.path(), config().max_container_size(2048)).unwrap();

        let (old, data, refs) = segment(0, &[1u8; 1200], &[]);
        store.write(old, data, refs).unwrap();
        let (live, data, refs) = segment(0, &[2u8; 1200], &[]);
        store.write(live, data, refs).unwrap();
        let (fresh, data, refs) = segment(1, &[3u8; 1200], &[]);
        store.write(fresh, data, refs).unwrap();
        assert_eq!(store.container_count(), 3);

        let report = store.reclaim(&HashSet::from([live]), 1).unwrap();
        assert_eq!(report.containers, 1);
        assert_eq!(report.segments, 1);
        assert!(!store.contains(old));
        assert!(store.contains(live));
        assert!(store.contains(fresh));
        assert!(!dir.path().join("data00000.tar").exists());
        assert_eq!(
            store.container_paths(),
            vec![dir.path().join("data00001.tar"), dir.path().join("data00002.tar")]
        );
    }

    #[test]
    fn invalid_journal_names_rejected() {
        let dir = tempdir().unwrap();
        let store = TarStore::open(dir.path(), config()).unwrap();
        assert!(store.journal("").is_err());
        assert!(store.journal("a\nb").is_err());
    }
}
