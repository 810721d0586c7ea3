//! # Cell Stores
//!
//! Where encoded cell records live between eviction and reload.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use atlas_core::{SimError, SimResult};
use parking_lot::Mutex;

use crate::cell::CellCoord;

/// Backing storage for encoded cell records.
///
/// Implementations run on the streamer's worker thread.
pub trait CellStore: Send + 'static {
    /// Reads the record of `coord`; `None` if the cell was never saved.
    ///
    /// # Errors
    ///
    /// `IoFailure` if the backing storage cannot be read.
    fn load(&mut self, coord: CellCoord) -> SimResult<Option<Vec<u8>>>;

    /// Replaces the record of `coord`.
    ///
    /// # Errors
    ///
    /// `IoFailure` if the backing storage cannot be written.
    fn save(&mut self, coord: CellCoord, bytes: &[u8]) -> SimResult<()>;
}

/// One file per cell under a root directory.
#[derive(Debug)]
pub struct DirCellStore {
    root: PathBuf,
}

impl DirCellStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// `IoFailure` if the directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> SimResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            SimError::IoFailure(format!("failed to create cell store {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    /// File holding the record of `coord`.
    #[must_use]
    pub fn path_of(&self, coord: CellCoord) -> PathBuf {
        self.root
            .join(format!("cell_{}_{}_{}.acel", coord.x, coord.y, coord.z))
    }
}

impl CellStore for DirCellStore {
    fn load(&mut self, coord: CellCoord) -> SimResult<Option<Vec<u8>>> {
        match fs::read(self.path_of(coord)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SimError::IoFailure(format!("failed to read cell {coord}: {e}"))),
        }
    }

    fn save(&mut self, coord: CellCoord, bytes: &[u8]) -> SimResult<()> {
        let path = self.path_of(coord);
        let tmp = path.with_extension("acel.tmp");
        fs::write(&tmp, bytes)
            .map_err(|e| SimError::IoFailure(format!("failed to write cell {coord}: {e}")))?;
        fs::rename(&tmp, &path)
            .map_err(|e| SimError::IoFailure(format!("failed to commit cell {coord}: {e}")))
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: HashMap<CellCoord, Vec<u8>>,
    failing_loads: HashMap<CellCoord, u32>,
    failing_saves: HashMap<CellCoord, u32>,
}

/// Takes one injected failure of `coord` if any are left.
fn take_failure(failing: &mut HashMap<CellCoord, u32>, coord: CellCoord) -> bool {
    match failing.get_mut(&coord) {
        Some(left) if *left > 0 => {
            *left -= 1;
            true
        }
        _ => false,
    }
}

/// In-memory store. Clones share the same records.
#[derive(Clone, Debug, Default)]
pub struct MemoryCellStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryCellStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` loads of `coord` fail.
    pub fn fail_loads(&self, coord: CellCoord, count: u32) {
        self.inner.lock().failing_loads.insert(coord, count);
    }

    /// Makes the next `count` saves of `coord` fail; the stored record is
    /// left as it was.
    pub fn fail_saves(&self, coord: CellCoord, count: u32) {
        self.inner.lock().failing_saves.insert(coord, count);
    }

    /// Raw record of `coord`, if saved.
    #[must_use]
    pub fn record(&self, coord: CellCoord) -> Option<Vec<u8>> {
        self.inner.lock().records.get(&coord).cloned()
    }

    /// Overwrites the raw record of `coord`.
    pub fn put_record(&self, coord: CellCoord, bytes: Vec<u8>) {
        self.inner.lock().records.insert(coord, bytes);
    }

    /// Number of saved cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns true if nothing was saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CellStore for MemoryCellStore {
    fn load(&mut self, coord: CellCoord) -> SimResult<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        if take_failure(&mut inner.failing_loads, coord) {
            return Err(SimError::IoFailure(format!("injected load failure for cell {coord}")));
        }
        Ok(inner.records.get(&coord).cloned())
    }

    fn save(&mut self, coord: CellCoord, bytes: &[u8]) -> SimResult<()> {
        let mut inner = self.inner.lock();
        if take_failure(&mut inner.failing_saves, coord) {
            return Err(SimError::IoFailure(format!("injected save failure for cell {coord}")));
        }
        inner.records.insert(coord, bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirCellStore::open(dir.path().join("cells")).unwrap();
        let coord = CellCoord::new(-1, 2, 3);

        assert_eq!(store.load(coord).unwrap(), None);
        store.save(coord, b"first").unwrap();
        store.save(coord, b"second").unwrap();
        assert_eq!(store.load(coord).unwrap(), Some(b"second".to_vec()));
        assert!(!store.path_of(coord).with_extension("acel.tmp").exists());
    }

    #[test]
    fn test_memory_store_injected_failures() {
        let mut store = MemoryCellStore::new();
        let coord = CellCoord::new(0, 0, 0);
        store.save(coord, b"data").unwrap();
        store.fail_loads(coord, 1);

        assert!(matches!(store.load(coord), Err(SimError::IoFailure(_))));
        assert_eq!(store.load(coord).unwrap(), Some(b"data".to_vec()));

        store.fail_saves(coord, 2);
        assert!(matches!(store.save(coord, b"newer"), Err(SimError::IoFailure(_))));
        assert!(store.save(coord, b"newer").is_err());
        assert_eq!(store.record(coord), Some(b"data".to_vec()));
        store.save(coord, b"newer").unwrap();
        assert_eq!(store.record(coord), Some(b"newer".to_vec()));
    }
}
