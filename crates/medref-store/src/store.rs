//! 参考数据存储
//!
//! 存储持有当前快照的 `Arc`。读取方在短暂的读锁内克隆 `Arc`，之后整个请求都使用这份快照；
//! 刷新时在锁外构建完整的新快照，再在写锁内替换指针。读取方因此不会看到半成品数据。

use crate::loader::SnapshotLoader;
use crate::snapshot::{ReferenceSnapshot, SnapshotInfo};
use medref_core::{MedrefError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{error, info};

/// 参考数据存储句柄，可廉价克隆并在线程间共享
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    current: Arc<RwLock<Arc<ReferenceSnapshot>>>,
    next_version: Arc<AtomicU64>,
}

impl ReferenceStore {
    /// 以给定快照初始化存储
    pub fn new(snapshot: ReferenceSnapshot) -> Self {
        let next_version = snapshot.version() + 1;
        Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
            next_version: Arc::new(AtomicU64::new(next_version)),
        }
    }

    /// 锁已中毒的存储，所有读取都返回 `StoreFault`
    #[cfg(any(test, feature = "test-util"))]
    pub fn poisoned() -> Self {
        let store = Self::new(ReferenceSnapshot::empty());
        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.current.write();
            panic!("poisoning reference snapshot lock");
        })
        .join();
        store
    }

    /// 通过加载器构建首个快照
    pub fn open(loader: &SnapshotLoader) -> Result<Self> {
        let snapshot = loader.load(1)?;
        info!("Reference store opened: {:?}", snapshot.info());
        Ok(Self::new(snapshot))
    }

    /// 获取当前快照
    pub fn snapshot(&self) -> Result<Arc<ReferenceSnapshot>> {
        self.current
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| {
                error!("Reference snapshot lock poisoned");
                MedrefError::StoreFault("reference snapshot lock poisoned".to_string())
            })
    }

    /// 当前快照摘要
    pub fn info(&self) -> Result<SnapshotInfo> {
        Ok(self.snapshot()?.info())
    }

    /// 分配下一个快照版本号
    pub fn next_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst)
    }

    /// 整体替换快照，返回被替换的旧快照
    pub fn replace(&self, snapshot: ReferenceSnapshot) -> Result<Arc<ReferenceSnapshot>> {
        let incoming = Arc::new(snapshot);
        let mut guard = self.current.write().map_err(|_| {
            error!("Reference snapshot lock poisoned during swap");
            MedrefError::StoreFault("reference snapshot lock poisoned".to_string())
        })?;
        let previous = std::mem::replace(&mut *guard, incoming);
        info!(
            "Reference snapshot swapped: version {} -> {}",
            previous.version(),
            guard.version()
        );
        Ok(previous)
    }

    /// 通过加载器重建并替换快照
    ///
    /// 加载失败时保留旧快照，返回错误。
    pub fn refresh(&self, loader: &SnapshotLoader) -> Result<SnapshotInfo> {
        let version = self.next_version();
        let snapshot = loader.load(version).map_err(|e| {
            error!("Snapshot refresh failed, keeping previous snapshot: {}", e);
            e
        })?;
        let info = snapshot.info();
        self.replace(snapshot)?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotBuilder;
    use medref_core::DiagnosisCode;
    use std::thread;

    fn snapshot_with(codes: &[&str], version: u64) -> ReferenceSnapshot {
        SnapshotBuilder::new()
            .diagnoses(codes.iter().map(|c| DiagnosisCode::new(*c, "", "")))
            .build(version)
    }

    #[test]
    fn test_reader_keeps_previous_snapshot_during_swap() {
        let store = ReferenceStore::new(snapshot_with(&["E11", "E11.9"], 1));

        let held = store.snapshot().unwrap();
        store.replace(snapshot_with(&["I10"], 2)).unwrap();

        // 已持有的快照不受替换影响
        assert_eq!(held.version(), 1);
        assert!(held.diagnoses.get_by_code("E11.9").is_some());

        let fresh = store.snapshot().unwrap();
        assert_eq!(fresh.version(), 2);
        assert!(fresh.diagnoses.get_by_code("E11.9").is_none());
    }

    #[test]
    fn test_concurrent_readers_see_complete_snapshots() {
        let store = ReferenceStore::new(snapshot_with(&["A00", "A01"], 1));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let snap = store.snapshot().unwrap();
                        // 每个版本要么是两条 A 码，要么是三条 B 码
                        let len = snap.diagnoses.len();
                        assert!(len == 2 || len == 3);
                    }
                })
            })
            .collect();

        for version in 2..20 {
            let codes: &[&str] = if version % 2 == 0 { &["B00", "B01", "B02"] } else { &["A00", "A01"] };
            store.replace(snapshot_with(codes, version)).unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_refresh_failure_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let loader = SnapshotLoader::new(dir.path(), true);
        let store = ReferenceStore::open(&loader).unwrap();
        assert_eq!(store.info().unwrap().version, 1);

        let info = store.refresh(&loader).unwrap();
        assert_eq!(info.version, 2);
        assert_eq!(info.lab_tests, 27);

        std::fs::write(dir.path().join(crate::loader::LAB_TESTS_FILE), "[{").unwrap();
        let err = store.refresh(&loader).unwrap_err();
        assert!(err.is_store_fault());
        assert_eq!(store.snapshot().unwrap().version(), 2);
    }

    #[test]
    fn test_poisoned_lock_is_store_fault() {
        let store = ReferenceStore::new(snapshot_with(&["E11"], 1));
        let holder = store.clone();
        let joined = thread::spawn(move || {
            let _guard = holder.current.write().unwrap();
            panic!("writer died while holding the lock");
        })
        .join();
        assert!(joined.is_err());

        let err = store.snapshot().unwrap_err();
        assert!(matches!(err, MedrefError::StoreFault(_)));
        assert!(store.info().is_err());
        assert!(store.replace(snapshot_with(&["I10"], 2)).is_err());

        let err = ReferenceStore::poisoned().snapshot().unwrap_err();
        assert_eq!(err.kind(), "store_fault");
    }

    #[test]
    fn test_version_counter() {
        let store = ReferenceStore::new(snapshot_with(&[], 5));
        assert_eq!(store.next_version(), 6);
        assert_eq!(store.next_version(), 7);
    }
}
