use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::gauge;
use tracker_domain::TrackerKind;

/// `atomic_create` 的结果
pub enum Installed<T: ?Sized> {
    /// 本次调用创建并注册
    Created(Arc<T>),
    /// 已存在，工厂函数未被调用
    Existing(Arc<T>),
}

impl<T: ?Sized> Installed<T> {
    pub fn tracker(&self) -> &Arc<T> {
        match self {
            Installed::Created(tracker) | Installed::Existing(tracker) => tracker,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Installed::Created(_))
    }
}

/// instance_id 到任务追踪器的并发映射，同一 key 上的创建与删除线性一致
pub struct TrackerRegistry<T: ?Sized> {
    kind: TrackerKind,
    trackers: DashMap<i64, Arc<T>>,
}

impl<T: ?Sized> TrackerRegistry<T> {
    pub fn new(kind: TrackerKind) -> Self {
        Self {
            kind,
            trackers: DashMap::new(),
        }
    }

    pub fn kind(&self) -> TrackerKind {
        self.kind
    }

    pub fn get(&self, instance_id: i64) -> Option<Arc<T>> {
        self.trackers
            .get(&instance_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn current_size(&self) -> usize {
        self.trackers.len()
    }

    /// 不存在时调用 `factory` 创建并注册；整个比较与插入在分片锁内完成，
    /// 工厂函数不得再访问本注册表
    pub fn atomic_create<F>(&self, instance_id: i64, factory: F) -> Installed<T>
    where
        F: FnOnce(i64) -> Arc<T>,
    {
        let installed = match self.trackers.entry(instance_id) {
            Entry::Occupied(entry) => Installed::Existing(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let tracker = factory(instance_id);
                entry.insert(Arc::clone(&tracker));
                Installed::Created(tracker)
            }
        };
        if installed.is_created() {
            self.record_size();
        }
        installed
    }

    pub fn remove(&self, instance_id: i64) -> Option<Arc<T>> {
        let removed = self.trackers.remove(&instance_id).map(|(_, tracker)| tracker);
        if removed.is_some() {
            self.record_size();
        }
        removed
    }

    /// 仅当注册的仍是同一个追踪器时才删除
    pub fn remove_if_same(&self, instance_id: i64, tracker: &Arc<T>) -> bool {
        let removed = self
            .trackers
            .remove_if(&instance_id, |_, current| Arc::ptr_eq(current, tracker))
            .is_some();
        if removed {
            self.record_size();
        }
        removed
    }

    pub fn all(&self) -> Vec<Arc<T>> {
        self.trackers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn record_size(&self) {
        gauge!("task_tracker_active", "kind" => self.kind.as_str())
            .set(self.trackers.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[derive(Debug)]
    struct Dummy(i64);

    #[test]
    fn test_atomic_create_returns_existing() {
        let registry: TrackerRegistry<Dummy> = TrackerRegistry::new(TrackerKind::Heavy);
        let first = registry.atomic_create(1, |id| Arc::new(Dummy(id)));
        assert!(first.is_created());

        let second = registry.atomic_create(1, |_| panic!("factory must not run twice"));
        assert!(!second.is_created());
        assert!(Arc::ptr_eq(first.tracker(), second.tracker()));
        assert_eq!(registry.current_size(), 1);
        assert_eq!(registry.get(1).unwrap().0, 1);
    }

    #[test]
    fn test_remove_if_same_ignores_replacement() {
        let registry: TrackerRegistry<Dummy> = TrackerRegistry::new(TrackerKind::Light);
        let old = Arc::clone(registry.atomic_create(7, |id| Arc::new(Dummy(id))).tracker());
        assert!(registry.remove(7).is_some());
        let new = Arc::clone(registry.atomic_create(7, |id| Arc::new(Dummy(id))).tracker());

        assert!(!registry.remove_if_same(7, &old));
        assert_eq!(registry.current_size(), 1);
        assert!(registry.remove_if_same(7, &new));
        assert_eq!(registry.current_size(), 0);
        assert!(registry.remove(7).is_none());
    }

    #[test]
    fn test_concurrent_create_installs_once() {
        let registry: Arc<TrackerRegistry<Dummy>> =
            Arc::new(TrackerRegistry::new(TrackerKind::Heavy));
        let created = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let created = Arc::clone(&created);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let installed = registry.atomic_create(42, |id| {
                        created.fetch_add(1, Ordering::SeqCst);
                        Arc::new(Dummy(id))
                    });
                    Arc::clone(installed.tracker())
                })
            })
            .collect();

        let trackers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(trackers.iter().all(|t| Arc::ptr_eq(t, &trackers[0])));
        assert_eq!(registry.current_size(), 1);
    }
}
