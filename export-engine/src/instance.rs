//! Contracts the export engine consumes from the instance subsystem.

use crate::executor::progress::Progress;
use crate::models::InstanceRecord;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

/// Administrative lock on an instance, shared across processes.
#[async_trait]
pub trait InstanceLocker: Send + Sync {
    /// Take the lock without waiting. Fails with [`crate::ExportError::Locked`]
    /// when somebody else holds it.
    async fn try_lock(&self, slug: &str) -> crate::Result<()>;

    async fn unlock(&self, slug: &str) -> crate::Result<()>;
}

/// The container stack running an instance.
#[async_trait]
pub trait Stack: Send + Sync {
    async fn down(&self, instance: &InstanceRecord, progress: &Progress) -> crate::Result<()>;

    async fn up(&self, instance: &InstanceRecord, progress: &Progress) -> crate::Result<()>;
}

/// Lists the instances a fleet backup covers.
#[async_trait]
pub trait InstanceSource: Send + Sync {
    async fn all(&self) -> crate::Result<Vec<InstanceRecord>>;
}

/// A held instance lock.
///
/// Call [`LockGuard::release`] on the normal path. If the guard is dropped
/// without being released (an early return or a panic unwinding through the
/// holder), the unlock is scheduled on the runtime instead.
pub struct LockGuard {
    locker: Arc<dyn InstanceLocker>,
    slug: String,
    released: bool,
}

impl LockGuard {
    pub async fn acquire(locker: Arc<dyn InstanceLocker>, slug: &str) -> crate::Result<Self> {
        locker.try_lock(slug).await?;
        debug!(slug = %slug, "Acquired instance lock");
        Ok(Self {
            locker,
            slug: slug.to_string(),
            released: false,
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub async fn release(mut self) -> crate::Result<()> {
        self.released = true;
        let result = self.locker.unlock(&self.slug).await;
        debug!(slug = %self.slug, ok = result.is_ok(), "Released instance lock");
        result
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let locker = Arc::clone(&self.locker);
        let slug = std::mem::take(&mut self.slug);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = locker.unlock(&slug).await {
                        error!(slug = %slug, error = %e, "Failed to release instance lock");
                    }
                });
            }
            Err(_) => error!(slug = %slug, "Instance lock dropped outside of a runtime and not released"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory doubles shared by the engine tests.

    use super::*;
    use crate::ExportError;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryLocker {
        held: Mutex<HashSet<String>>,
        pub locks: AtomicUsize,
        pub unlocks: AtomicUsize,
    }

    impl MemoryLocker {
        pub fn is_held(&self, slug: &str) -> bool {
            self.held.lock().unwrap().contains(slug)
        }

        pub fn unlocks(&self) -> usize {
            self.unlocks.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InstanceLocker for MemoryLocker {
        async fn try_lock(&self, slug: &str) -> crate::Result<()> {
            if !self.held.lock().unwrap().insert(slug.to_string()) {
                return Err(ExportError::Locked);
            }
            self.locks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn unlock(&self, slug: &str) -> crate::Result<()> {
            if !self.held.lock().unwrap().remove(slug) {
                return Err(ExportError::NotLocked);
            }
            self.unlocks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct CountingStack {
        pub downs: AtomicUsize,
        pub ups: AtomicUsize,
        pub fail_down: bool,
        pub panic_down: bool,
    }

    #[async_trait]
    impl Stack for CountingStack {
        async fn down(&self, _instance: &InstanceRecord, progress: &Progress) -> crate::Result<()> {
            self.downs.fetch_add(1, Ordering::SeqCst);
            progress.line("stack down");
            if self.panic_down {
                panic!("compose crashed");
            }
            if self.fail_down {
                return Err(ExportError::component("stack", "compose down failed"));
            }
            Ok(())
        }

        async fn up(&self, _instance: &InstanceRecord, progress: &Progress) -> crate::Result<()> {
            self.ups.fetch_add(1, Ordering::SeqCst);
            progress.line("stack up");
            Ok(())
        }
    }

    pub struct StaticInstances(pub crate::Result<Vec<InstanceRecord>>);

    pub struct PanickingInstances;

    #[async_trait]
    impl InstanceSource for PanickingInstances {
        async fn all(&self) -> crate::Result<Vec<InstanceRecord>> {
            panic!("instance listing crashed")
        }
    }

    #[async_trait]
    impl InstanceSource for StaticInstances {
        async fn all(&self) -> crate::Result<Vec<InstanceRecord>> {
            match &self.0 {
                Ok(instances) => Ok(instances.clone()),
                Err(e) => Err(ExportError::component("instances", e.to_string())),
            }
        }
    }

    pub fn instance(slug: &str) -> InstanceRecord {
        InstanceRecord {
            slug: slug.to_string(),
            ..InstanceRecord::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryLocker;
    use super::*;
    use crate::ExportError;

    #[tokio::test]
    async fn test_guard_release() {
        let locker = Arc::new(MemoryLocker::default());
        let guard = LockGuard::acquire(locker.clone(), "alpha").await.unwrap();
        assert!(locker.is_held("alpha"));

        let second = LockGuard::acquire(locker.clone(), "alpha").await;
        assert!(matches!(second, Err(ExportError::Locked)));

        guard.release().await.unwrap();
        assert!(!locker.is_held("alpha"));
        assert_eq!(locker.unlocks(), 1);
    }

    #[tokio::test]
    async fn test_guard_unlocks_on_drop() {
        let locker = Arc::new(MemoryLocker::default());
        {
            let _guard = LockGuard::acquire(locker.clone(), "beta").await.unwrap();
        }
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(!locker.is_held("beta"));
        assert_eq!(locker.unlocks(), 1);
    }
}
