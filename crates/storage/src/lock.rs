//! Scoped distributed locks.

/// Handle for a held distributed lock.
///
/// The lock is released when the handle is dropped, on every exit path:
/// normal return, early abort, `?` propagation or unwinding. Backends supply
/// the release action; holders only keep the handle alive.
pub struct DistributedLockHandle<'a> {
    resource: String,
    release: Option<Box<dyn FnOnce() + Send + 'a>>,
}

impl<'a> DistributedLockHandle<'a> {
    pub fn new(resource: impl Into<String>, release: impl FnOnce() + Send + 'a) -> Self {
        Self {
            resource: resource.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Drop for DistributedLockHandle<'_> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl core::fmt::Debug for DistributedLockHandle<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DistributedLockHandle")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}
