//! Scoped store handle release.

use super::{DocumentDriver, DocumentStore, DriverResult};
use log::{debug, warn};

/// Owns one store handle for an operation group.
///
/// `release` flushes and closes the handle and reports failures. A session
/// dropped without `release` (early return, `?`, panic unwinding) still
/// flushes and closes it, logging failures instead.
pub struct StoreSession<S: DocumentStore> {
    store: S,
    released: bool,
}

impl<S: DocumentStore> StoreSession<S> {
    pub fn open<D>(driver: &D, path: &str) -> DriverResult<Self>
    where
        D: DocumentDriver<Store = S>,
    {
        let store = driver.open_store(path)?;
        debug!("event=store_open module=driver status=ok path={path}");
        Ok(Self {
            store,
            released: false,
        })
    }

    pub fn store(&mut self) -> &mut S {
        &mut self.store
    }

    /// Flushes then closes the handle.
    ///
    /// The handle is closed even when the flush fails; the first failure is
    /// returned.
    pub fn release(mut self) -> DriverResult<()> {
        self.released = true;
        finish(&mut self.store)
    }
}

impl<S: DocumentStore> Drop for StoreSession<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = finish(&mut self.store) {
            warn!(
                "event=store_release module=driver status=error path={} error={}",
                self.store.path(),
                err
            );
        }
    }
}

fn finish<S: DocumentStore>(store: &mut S) -> DriverResult<()> {
    let flushed = store.flush();
    let closed = store.close();
    debug!(
        "event=store_release module=driver status={} path={}",
        if flushed.is_ok() && closed.is_ok() {
            "ok"
        } else {
            "error"
        },
        store.path()
    );
    flushed.and(closed)
}
