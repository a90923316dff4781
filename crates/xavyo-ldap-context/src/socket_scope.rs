//! Thread-scoped socket factory hand-off.
//!
//! `ldap3` takes its TLS configuration from the [`LdapConnSettings`] of each
//! new connection, and the code that opens connections during reconnect,
//! referral chasing or lazy paging has no parameter through which a caller
//! could pass one. The managed context therefore installs its factory in a
//! per-thread slot for the duration of a call, and the connection code reads
//! it from there.
//!
//! A scope is always tied to a [`ScopeGuard`]; dropping the guard (return,
//! `?`, or unwinding) clears the slot, so a stale factory is never seen by a
//! later unrelated call on the same thread.

use ldap3::LdapConnSettings;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Produces the transport configuration for new directory connections.
pub trait SocketFactory: Send + Sync + fmt::Debug {
    /// Apply this factory to the settings of a connection about to be opened.
    fn configure(&self, settings: LdapConnSettings) -> LdapConnSettings;

    /// Short label for logs.
    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn SocketFactory>>> = const { RefCell::new(None) };
}

/// Install `factory` as the calling thread's socket factory.
///
/// Prefer [`enter`], which also clears it.
pub fn install(factory: Arc<dyn SocketFactory>) {
    trace!(factory = %factory.describe(), "Installing scoped socket factory");
    CURRENT.with(|slot| *slot.borrow_mut() = Some(factory));
}

/// Reset the calling thread's slot to empty.
pub fn clear() {
    CURRENT.with(|slot| {
        if slot.borrow_mut().take().is_some() {
            trace!("Cleared scoped socket factory");
        }
    });
}

/// The socket factory installed on the calling thread, if any.
pub fn current() -> Option<Arc<dyn SocketFactory>> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Whether no socket factory is installed on the calling thread.
pub fn is_empty() -> bool {
    CURRENT.with(|slot| slot.borrow().is_none())
}

/// Install `factory` (when there is one) until the returned guard drops.
///
/// With `None` the slot is left alone, and so is it when the guard drops.
#[must_use = "the scope ends when the guard is dropped"]
pub fn enter(factory: Option<&Arc<dyn SocketFactory>>) -> ScopeGuard {
    match factory {
        Some(factory) => {
            install(Arc::clone(factory));
            ScopeGuard { installed: true }
        }
        None => ScopeGuard { installed: false },
    }
}

/// Run `f` with `factory` installed.
pub fn scoped<T>(factory: Option<&Arc<dyn SocketFactory>>, f: impl FnOnce() -> T) -> T {
    let _guard = enter(factory);
    f()
}

/// Clears the slot on drop if it installed a factory.
#[derive(Debug)]
pub struct ScopeGuard {
    installed: bool,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.installed {
            clear();
        }
    }
}
