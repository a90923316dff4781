//! Lazy result cursors.
//!
//! Pulling from a search cursor can make the backend do network I/O long
//! after the search call returned (the next page of a paged search, for
//! instance), on whatever thread is pulling. [`ScopedCursor`] re-installs the
//! owning context's socket factory around every pull for that reason.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::DirResult;
use crate::socket_scope::{self, SocketFactory};

/// A lazy sequence of directory results.
pub trait Cursor<T>: Send {
    /// Whether another element is available. May block on the network.
    fn has_more(&mut self) -> DirResult<bool>;

    /// The next element, or `None` once the sequence is exhausted.
    fn next_entry(&mut self) -> DirResult<Option<T>>;

    /// Release the cursor before it is exhausted.
    fn close(&mut self) -> DirResult<()>;
}

/// Cursor wrapper that brackets each pull with the socket factory scope.
pub struct ScopedCursor<T> {
    inner: Box<dyn Cursor<T>>,
    socket_factory: Option<Arc<dyn SocketFactory>>,
}

impl<T> ScopedCursor<T> {
    pub fn new(inner: Box<dyn Cursor<T>>, socket_factory: Option<Arc<dyn SocketFactory>>) -> Self {
        Self {
            inner,
            socket_factory,
        }
    }
}

impl<T: Send> Cursor<T> for ScopedCursor<T> {
    fn has_more(&mut self) -> DirResult<bool> {
        let _scope = socket_scope::enter(self.socket_factory.as_ref());
        self.inner.has_more()
    }

    fn next_entry(&mut self) -> DirResult<Option<T>> {
        let _scope = socket_scope::enter(self.socket_factory.as_ref());
        self.inner.next_entry()
    }

    fn close(&mut self) -> DirResult<()> {
        self.inner.close()
    }
}

impl<T: Send> Iterator for ScopedCursor<T> {
    type Item = DirResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl<T> std::fmt::Debug for ScopedCursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedCursor")
            .field("socket_factory", &self.socket_factory)
            .finish_non_exhaustive()
    }
}

/// Cursor over elements that are already in memory.
#[derive(Debug, Clone)]
pub struct VecCursor<T> {
    items: VecDeque<T>,
}

impl<T> VecCursor<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }
}

impl<T: Send> Cursor<T> for VecCursor<T> {
    fn has_more(&mut self) -> DirResult<bool> {
        Ok(!self.items.is_empty())
    }

    fn next_entry(&mut self) -> DirResult<Option<T>> {
        Ok(self.items.pop_front())
    }

    fn close(&mut self) -> DirResult<()> {
        self.items.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DirError;
    use ldap3::LdapConnSettings;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Named(&'static str);

    impl SocketFactory for Named {
        fn configure(&self, settings: LdapConnSettings) -> LdapConnSettings {
            settings
        }

        fn describe(&self) -> String {
            self.0.to_string()
        }
    }

    /// Records which factory was in scope on every call.
    struct RecordingCursor {
        items: VecDeque<u32>,
        seen: Seen,
        broken: bool,
    }

    impl RecordingCursor {
        fn record(&self, op: &'static str) -> DirResult<()> {
            let factory = socket_scope::current().map(|f| f.describe());
            self.seen.lock().unwrap().push((op, factory));
            if self.broken {
                return Err(DirError::communication("connection reset"));
            }
            Ok(())
        }
    }

    impl Cursor<u32> for RecordingCursor {
        fn has_more(&mut self) -> DirResult<bool> {
            self.record("has_more")?;
            Ok(!self.items.is_empty())
        }

        fn next_entry(&mut self) -> DirResult<Option<u32>> {
            self.record("next")?;
            Ok(self.items.pop_front())
        }

        fn close(&mut self) -> DirResult<()> {
            let factory = socket_scope::current().map(|f| f.describe());
            self.seen.lock().unwrap().push(("close", factory));
            Ok(())
        }
    }

    type Seen = Arc<Mutex<Vec<(&'static str, Option<String>)>>>;

    fn recording(items: &[u32]) -> (RecordingCursor, Seen) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recording = RecordingCursor {
            items: items.iter().copied().collect(),
            seen: Arc::clone(&seen),
            broken: false,
        };
        (recording, seen)
    }

    #[test]
    fn test_pulls_are_scoped_and_close_is_not() {
        let (recording, seen) = recording(&[1]);
        let factory: Arc<dyn SocketFactory> = Arc::new(Named("tls-a"));
        let mut cursor = ScopedCursor::new(Box::new(recording), Some(factory));

        assert!(cursor.has_more().unwrap());
        assert!(socket_scope::is_empty());
        assert_eq!(cursor.next_entry().unwrap(), Some(1));
        assert!(socket_scope::is_empty());
        cursor.close().unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("has_more", Some("tls-a".to_string())),
                ("next", Some("tls-a".to_string())),
                ("close", None),
            ]
        );
    }

    #[test]
    fn test_failed_pulls_clear_the_scope() {
        let (mut recording, seen) = recording(&[1]);
        recording.broken = true;
        let factory: Arc<dyn SocketFactory> = Arc::new(Named("tls-a"));
        let mut cursor = ScopedCursor::new(Box::new(recording), Some(factory));

        assert!(matches!(
            cursor.has_more(),
            Err(DirError::Communication { .. })
        ));
        assert!(socket_scope::is_empty());
        assert!(matches!(
            cursor.next_entry(),
            Err(DirError::Communication { .. })
        ));
        assert!(socket_scope::is_empty());

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("has_more", Some("tls-a".to_string())),
                ("next", Some("tls-a".to_string())),
            ]
        );
    }

    #[test]
    fn test_without_factory_nothing_is_installed() {
        let (recording, seen) = recording(&[7]);
        let mut cursor = ScopedCursor::new(Box::new(recording), None);
        assert_eq!(cursor.next_entry().unwrap(), Some(7));
        assert_eq!(seen.lock().unwrap()[0], ("next", None));
    }

    #[test]
    fn test_iterator_yields_the_underlying_sequence() {
        let items = [3, 1, 4, 1, 5, 9, 2, 6];
        let (recording, _) = recording(&items);
        let factory: Arc<dyn SocketFactory> = Arc::new(Named("tls-a"));
        let wrapped: Vec<u32> = ScopedCursor::new(Box::new(recording), Some(factory))
            .collect::<DirResult<_>>()
            .unwrap();

        let mut direct = VecCursor::new(items);
        let mut unwrapped = Vec::new();
        while let Some(item) = direct.next_entry().unwrap() {
            unwrapped.push(item);
        }

        assert_eq!(wrapped, unwrapped);
    }

    #[test]
    fn test_vec_cursor_close_drops_remaining() {
        let mut cursor = VecCursor::new(vec!["a", "b"]);
        assert!(cursor.has_more().unwrap());
        cursor.close().unwrap();
        assert!(!cursor.has_more().unwrap());
        assert_eq!(cursor.next_entry().unwrap(), None);
    }
}
