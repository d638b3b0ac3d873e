//! Deferred destruction of GPU objects.
//!
//! A [`DeletionQueue`] collects owned cleanup actions and runs them newest
//! first. Objects created later may depend on objects created earlier (a
//! view on its image), so destruction mirrors construction.
//!
//! # Example
//!
//! ```
//! use renderer_renderer::deletion_queue::DeletionQueue;
//!
//! let mut queue = DeletionQueue::new();
//! queue.push(|| println!("destroy image"));
//! queue.push(|| println!("destroy view"));
//! assert_eq!(queue.flush(), 2); // view first, then image
//! assert!(queue.is_empty());
//! ```

use tracing::trace;

/// An owned, type-erased cleanup action.
pub type DeferredAction = Box<dyn FnOnce() + Send>;

/// LIFO registry of deferred cleanup actions.
///
/// Each queue has exactly one owner: a frame slot, or the driver for
/// session-lifetime resources.
#[derive(Default)]
pub struct DeletionQueue {
    actions: Vec<DeferredAction>,
}

impl DeletionQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `action` to run on the next [`flush`](Self::flush).
    pub fn push<F>(&mut self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.actions.push(Box::new(action));
    }

    /// Takes ownership of `value` and drops it on the next flush.
    ///
    /// RAII wrappers release their GPU object in `Drop`, so this is how a
    /// buffer or image still referenced by in-flight work is retired.
    pub fn defer_drop<T>(&mut self, value: T)
    where
        T: Send + 'static,
    {
        self.push(move || drop(value));
    }

    /// Runs every registered action in reverse registration order and
    /// empties the queue. Returns how many actions ran.
    pub fn flush(&mut self) -> usize {
        let count = self.actions.len();
        while let Some(action) = self.actions.pop() {
            action();
        }
        if count > 0 {
            trace!("Flushed {} deferred action(s)", count);
        }
        count
    }

    /// Number of pending actions.
    #[inline]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True when nothing is pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl std::fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("pending", &self.actions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> DeferredAction) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &'static str| -> DeferredAction {
            let sink = sink.clone();
            Box::new(move || sink.lock().unwrap().push(name))
        };
        (log, make)
    }

    #[test]
    fn test_flush_runs_in_reverse_order() {
        let (log, action) = recorder();
        let mut queue = DeletionQueue::new();
        for name in ["a1", "a2", "a3", "a4"] {
            queue.push(action(name));
        }

        assert_eq!(queue.flush(), 4);
        assert_eq!(*log.lock().unwrap(), vec!["a4", "a3", "a2", "a1"]);
    }

    #[test]
    fn test_dependent_chain_is_destroyed_newest_first() {
        let (log, action) = recorder();
        let mut queue = DeletionQueue::new();
        queue.push(action("close_image"));
        queue.push(action("close_view"));
        queue.push(action("close_buffer"));

        queue.flush();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["close_buffer", "close_view", "close_image"]
        );
    }

    #[test]
    fn test_second_flush_runs_nothing() {
        let (log, action) = recorder();
        let mut queue = DeletionQueue::new();
        queue.push(action("only"));

        assert_eq!(queue.flush(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.flush(), 0);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_flush_on_fresh_queue_is_noop() {
        let mut queue = DeletionQueue::new();
        assert_eq!(queue.flush(), 0);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_defer_drop_releases_on_flush() {
        struct Tracked(Arc<Mutex<bool>>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                *self.0.lock().unwrap() = true;
            }
        }

        let dropped = Arc::new(Mutex::new(false));
        let mut queue = DeletionQueue::new();
        queue.defer_drop(Tracked(dropped.clone()));

        assert!(!*dropped.lock().unwrap());
        queue.flush();
        assert!(*dropped.lock().unwrap());
    }

    #[test]
    fn test_actions_registered_after_flush_run_next_time() {
        let (log, action) = recorder();
        let mut queue = DeletionQueue::new();
        queue.push(action("first"));
        queue.flush();
        queue.push(action("second"));
        queue.flush();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }
}
