//! Lazily computed variant values.

use super::Variant;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

type Thunk = Box<dyn FnOnce() -> Variant + Send>;

struct Cell {
    value: OnceLock<Variant>,
    init: Mutex<Option<Thunk>>,
}

/// Memoizing thunk. Clones share the computed value.
#[derive(Clone)]
pub struct Deferred(Arc<Cell>);

impl Deferred {
    pub fn new(f: impl FnOnce() -> Variant + Send + 'static) -> Self {
        Self(Arc::new(Cell {
            value: OnceLock::new(),
            init: Mutex::new(Some(Box::new(f))),
        }))
    }

    /// Compute on first access, then return the cached value
    pub fn get(&self) -> &Variant {
        self.0.value.get_or_init(|| {
            let thunk = self.0.init.lock().take();
            thunk.map(|f| f()).unwrap_or_default()
        })
    }

    pub fn is_evaluated(&self) -> bool {
        self.0.value.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_concurrent_first_access() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let d = Deferred::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Variant::from(99)
        });
        assert!(!d.is_evaluated());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = d.clone();
                thread::spawn(move || d.get().as_int())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), Some(99));
        }
        assert!(d.is_evaluated());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
