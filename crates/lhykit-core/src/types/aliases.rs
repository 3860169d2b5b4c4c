//! Type aliases for commonly used complex types.
//!
//! The driver shares its output sink and control flags between the worker
//! thread and realtime callers, so most aliases here are `Arc<Mutex<T>>`
//! shapes built on `parking_lot`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lhykit_core::types::*;
//!
//! // Instead of: Arc<Mutex<Vec<u8>>>
//! let written: ThreadSafeVec<u8> = thread_safe_vec();
//! ```

use parking_lot::Mutex;
use std::sync::Arc;

// =============================================================================
// THREAD-SAFE SHARED TYPES (Arc<Mutex<T>>)
// =============================================================================

/// A thread-safe, mutex-protected wrapper for cross-thread sharing.
///
/// Uses `parking_lot::Mutex` for better performance than `std::sync::Mutex`.
///
/// # Example
/// ```rust,ignore
/// let sink: ThreadSafe<BufferedPipe> = thread_safe(BufferedPipe::new());
/// sink.lock().write(b"IPP\n");
/// ```
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe vector for cross-thread collection management.
pub type ThreadSafeVec<T> = Arc<Mutex<Vec<T>>>;

// =============================================================================
// DYNAMIC DISPATCH TYPES (Box<dyn T>)
// =============================================================================

/// A boxed dynamically-typed iterator.
///
/// Used when the concrete iterator type varies at runtime, e.g. a raster
/// scan line walked forward on even rows and in reverse on odd rows.
pub type BoxedIterator<T> = Box<dyn Iterator<Item = T>>;

// =============================================================================
// CONSTRUCTOR HELPERS
// =============================================================================

/// Create a new `ThreadSafe<T>` from a value.
#[inline]
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create a new empty `ThreadSafeVec<T>`.
#[inline]
pub fn thread_safe_vec<T>() -> ThreadSafeVec<T> {
    Arc::new(Mutex::new(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_safe_creation() {
        let value: ThreadSafe<i32> = thread_safe(42);
        assert_eq!(*value.lock(), 42);

        *value.lock() = 100;
        assert_eq!(*value.lock(), 100);
    }

    #[test]
    fn test_thread_safe_vec() {
        let vec: ThreadSafeVec<u8> = thread_safe_vec();
        vec.lock().extend_from_slice(b"IS1P\n");

        assert_eq!(vec.lock().len(), 5);
    }

    #[test]
    fn test_boxed_iterator() {
        let forward: BoxedIterator<u32> = Box::new(0..5);
        assert_eq!(forward.collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);

        let ascending = false;
        let iter: BoxedIterator<u32> = if ascending {
            Box::new(0..3)
        } else {
            Box::new((0..3).rev())
        };
        assert_eq!(iter.collect::<Vec<_>>(), vec![2, 1, 0]);
    }
}
