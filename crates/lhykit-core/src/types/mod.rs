//! Type system utilities and aliases.
//!
//! ## Modules
//!
//! - [`aliases`]: Type aliases for `Arc<Mutex<T>>` shapes and boxed iterators.

pub mod aliases;

pub use aliases::*;
