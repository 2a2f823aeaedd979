//! Reference storage backends
//!
//! Real deployments plug their own [`crate::view::LayerSession`] and
//! [`crate::view::SessionFactory`] implementations into the view. The
//! in-memory backend here serves the CLI, fixtures and tests.

mod memory;

pub use memory::{MemorySession, MemorySessionFactory, MemoryStorage};
