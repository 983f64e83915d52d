//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Cache purge: drops entries past their servable window

mod cleanup;

pub use cleanup::{gateway_caches, spawn_cleanup_task, ExpiringCache};
