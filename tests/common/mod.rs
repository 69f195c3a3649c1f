//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Scriptable remote service
//! - Throwaway store fixtures and a store that fails on demand
//! - Custom assertion macros

pub mod remote;
pub mod stores;

// Re-export commonly used utilities
pub use remote::*;
pub use stores::*;
