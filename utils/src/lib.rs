//! Shared utilities for the inventory workspace.
//!
//! Holds build metadata that the service reports on its health endpoint.

pub mod version_info;
