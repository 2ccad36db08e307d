/*
    core_publish - Driver side of the location core

    Bridges a fix source to one channel in the location store, surviving
    process eviction through the session guard.
*/

pub mod fix_source;
pub mod publisher;

pub use fix_source::{FixCallback, FixOptions, FixSource, SimulatedFixSource};
pub use publisher::{PublishHandle, Publisher};
