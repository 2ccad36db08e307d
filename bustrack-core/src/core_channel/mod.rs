/*
    core_channel - Location channel store

    Keyed last-writer-wins slots plus a live per-key change feed. The only
    shared mutable state in the location core lives here.
*/

pub mod policy;
pub mod store;
pub mod subscription;

pub use policy::{AccessPolicy, OpenAccess};
pub use store::{Channel, LocationStore};
pub use subscription::Subscription;
