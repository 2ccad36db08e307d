/*
    core_track - Rider side of the location core

    Observes a channel's change feed and reconstructs the driver's current
    position and path.
*/

pub mod accumulator;
pub mod subscriber;

pub use accumulator::{PathAccumulator, PathState};
pub use subscriber::{PathView, Subscriber};
