//! Metric names and descriptions for the location core
//!
//! Values are recorded with the `metrics` macros at the call sites; an
//! exporter installed by the host application picks them up. Without one the
//! macros are no-ops.

use metrics::{describe_counter, describe_gauge};

pub const STORE_WRITES_ACCEPTED: &str = "store.writes.accepted";
pub const STORE_WRITES_REJECTED: &str = "store.writes.rejected";
pub const STORE_SUBSCRIPTIONS_ACTIVE: &str = "store.subscriptions.active";
pub const STORE_DELIVERIES_SKIPPED: &str = "store.deliveries.skipped";
pub const PUBLISHER_FIXES_FORWARDED: &str = "publisher.fixes.forwarded";
pub const PUBLISHER_FIXES_DROPPED: &str = "publisher.fixes.dropped";
pub const TRACKER_POSITIONS_IGNORED: &str = "tracker.positions.ignored";
pub const TRACKER_NO_DATA: &str = "tracker.no_data";

/// Register descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(STORE_WRITES_ACCEPTED, "Positions accepted by the location store");
    describe_counter!(
        STORE_WRITES_REJECTED,
        "Writes refused for invalid input or by the access policy"
    );
    describe_gauge!(STORE_SUBSCRIPTIONS_ACTIVE, "Live channel listeners");
    describe_counter!(
        STORE_DELIVERIES_SKIPPED,
        "Positions a slow listener skipped after falling behind its buffer"
    );

    describe_counter!(PUBLISHER_FIXES_FORWARDED, "Fixes written to a channel by a publisher");
    describe_counter!(
        PUBLISHER_FIXES_DROPPED,
        "Background fixes discarded because no session could be recovered"
    );

    describe_counter!(
        TRACKER_POSITIONS_IGNORED,
        "Duplicate or out-of-order positions ignored by a tracker"
    );
    describe_counter!(TRACKER_NO_DATA, "Track requests that found no channel data");
}
