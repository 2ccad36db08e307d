/*
    accumulator.rs - Monotone path built from observed channel writes

    A position is accepted only when its timestamp is strictly greater than
    the last accepted one. Duplicates and out-of-order fixes are ignored, not
    reordered.

    With a bound set, the oldest points are evicted once the path grows past
    it; the current position is always the newest accepted one.
*/

use crate::core_model::{path_length_meters, Position, TimestampMillis};
use std::collections::VecDeque;

/// Accumulator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// Nothing accepted yet
    Empty,
    /// At least one position accepted
    HasCurrent,
}

/// Ordered, timestamp-monotone sequence of positions
#[derive(Debug, Clone, Default)]
pub struct PathAccumulator {
    points: VecDeque<Position>,
    current: Option<Position>,
    max_len: Option<usize>,
    accepted: u64,
    rejected: u64,
}

impl PathAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_len` points (at least one is always kept)
    pub fn bounded(max_len: usize) -> Self {
        PathAccumulator {
            max_len: Some(max_len.max(1)),
            ..Self::default()
        }
    }

    /// Offer a position; returns whether it was appended
    pub fn offer(&mut self, position: Position) -> bool {
        if let Some(last) = self.last_timestamp() {
            if position.timestamp <= last {
                self.rejected += 1;
                return false;
            }
        }

        self.points.push_back(position);
        self.current = Some(position);
        self.accepted += 1;

        if let Some(max) = self.max_len {
            while self.points.len() > max {
                self.points.pop_front();
            }
        }
        true
    }

    pub fn state(&self) -> PathState {
        if self.current.is_some() {
            PathState::HasCurrent
        } else {
            PathState::Empty
        }
    }

    pub fn current(&self) -> Option<Position> {
        self.current
    }

    pub fn last_timestamp(&self) -> Option<TimestampMillis> {
        self.current.map(|p| p.timestamp)
    }

    /// Copy of the retained path, oldest first
    pub fn snapshot(&self) -> Vec<Position> {
        self.points.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Positions accepted since creation, including evicted ones
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Positions ignored as duplicate or out of order
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Length of the retained path in meters
    pub fn distance_meters(&self) -> f64 {
        let (head, tail) = self.points.as_slices();
        let mut total = path_length_meters(head) + path_length_meters(tail);
        if let (Some(a), Some(b)) = (head.last(), tail.first()) {
            total += a.distance_to(b);
        }
        total
    }
}
