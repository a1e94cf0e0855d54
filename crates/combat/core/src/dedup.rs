//! At-most-once admission of round records.
//!
//! Both delivery channels funnel through [`RoundDeduplicator::admit`]. The
//! seen-id set is bounded: ids older than the log window plus a grace buffer
//! are forgotten in insertion order.
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use crate::types::RoundId;

/// Outcome of an admission attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// First time this id is seen.
    Fresh(RoundId),
    /// Id already applied; the record must be dropped.
    Duplicate(RoundId),
    /// Id-less record accepted because nothing was admitted recently.
    Anonymous,
    /// Id-less record rejected because a round was admitted within the window.
    AnonymousSuppressed,
}

impl Admission {
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Fresh(_) | Self::Anonymous)
    }
}

#[derive(Clone, Debug)]
pub struct RoundDeduplicator {
    seen: HashSet<RoundId>,
    order: VecDeque<RoundId>,
    capacity: usize,
    anonymous_window: Duration,
    last_admitted_at: Option<Instant>,
}

impl RoundDeduplicator {
    pub fn new(capacity: usize, anonymous_window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
            anonymous_window,
            last_admitted_at: None,
        }
    }

    /// Decides whether a record with `round_id` is new.
    ///
    /// Payload differences are irrelevant: the first admitted record for an
    /// id wins and every later one is a duplicate, whatever channel it came
    /// from.
    pub fn admit(&mut self, round_id: Option<RoundId>, now: Instant) -> Admission {
        let admission = match round_id {
            Some(id) if self.seen.contains(&id) => return Admission::Duplicate(id),
            Some(id) => {
                self.remember(id);
                Admission::Fresh(id)
            }
            None => {
                let recent = self
                    .last_admitted_at
                    .is_some_and(|at| now.saturating_duration_since(at) <= self.anonymous_window);
                if recent {
                    return Admission::AnonymousSuppressed;
                }
                Admission::Anonymous
            }
        };

        self.last_admitted_at = Some(now);
        admission
    }

    pub fn contains(&self, round_id: RoundId) -> bool {
        self.seen.contains(&round_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn remember(&mut self, id: RoundId) {
        if self.order.len() == self.capacity
            && let Some(evicted) = self.order.pop_front()
        {
            self.seen.remove(&evicted);
        }
        self.order.push_back(id);
        self.seen.insert(id);
    }
}
