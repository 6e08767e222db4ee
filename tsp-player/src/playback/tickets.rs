//! Media tickets
//!
//! A ticket correlates one accepted chunk with the cumulative sample index
//! at which its playback is complete. Tickets live in an ordered table keyed
//! by id; entries leave the table when a wait on them exits, when the stream
//! stops, or when too many completed-but-unawaited tickets pile up.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque ticket handle returned by `add_data`.
///
/// Ids increase monotonically for the lifetime of a controller and are never
/// reused. `TicketId::INVALID` (-1) signals a rejected chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TicketId(i64);

impl TicketId {
    pub const INVALID: TicketId = TicketId(-1);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<TicketId> for i64 {
    fn from(id: TicketId) -> i64 {
        id.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaTicket {
    pub id: TicketId,
    pub created_at: DateTime<Utc>,
    /// Playback of the chunk is complete once `played_samples >= end_sample_index`
    pub end_sample_index: u64,
}

#[derive(Debug)]
pub struct TicketTable {
    last_id: i64,
    tickets: BTreeMap<TicketId, MediaTicket>,
    max_completed: usize,
}

impl TicketTable {
    pub fn new(max_completed: usize) -> Self {
        Self {
            last_id: 0,
            tickets: BTreeMap::new(),
            max_completed,
        }
    }

    /// Issue the next ticket for a chunk ending at `end_sample_index`
    pub fn issue(&mut self, end_sample_index: u64) -> TicketId {
        self.last_id += 1;
        let id = TicketId(self.last_id);
        self.tickets.insert(
            id,
            MediaTicket {
                id,
                created_at: Utc::now(),
                end_sample_index,
            },
        );
        id
    }

    pub fn get(&self, id: TicketId) -> Option<&MediaTicket> {
        self.tickets.get(&id)
    }

    pub fn remove(&mut self, id: TicketId) -> Option<MediaTicket> {
        self.tickets.remove(&id)
    }

    /// Drop every ticket (stream reset). The id counter keeps running.
    pub fn clear(&mut self) {
        self.tickets.clear();
    }

    /// Bound the number of finished tickets nobody waited on.
    ///
    /// End indices grow with ids, so completed tickets form a prefix of the
    /// table; the oldest beyond `max_completed` are removed. Returns how many
    /// were pruned.
    pub fn prune_completed(&mut self, played_samples: u64) -> usize {
        let completed = self
            .tickets
            .values()
            .take_while(|t| t.end_sample_index <= played_samples)
            .count();
        let excess = completed.saturating_sub(self.max_completed);
        for _ in 0..excess {
            self.tickets.pop_first();
        }
        excess
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}
