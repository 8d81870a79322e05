//! Work-assignment wire types
//!
//! An [`AssignParam`] is sent once per execution unit when a run is set up.
//! Besides the unit's own share it carries the full roster, so every unit
//! knows the complete shape of the run it participates in.

use serde::{Deserialize, Serialize};

/// One (unit id, share) pair of the roster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    /// Execution-unit id, unique within a run, starting at 1
    pub worker_id: u32,
    /// Concurrency share assigned to that unit
    pub request_num: u32,
}

/// One execution unit's assignment, immutable after send
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssignParam {
    /// Id of the unit this param is addressed to
    pub worker_id: u32,
    /// That unit's concurrency share
    pub request_num: u32,
    /// Full roster of the run, identical in every AssignParam
    pub workers: Vec<RosterEntry>,
}

impl AssignParam {
    /// Build the assignment for one roster entry, carrying the full roster.
    pub fn new(entry: RosterEntry, roster: Vec<RosterEntry>) -> Self {
        Self {
            worker_id: entry.worker_id,
            request_num: entry.request_num,
            workers: roster,
        }
    }
}
