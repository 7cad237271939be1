//! Periodic sweep over all connection records.
//!
//! # Responsibilities
//! - Evict connections inactive for longer than the threshold
//! - Move expired Open circuits to Half-Open
//!
//! # Design Decisions
//! - Inactivity is checked first; an evicted record is never half-opened
//! - Pure function over the record map; the manager turns actions into events
//! - Saturating arithmetic only, so one odd record cannot abort the pass

use std::collections::HashMap;

use crate::resilience::circuit_breaker::ConnectionRecord;
use crate::types::ConnectionKey;

/// A change made by one sweep pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepAction {
    /// The record was evicted for inactivity.
    Removed(ConnectionRecord),
    /// The record's circuit moved from Open to Half-Open.
    HalfOpened(ConnectionKey),
}

/// Summary of a sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub half_opened: usize,
}

impl SweepReport {
    pub fn from_actions(actions: &[SweepAction]) -> Self {
        actions.iter().fold(Self::default(), |mut report, action| {
            match action {
                SweepAction::Removed(_) => report.removed += 1,
                SweepAction::HalfOpened(_) => report.half_opened += 1,
            }
            report
        })
    }
}

/// Run one pass at time `now`.
pub fn sweep(
    records: &mut HashMap<ConnectionKey, ConnectionRecord>,
    now: u64,
    inactive_threshold_ms: u64,
) -> Vec<SweepAction> {
    let inactive: Vec<ConnectionKey> = records
        .iter()
        .filter(|(_, record)| record.is_inactive(now, inactive_threshold_ms))
        .map(|(key, _)| key.clone())
        .collect();

    let mut actions: Vec<SweepAction> = inactive
        .into_iter()
        .filter_map(|key| records.remove(&key))
        .map(SweepAction::Removed)
        .collect();

    for (key, record) in records.iter_mut() {
        if record.is_expired(now) {
            record.half_open();
            actions.push(SweepAction::HalfOpened(key.clone()));
        }
    }

    actions
}
