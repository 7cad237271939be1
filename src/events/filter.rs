//! Subscription filters.
//!
//! A filter is three optional criteria joined with AND. An unset criterion
//! matches every event. A scope criterion only matches events carrying that
//! exact scope, so a scoped filter never sees scopeless events.

use std::collections::HashSet;

use crate::events::types::{Event, EventType};
use crate::types::{BreakerError, BreakerResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub event_types: Option<HashSet<EventType>>,
    pub connection: Option<String>,
    pub scope: Option<String>,
}

impl EventFilter {
    /// Filter matching every event.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn event_types(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.event_types = Some(types.into_iter().collect());
        self
    }

    pub fn connection(mut self, identifier: impl Into<String>) -> Self {
        self.connection = Some(identifier.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Reject filters that could never match anything.
    pub fn validate(&self) -> BreakerResult<()> {
        if self.event_types.as_ref().is_some_and(HashSet::is_empty) {
            return Err(BreakerError::InvalidFilter(
                "event_types must not be empty; leave it unset to match all".to_string(),
            ));
        }
        if self.connection.as_deref() == Some("") {
            return Err(BreakerError::InvalidFilter("connection must not be empty".to_string()));
        }
        if self.scope.as_deref() == Some("") {
            return Err(BreakerError::InvalidFilter("scope must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn matches(&self, event: &Event) -> bool {
        criterion(self.event_types.as_ref(), |types| types.contains(&event.event_type))
            && criterion(self.connection.as_ref(), |id| *id == event.connection_id)
            && criterion(self.scope.as_ref(), |scope| {
                event.scope.as_ref() == Some(scope)
            })
    }
}

fn criterion<T>(expected: Option<&T>, predicate: impl FnOnce(&T) -> bool) -> bool {
    expected.map_or(true, predicate)
}
