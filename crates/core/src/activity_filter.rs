//! Query filter for the user activity log.
//!
//! Shaped after the audit backend's filter/builder pair: a plain struct of
//! optional fields plus a fluent builder, so callers compose a query without
//! constructing the struct literal by hand. Multi-valued fields (`target_types`,
//! `actions`) are OR'd by the store layer.

use crate::types::{ActivityAction, ActivityTargetType};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub target_types: Option<Vec<ActivityTargetType>>,
    pub actions: Option<Vec<ActivityAction>>,
    pub username: Option<String>,
    pub target_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

pub struct ActivityFilterBuilder {
    filter: ActivityFilter,
}

impl ActivityFilterBuilder {
    pub fn new() -> Self {
        Self { filter: ActivityFilter::default() }
    }

    pub fn target_types(mut self, target_types: Vec<ActivityTargetType>) -> Self {
        self.filter.target_types = Some(target_types);
        self
    }

    pub fn actions(mut self, actions: Vec<ActivityAction>) -> Self {
        self.filter.actions = Some(actions);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.filter.username = Some(username.into());
        self
    }

    pub fn target_id(mut self, target_id: impl Into<String>) -> Self {
        self.filter.target_id = Some(target_id.into());
        self
    }

    pub fn time_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.filter.start_time = Some(start);
        self.filter.end_time = Some(end);
        self
    }

    pub fn build(self) -> ActivityFilter {
        self.filter
    }
}

impl Default for ActivityFilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityFilter {
    pub fn builder() -> ActivityFilterBuilder {
        ActivityFilterBuilder::new()
    }
}
