//! In-memory platforms for testing.
//!
//! Both fakes are cheap to clone and share state between clones, so a test
//! can keep a handle for assertions after handing one to an adapter.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use lifeline_core::{storage::BoxFuture, Category};
use tokio::sync::RwLock;

use crate::{
    error::{Result, SourceError},
    health::{Availability, HealthPlatform, TimeRange},
    record::RawRecord,
    usage::{UsageEvent, UsageEventSource},
};

#[derive(Default)]
struct HealthState {
    records: BTreeMap<Category, Vec<RawRecord>>,
    granted: BTreeSet<String>,
    unavailable: Option<String>,
    failing: BTreeMap<Category, String>,
    grant_error: Option<String>,
    reads: Vec<(Category, TimeRange)>,
}

/// Health platform holding records in memory.
///
/// Every health category is granted by default.
#[derive(Clone)]
pub struct MockHealthPlatform {
    state: Arc<RwLock<HealthState>>,
    unsupported: BTreeSet<Category>,
}

impl Default for MockHealthPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHealthPlatform {
    /// Creates an empty, available platform with every category granted.
    pub fn new() -> Self {
        let state = HealthState {
            granted: Category::HEALTH.iter().map(|c| c.capability()).collect(),
            ..Default::default()
        };
        Self { state: Arc::new(RwLock::new(state)), unsupported: BTreeSet::new() }
    }

    /// Marks `category` as unsupported by this platform version.
    pub fn without_support_for(mut self, category: Category) -> Self {
        self.unsupported.insert(category);
        self
    }

    /// Appends records returned for `category`.
    pub async fn add_records(&self, category: Category, records: Vec<RawRecord>) {
        self.state.write().await.records.entry(category).or_default().extend(records);
    }

    /// Replaces the granted capabilities with those of `categories`.
    pub async fn grant_only(&self, categories: &[Category]) {
        self.state.write().await.granted = categories.iter().map(|c| c.capability()).collect();
    }

    /// Makes the platform unavailable.
    pub async fn set_unavailable(&self, reason: impl Into<String>) {
        self.state.write().await.unavailable = Some(reason.into());
    }

    /// Makes every read of `category` fail.
    pub async fn inject_read_error(&self, category: Category, error: impl Into<String>) {
        self.state.write().await.failing.insert(category, error.into());
    }

    /// Makes the next grant lookup fail.
    pub async fn inject_grant_error(&self, error: impl Into<String>) {
        self.state.write().await.grant_error = Some(error.into());
    }

    /// Category reads performed so far, in order.
    pub async fn reads(&self) -> Vec<(Category, TimeRange)> {
        self.state.read().await.reads.clone()
    }
}

impl HealthPlatform for MockHealthPlatform {
    fn availability(&self) -> BoxFuture<'_, Availability> {
        Box::pin(async move {
            match &self.state.read().await.unavailable {
                Some(reason) => Availability::Unavailable { reason: reason.clone() },
                None => Availability::Available,
            }
        })
    }

    fn granted_capabilities(&self) -> BoxFuture<'_, Result<BTreeSet<String>>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if let Some(error) = state.grant_error.take() {
                return Err(SourceError::unavailable(error));
            }
            Ok(state.granted.clone())
        })
    }

    fn read_records(
        &self,
        category: Category,
        range: TimeRange,
    ) -> BoxFuture<'_, Result<Vec<RawRecord>>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.reads.push((category, range));
            if let Some(error) = state.failing.get(&category) {
                return Err(SourceError::read(category, error.clone()));
            }
            Ok(state.records.get(&category).cloned().unwrap_or_default())
        })
    }

    fn supports(&self, category: Category) -> bool {
        !self.unsupported.contains(&category)
    }
}

#[derive(Default)]
struct UsageState {
    events: Vec<UsageEvent>,
    denied: bool,
    query_error: Option<String>,
    queries: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Usage event source holding events in memory.
#[derive(Clone, Default)]
pub struct MockUsageSource {
    state: Arc<RwLock<UsageState>>,
    labels: HashMap<String, String>,
}

impl MockUsageSource {
    /// Creates an authorized source without events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a display label for `package`.
    pub fn with_label(mut self, package: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(package.into(), label.into());
        self
    }

    /// Appends events.
    pub async fn add_events(&self, events: impl IntoIterator<Item = UsageEvent>) {
        self.state.write().await.events.extend(events);
    }

    /// Revokes usage access.
    pub async fn deny_authorization(&self) {
        self.state.write().await.denied = true;
    }

    /// Makes every event query fail.
    pub async fn inject_query_error(&self, error: impl Into<String>) {
        self.state.write().await.query_error = Some(error.into());
    }

    /// Windows queried so far, in order.
    pub async fn queries(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.state.read().await.queries.clone()
    }
}

impl UsageEventSource for MockUsageSource {
    fn has_usage_authorization(&self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(!self.state.read().await.denied) })
    }

    fn query_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<UsageEvent>>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.queries.push((start, end));
            if let Some(error) = &state.query_error {
                return Err(SourceError::Io(error.clone()));
            }
            Ok(state
                .events
                .iter()
                .filter(|e| e.timestamp >= start && e.timestamp < end)
                .cloned()
                .collect())
        })
    }

    fn app_label(&self, package: &str) -> Option<String> {
        self.labels.get(package).cloned()
    }
}
