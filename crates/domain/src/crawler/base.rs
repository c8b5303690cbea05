//! Crawler base: the `report_progress` throttle, the `update_cve`
//! wrapper, and the `Crawler` trait every implementation satisfies.

use crate::cve_service::{CveService, CveUpsertItem};
use cve_core::{CrawlerStage, Result};
use cve_push::{PushFabric, PushTarget};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const THROTTLE_INTERVAL: Duration = Duration::from_millis(200);
const MILESTONES: [u8; 5] = [0, 25, 50, 75, 100];

/// Outcome of a single crawl run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CrawlOutcome {
    pub stage: CrawlerStage,
    pub updated_count: u32,
    pub failed_count: u32,
    pub message: String,
    pub severity_histogram: std::collections::HashMap<String, u32>,
    /// A handful of cve_ids touched by this run, capped at 10, for the
    /// scheduler's last-result summary.
    pub samples: Vec<String>,
}

#[async_trait::async_trait]
pub trait Crawler: Send + Sync {
    fn crawler_id(&self) -> &'static str;
    fn display_name(&self) -> &'static str;

    /// The attribution string written into `created_by`/`last_modified_by`
    /// and modification-history entries for data this crawler ingests.
    fn source_name(&self) -> &'static str;

    /// Runs the full `prepare → fetch → parse → process → complete|error`
    /// sequence, reporting progress through `reporter` as it goes.
    async fn crawl(&self, reporter: &ProgressReporter, cve_service: &CveService) -> CrawlOutcome;
}

/// Tracks per-stage throttle state so `report_progress` emits at most one
/// event per 200ms per stage, plus unconditionally at milestones and stage
/// transitions.
pub struct ProgressReporter {
    push: PushFabric,
    crawler_id: String,
    requester_id: Option<String>,
    quiet: bool,
    last_emit: Mutex<Option<(CrawlerStage, Instant)>>,
    /// Shared with the scheduler so a concurrent trigger request can read
    /// this run's live percentage instead of just learning it's busy.
    progress: Arc<StdMutex<HashMap<String, u8>>>,
}

impl ProgressReporter {
    pub fn new(
        push: PushFabric,
        crawler_id: impl Into<String>,
        requester_id: Option<String>,
        quiet: bool,
        progress: Arc<StdMutex<HashMap<String, u8>>>,
    ) -> Self {
        Self {
            push,
            crawler_id: crawler_id.into(),
            requester_id,
            quiet,
            last_emit: Mutex::new(None),
            progress,
        }
    }

    pub async fn report(&self, stage: CrawlerStage, percent: u8, message: &str, extras: Value) {
        self.progress
            .lock()
            .unwrap()
            .insert(self.crawler_id.clone(), percent);

        if self.quiet {
            return;
        }

        let mut guard = self.last_emit.lock().await;
        let now = Instant::now();
        let is_milestone = MILESTONES.contains(&percent);
        let is_transition = guard.as_ref().map(|(s, _)| *s != stage).unwrap_or(true);
        let is_terminal = matches!(stage, CrawlerStage::Completed | CrawlerStage::Error);
        let throttled = guard
            .as_ref()
            .map(|(s, at)| *s == stage && now.duration_since(*at) < THROTTLE_INTERVAL)
            .unwrap_or(false);

        if throttled && !is_milestone && !is_transition && !is_terminal {
            return;
        }
        *guard = Some((stage, now));
        drop(guard);

        let payload = json!({
            "crawler_id": self.crawler_id,
            "stage": stage,
            "percent": percent,
            "message": message,
            "extras": extras,
        });

        let target = match &self.requester_id {
            Some(username) => PushTarget::Username(username.clone()),
            None => PushTarget::All,
        };
        self.push
            .emit(cve_push::events::CRAWLER_UPDATE_PROGRESS, payload, target)
            .await;
    }
}

/// The shared crawler write path: creates the CVE if it's new, otherwise
/// merges the item's source-owned collections into the existing document
/// (never touching human-edited fields). Returns whether anything was
/// actually written, so crawlers can report honest updated counts on
/// idempotent re-ingests.
pub async fn update_cve(
    cve_service: &CveService,
    item: CveUpsertItem,
    source_name: &str,
) -> Result<bool> {
    let cve_id = cve_core::Cve::canonical_id(&item.cve_id);
    match cve_service.get_detail(&cve_id).await? {
        Some(_) => cve_service.merge_from_source(&cve_id, &item, source_name).await,
        None => {
            cve_service.create(item, source_name).await?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cve_push::SessionRegistry;
    use tokio::sync::mpsc;

    async fn reporter_with_listener(
        quiet: bool,
    ) -> (
        ProgressReporter,
        mpsc::UnboundedReceiver<String>,
        Arc<StdMutex<HashMap<String, u8>>>,
    ) {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        registry
            .connect("s1".to_string(), "sess".to_string(), "alice".to_string(), tx)
            .await;
        let progress = Arc::new(StdMutex::new(HashMap::new()));
        let reporter = ProgressReporter::new(
            PushFabric::new(registry),
            "nuclei",
            None,
            quiet,
            Arc::clone(&progress),
        );
        (reporter, rx, progress)
    }

    #[tokio::test]
    async fn rapid_same_stage_reports_are_throttled() {
        let (reporter, mut rx, _) = reporter_with_listener(false).await;
        reporter.report(CrawlerStage::Fetching, 13, "a", json!({})).await;
        reporter.report(CrawlerStage::Fetching, 14, "b", json!({})).await;

        assert!(rx.try_recv().is_ok(), "stage transition always emits");
        assert!(rx.try_recv().is_err(), "second report within 200ms is dropped");
    }

    #[tokio::test]
    async fn milestones_and_terminal_stages_bypass_the_throttle() {
        let (reporter, mut rx, _) = reporter_with_listener(false).await;
        reporter.report(CrawlerStage::Fetching, 13, "a", json!({})).await;
        reporter.report(CrawlerStage::Fetching, 25, "b", json!({})).await;
        reporter.report(CrawlerStage::Completed, 100, "done", json!({})).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn quiet_mode_suppresses_emission_but_still_tracks_progress() {
        let (reporter, mut rx, progress) = reporter_with_listener(true).await;
        reporter.report(CrawlerStage::Saving, 80, "saving", json!({})).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(progress.lock().unwrap().get("nuclei"), Some(&80));
    }
}
