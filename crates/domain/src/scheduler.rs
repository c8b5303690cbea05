//! Crawler scheduler: cron-like recurring triggers plus a manual
//! trigger API, both funneling through the same run-and-record path.
//!
//! A coordinating mutex guards only the `running` set — the crawl itself
//! executes outside the lock so a long-running crawler never blocks the
//! scheduler's tick or a second crawler's manual trigger.

use crate::crawler::{CrawlOutcome, CrawlerRegistry, ProgressReporter};
use crate::cve_service::CveService;
use chrono_tz::Asia::Seoul;
use cve_core::{CacheKind, CrawlerStage, Error, Result};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub crawler_id: String,
    pub stage: CrawlerStage,
    pub updated_count: u32,
    pub failed_count: u32,
    pub message: String,
    pub severity_histogram: HashMap<String, u32>,
    pub samples: Vec<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlerStatus {
    pub crawler_id: String,
    pub display_name: String,
    pub is_running: bool,
    pub last_update: Option<chrono::DateTime<chrono::Utc>>,
    pub last_result: Option<RunOutcome>,
}

/// Outcome of a manual/scheduled trigger request. `AlreadyRunning` carries
/// the live progress percentage of the in-flight run so a second caller
/// gets something more useful than a bare conflict.
#[derive(Debug, Clone, Copy)]
pub enum RunStatus {
    Started,
    AlreadyRunning { progress: u8 },
}

/// A cron-triggered crawler: the schedule expression and the crawler it
/// fires. Schedules are evaluated in Asia/Seoul.
struct ScheduledJob {
    crawler_id: &'static str,
    schedule: Schedule,
}

pub struct CrawlerScheduler {
    registry: Arc<CrawlerRegistry>,
    store: Arc<cve_core::CveStore>,
    cache: Arc<cve_core::ResponseCache>,
    push: cve_push::PushFabric,
    cve_service: Arc<CveService>,
    metrics: Arc<cve_core::CrawlerMetrics>,
    running: Arc<Mutex<HashSet<String>>>,
    /// Last-reported progress percent per crawler_id, kept up to date by
    /// every `ProgressReporter` spawned from `run()` so a concurrent
    /// trigger can report `already_running` with a live percentage instead
    /// of a bare conflict.
    progress: Arc<Mutex<HashMap<String, u8>>>,
    jobs: Vec<ScheduledJob>,
}

impl CrawlerScheduler {
    pub fn new(
        registry: Arc<CrawlerRegistry>,
        store: Arc<cve_core::CveStore>,
        cache: Arc<cve_core::ResponseCache>,
        push: cve_push::PushFabric,
        cve_service: Arc<CveService>,
        metrics: Arc<cve_core::CrawlerMetrics>,
    ) -> Result<Self> {
        let jobs = vec![
            ScheduledJob {
                crawler_id: "nuclei",
                schedule: Schedule::from_str("0 0 0 * * *")
                    .map_err(|e| Error::internal(format!("invalid cron expression: {e}")))?,
            },
            ScheduledJob {
                crawler_id: "metasploit",
                schedule: Schedule::from_str("0 0 3 * * Mon")
                    .map_err(|e| Error::internal(format!("invalid cron expression: {e}")))?,
            },
            ScheduledJob {
                crawler_id: "emerging_threats",
                schedule: Schedule::from_str("0 0 */6 * * *")
                    .map_err(|e| Error::internal(format!("invalid cron expression: {e}")))?,
            },
        ];

        Ok(Self {
            registry,
            store,
            cache,
            push,
            cve_service,
            metrics,
            running: Arc::new(Mutex::new(HashSet::new())),
            progress: Arc::new(Mutex::new(HashMap::new())),
            jobs,
        })
    }

    /// Runs the cron loop forever, waking once a minute to check whether
    /// any scheduled job's next fire time has passed. Intended to be spawned
    /// as a single long-lived background task.
    pub async fn run_forever(self: Arc<Self>) {
        let mut last_fired: HashMap<&'static str, chrono::DateTime<chrono_tz::Tz>> = HashMap::new();
        loop {
            let now = chrono::Utc::now().with_timezone(&Seoul);
            for job in &self.jobs {
                let mut upcoming = job.schedule.after(&(now - chrono::Duration::minutes(1)));
                if let Some(next) = upcoming.next() {
                    if next <= now && last_fired.get(job.crawler_id) != Some(&next) {
                        last_fired.insert(job.crawler_id, next);
                        let scheduler = Arc::clone(&self);
                        let crawler_id = job.crawler_id.to_string();
                        tokio::spawn(async move {
                            let _ = scheduler.run(&crawler_id, None, true).await;
                        });
                    }
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
    }

    /// Manual or scheduled trigger. Returns immediately once the crawl has
    /// been spawned; the caller observes progress via the push fabric.
    pub async fn run(
        &self,
        crawler_id: &str,
        requester_username: Option<String>,
        quiet: bool,
    ) -> Result<RunStatus> {
        let crawler = self
            .registry
            .get(crawler_id)
            .ok_or_else(|| Error::not_found(format!("unknown crawler: {crawler_id}")))?;

        {
            let mut running = self.running.lock().unwrap();
            if running.contains(crawler_id) {
                let progress = self
                    .progress
                    .lock()
                    .unwrap()
                    .get(crawler_id)
                    .copied()
                    .unwrap_or(0);
                return Ok(RunStatus::AlreadyRunning { progress });
            }
            running.insert(crawler_id.to_string());
        }
        self.progress.lock().unwrap().insert(crawler_id.to_string(), 0);

        let reporter = ProgressReporter::new(
            self.push.clone(),
            crawler_id.to_string(),
            requester_username,
            quiet,
            Arc::clone(&self.progress),
        );
        reporter
            .report(CrawlerStage::Preparing, 0, "queued", json!({}))
            .await;

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let cve_service = Arc::clone(&self.cve_service);
        let metrics = Arc::clone(&self.metrics);
        let crawler_id_owned = crawler_id.to_string();
        let running_marker = RunningGuard {
            running: Arc::clone(&self.running),
            crawler_id: crawler_id_owned.clone(),
        };

        tokio::spawn(async move {
            let _guard = running_marker;
            let started = std::time::Instant::now();
            let outcome = crawler.crawl(&reporter, &cve_service).await;
            metrics
                .crawl_duration_seconds
                .with_label_values(&[&crawler_id_owned])
                .observe(started.elapsed().as_secs_f64());
            record_outcome(&store, &cache, &metrics, &crawler_id_owned, outcome).await;
        });

        Ok(RunStatus::Started)
    }

    pub async fn status(&self, crawler_id: &str) -> Result<CrawlerStatus> {
        let crawler = self
            .registry
            .get(crawler_id)
            .ok_or_else(|| Error::not_found(format!("unknown crawler: {crawler_id}")))?;

        let is_running = self.running.lock().unwrap().contains(crawler_id);
        let last_update = self.store.get_crawler_last_update(crawler_id).await?;
        let last_result = self
            .cache
            .get::<RunOutcome>(CacheKind::CrawlerResult, crawler_id)
            .await?;

        Ok(CrawlerStatus {
            crawler_id: crawler_id.to_string(),
            display_name: crawler.display_name().to_string(),
            is_running,
            last_update,
            last_result,
        })
    }

    pub fn list_available(&self) -> Vec<(&'static str, &'static str)> {
        self.registry.list_available()
    }
}

/// Releases the running-flag on drop so a panicking or erroring crawl never
/// leaves its id stuck in the running set.
struct RunningGuard {
    running: Arc<Mutex<HashSet<String>>>,
    crawler_id: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.lock().unwrap().remove(&self.crawler_id);
    }
}

async fn record_outcome(
    store: &Arc<cve_core::CveStore>,
    cache: &Arc<cve_core::ResponseCache>,
    metrics: &cve_core::CrawlerMetrics,
    crawler_id: &str,
    outcome: CrawlOutcome,
) {
    let status = match outcome.stage {
        CrawlerStage::Completed => "completed",
        CrawlerStage::PartialSuccess => "partial_success",
        _ => "error",
    };
    metrics
        .crawl_runs_total
        .with_label_values(&[crawler_id, status])
        .inc();
    metrics
        .crawl_items_updated_total
        .with_label_values(&[crawler_id])
        .inc_by(u64::from(outcome.updated_count));

    let now = cve_core::clock::now();
    let _ = store.set_crawler_last_update(crawler_id, now).await;

    let result = RunOutcome {
        crawler_id: crawler_id.to_string(),
        stage: outcome.stage,
        updated_count: outcome.updated_count,
        failed_count: outcome.failed_count,
        message: outcome.message,
        severity_histogram: outcome.severity_histogram,
        samples: outcome.samples,
        updated_at: now,
    };
    let _ = cache.set(CacheKind::CrawlerResult, crawler_id, &result).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_expressions_parse() {
        for expr in ["0 0 0 * * *", "0 0 3 * * Mon", "0 0 */6 * * *"] {
            assert!(Schedule::from_str(expr).is_ok(), "{expr} should parse");
        }
    }

    #[test]
    fn running_guard_releases_the_flag_on_drop() {
        let running = Arc::new(Mutex::new(HashSet::new()));
        running.lock().unwrap().insert("nuclei".to_string());

        drop(RunningGuard {
            running: Arc::clone(&running),
            crawler_id: "nuclei".to_string(),
        });

        assert!(running.lock().unwrap().is_empty());
    }
}
