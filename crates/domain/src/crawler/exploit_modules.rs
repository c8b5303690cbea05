//! Exploit-module crawler: walks a Metasploit-style module tree and
//! attaches each module's CVE reference as a proof-of-concept.

use super::base::{Crawler, CrawlOutcome, ProgressReporter};
use crate::cve_service::{CveService, CveUpsertItem};
use cve_core::CrawlerStage;
use regex::Regex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SOURCE_NAME: &str = "Metasploit-Crawler";
const CLONE_TIMEOUT: Duration = Duration::from_secs(180);
const PULL_TIMEOUT: Duration = Duration::from_secs(120);
const CHUNK_SIZE: usize = 50;

pub struct ExploitModuleCrawler {
    repo_url: String,
    repo_path: PathBuf,
}

impl ExploitModuleCrawler {
    pub fn new(repo_url: impl Into<String>, data_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_url: repo_url.into(),
            repo_path: data_dir.as_ref().join("metasploit-framework"),
        }
    }

    fn modules_path(&self) -> PathBuf {
        self.repo_path.join("modules").join("exploits")
    }

    fn repo_web_base(&self) -> String {
        self.repo_url.trim_end_matches(".git").to_string()
    }

    async fn clone_or_pull(&self) -> Result<(), String> {
        let repo_path = self.repo_path.clone();
        if !repo_path.exists() {
            let clone_path = repo_path.clone();
            let clone_url = self.repo_url.clone();
            let result = tokio::time::timeout(
                CLONE_TIMEOUT,
                tokio::task::spawn_blocking(move || clone_shallow(&clone_url, &clone_path)),
            )
            .await;
            match result {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(e))) => {
                    let _ = std::fs::remove_dir_all(&repo_path);
                    Err(format!("git clone failed: {e}"))
                }
                Ok(Err(e)) => {
                    let _ = std::fs::remove_dir_all(&repo_path);
                    Err(format!("clone task panicked: {e}"))
                }
                Err(_) => {
                    let _ = std::fs::remove_dir_all(&repo_path);
                    Err("git clone timed out after 3 minutes".to_string())
                }
            }
        } else {
            let pull_path = repo_path.clone();
            let result = tokio::time::timeout(
                PULL_TIMEOUT,
                tokio::task::spawn_blocking(move || pull_fast_forward(&pull_path)),
            )
            .await;
            match result {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(e))) => Err(format!("git pull failed: {e}")),
                Ok(Err(e)) => Err(format!("pull task panicked: {e}")),
                Err(_) => Err("git pull timed out after 2 minutes".to_string()),
            }
        }
    }

    fn walk_ruby_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut stack = vec![self.modules_path()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else { continue };
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.extension().map(|ext| ext == "rb").unwrap_or(false) {
                    files.push(path);
                }
            }
        }
        files
    }
}

#[async_trait::async_trait]
impl Crawler for ExploitModuleCrawler {
    fn crawler_id(&self) -> &'static str {
        "metasploit"
    }

    fn display_name(&self) -> &'static str {
        "Metasploit Crawler"
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn crawl(&self, reporter: &ProgressReporter, cve_service: &CveService) -> CrawlOutcome {
        reporter
            .report(CrawlerStage::Preparing, 0, "starting update", json!({}))
            .await;

        if let Err(e) = self.clone_or_pull().await {
            reporter.report(CrawlerStage::Error, 0, &e, json!({})).await;
            return CrawlOutcome {
                stage: CrawlerStage::Error,
                updated_count: 0,
                failed_count: 0,
                message: e,
                severity_histogram: std::collections::HashMap::new(),
                samples: Vec::new(),
            };
        }
        reporter.report(CrawlerStage::Preparing, 10, "repository ready", json!({})).await;

        reporter.report(CrawlerStage::Fetching, 10, "scanning exploit modules", json!({})).await;
        let files = self.walk_ruby_files();
        if files.is_empty() {
            let message = "no exploit modules found".to_string();
            reporter.report(CrawlerStage::Error, 0, &message, json!({})).await;
            return CrawlOutcome {
                stage: CrawlerStage::Error,
                updated_count: 0,
                failed_count: 0,
                message,
                severity_histogram: std::collections::HashMap::new(),
                samples: Vec::new(),
            };
        }
        reporter
            .report(CrawlerStage::Fetching, 20, &format!("found {} modules", files.len()), json!({}))
            .await;

        reporter
            .report(CrawlerStage::Processing, 20, &format!("parsing {} modules", files.len()), json!({}))
            .await;

        let total = files.len();
        let web_base = self.repo_web_base();
        let mut parsed = Vec::new();
        for (chunk_idx, chunk) in files.chunks(CHUNK_SIZE).enumerate() {
            for file in chunk {
                if let Some(item) = parse_module_file(file, &self.repo_path, &web_base) {
                    parsed.push(item);
                }
            }
            let processed = ((chunk_idx + 1) * CHUNK_SIZE).min(total);
            let percent = 20 + (processed * 40 / total) as u8;
            reporter
                .report(
                    CrawlerStage::Processing,
                    percent,
                    &format!("parsed {processed}/{total} modules"),
                    json!({}),
                )
                .await;
        }

        if parsed.is_empty() {
            let message = "no module referenced a CVE".to_string();
            reporter.report(CrawlerStage::Completed, 100, &message, json!({})).await;
            return CrawlOutcome {
                stage: CrawlerStage::Completed,
                updated_count: 0,
                failed_count: 0,
                message,
                severity_histogram: std::collections::HashMap::new(),
                samples: Vec::new(),
            };
        }

        reporter
            .report(CrawlerStage::Saving, 60, &format!("updating {} CVE records", parsed.len()), json!({}))
            .await;

        let total_parsed = parsed.len();
        let mut updated_count = 0u32;
        let mut failed_count = 0u32;
        let mut severity_histogram: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
        let mut samples = Vec::new();
        for (idx, item) in parsed.into_iter().enumerate() {
            let cve_id = cve_core::Cve::canonical_id(&item.cve_id);
            match super::base::update_cve(cve_service, item, SOURCE_NAME).await {
                Ok(true) => {
                    updated_count += 1;
                    *severity_histogram.entry("unknown".to_string()).or_insert(0) += 1;
                    if samples.len() < 10 {
                        samples.push(cve_id);
                    }
                }
                Ok(false) => {}
                Err(_) => failed_count += 1,
            }

            if (idx + 1) % CHUNK_SIZE == 0 || idx + 1 == total_parsed {
                let percent = 60 + ((idx + 1) * 40 / total_parsed) as u8;
                reporter
                    .report(CrawlerStage::Saving, percent.min(100), &format!("saved {}/{total_parsed}", idx + 1), json!({}))
                    .await;
            }
        }

        let stage = if failed_count == 0 {
            CrawlerStage::Completed
        } else if updated_count > 0 {
            CrawlerStage::PartialSuccess
        } else {
            CrawlerStage::Error
        };
        let message = format!("updated {updated_count} CVEs, {failed_count} failed");
        reporter.report(stage, 100, &message, json!({})).await;

        CrawlOutcome { stage, updated_count, failed_count, message, severity_histogram, samples }
    }
}

fn parse_module_file(path: &Path, repo_path: &Path, repo_web_base: &str) -> Option<CveUpsertItem> {
    let content = std::fs::read_to_string(path).ok()?;

    let cve_re = Regex::new(r"CVE-\d{4}-\d{4,7}").ok()?;
    let cve_id = cve_re.find(&content)?.as_str().to_string();

    let name_re = Regex::new(r#"['"]Name['"]\s*=>\s*['"]([^'"]+)['"]"#).ok()?;
    let desc_re = Regex::new(r#"['"]Description['"]\s*=>\s*['"]([^'"]+)['"]"#).ok()?;
    let title = name_re
        .captures(&content)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "Unknown Metasploit Module".to_string());
    let description = desc_re
        .captures(&content)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "No description available".to_string());

    let reference_block_re = Regex::new(r#"(?s)['"]References['"]\s*=>\s*\[(.*?)\]"#).ok()?;
    let url_re = Regex::new(r#"['"](https?://[^'"]+)['"]"#).ok()?;

    let relative_path = path.strip_prefix(repo_path).unwrap_or(path);
    let module_url = format!("{repo_web_base}/blob/master/{}", relative_path.to_string_lossy());

    let mut references = Vec::new();
    if let Some(block) = reference_block_re.captures(&content) {
        for url_match in url_re.captures_iter(&block[1]) {
            let url = url_match[1].to_string();
            let category = if url.contains("nvd.nist.gov") {
                cve_core::ReferenceCategory::Nvd
            } else {
                cve_core::ReferenceCategory::Other
            };
            references.push(cve_core::Reference {
                url,
                category,
                description: None,
                audit: cve_core::AuditQuadruple::new(SOURCE_NAME, cve_core::clock::now()),
            });
        }
    }
    references.push(cve_core::Reference {
        url: module_url.clone(),
        category: cve_core::ReferenceCategory::Exploit,
        description: Some("Metasploit module".to_string()),
        audit: cve_core::AuditQuadruple::new(SOURCE_NAME, cve_core::clock::now()),
    });

    let poc = cve_core::ProofOfConcept {
        source: cve_core::PocSource::Metasploit,
        url: module_url,
        description: Some(format!("Metasploit: {title}")),
        audit: cve_core::AuditQuadruple::new(SOURCE_NAME, cve_core::clock::now()),
    };

    Some(CveUpsertItem {
        cve_id,
        title,
        description,
        severity_raw: None,
        source_hash: None,
        references,
        pocs: vec![poc],
        snort_rules: Vec::new(),
    })
}

fn clone_shallow(url: &str, path: &Path) -> Result<(), git2::Error> {
    let mut fetch_options = git2::FetchOptions::new();
    fetch_options.depth(1);
    git2::build::RepoBuilder::new()
        .fetch_options(fetch_options)
        .clone(url, path)?;
    Ok(())
}

fn pull_fast_forward(path: &Path) -> Result<(), git2::Error> {
    let repo = git2::Repository::open(path)?;
    let mut remote = repo.find_remote("origin")?;
    remote.fetch(&["master"], None, None)?;
    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let fetch_commit = repo.reference_to_annotated_commit(&fetch_head)?;
    let analysis = repo.merge_analysis(&[&fetch_commit])?;
    if analysis.0.is_up_to_date() {
        return Ok(());
    }
    let mut head_ref = repo.find_reference("refs/heads/master")?;
    head_ref.set_target(fetch_commit.id(), "fast-forward")?;
    repo.set_head("refs/heads/master")?;
    repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_module_with_cve_and_references() {
        let dir = std::env::temp_dir().join(format!("msf-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file_path = dir.join("module.rb");
        let mut file = std::fs::File::create(&file_path).unwrap();
        writeln!(
            file,
            r#"'Name' => 'Test Module', 'Description' => 'Triggers CVE-2023-9999', 'References' => [ ['URL', 'https://nvd.nist.gov/vuln/detail/CVE-2023-9999'] ]"#
        )
        .unwrap();

        let item =
            parse_module_file(&file_path, &dir, "https://github.com/rapid7/metasploit-framework")
                .unwrap();
        assert_eq!(item.cve_id, "CVE-2023-9999");
        assert_eq!(item.title, "Test Module");
        assert!(item.references.iter().any(|r| r.url.contains("nvd.nist.gov")));
        assert!(item.pocs[0].url.contains("/blob/master/module.rb"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
