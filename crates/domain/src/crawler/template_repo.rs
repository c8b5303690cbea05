//! Template-repo crawler: tracks a public nuclei-style templates
//! repository and turns each `<year>/<cve-id>.yaml` file into a CVE record.

use super::base::{Crawler, CrawlOutcome, ProgressReporter};
use crate::cve_service::{merge_pocs, merge_references, CveService, CveUpsertItem};
use cve_core::{CrawlerStage, ReferenceCategory};
use regex::Regex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use yaml_rust2::YamlLoader;

const SOURCE_NAME: &str = "Nuclei-Crawler";
const CLONE_TIMEOUT: Duration = Duration::from_secs(180);
const PULL_TIMEOUT: Duration = Duration::from_secs(120);
const CHUNK_SIZE: usize = 50;

pub struct TemplateRepoCrawler {
    repo_url: String,
    repo_path: PathBuf,
}

impl TemplateRepoCrawler {
    pub fn new(repo_url: impl Into<String>, data_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_url: repo_url.into(),
            repo_path: data_dir.as_ref().join("nuclei-templates"),
        }
    }

    fn cves_path(&self) -> PathBuf {
        self.repo_path.join("http").join("cves")
    }

    /// Base web URL for linking to files in the tracked repository.
    fn repo_web_base(&self) -> String {
        self.repo_url.trim_end_matches(".git").to_string()
    }

    /// Shallow single-branch clone if the repo isn't present yet, otherwise
    /// a fast-forward pull. A failed clone wipes the partial directory so the
    /// next run starts clean rather than retrying against a half-cloned repo.
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

    /// Scans every `<year>/*.yaml` file under `cves_path`, bounded at a
    /// handful of concurrent year directories.
    async fn find_template_files(&self) -> Vec<PathBuf> {
        let cves_path = self.cves_path();
        let year_dirs = match std::fs::read_dir(&cves_path) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect::<Vec<_>>(),
            Err(_) => return Vec::new(),
        };

        let tasks = year_dirs.into_iter().map(|dir| {
            tokio::task::spawn_blocking(move || {
                std::fs::read_dir(&dir)
                    .map(|entries| {
                        entries
                            .filter_map(|e| e.ok())
                            .map(|e| e.path())
                            .filter(|p| p.extension().map(|ext| ext == "yaml").unwrap_or(false))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            })
        });

        let mut files = Vec::new();
        for task in tasks {
            if let Ok(mut found) = task.await {
                files.append(&mut found);
            }
        }
        files
    }
}

#[async_trait::async_trait]
impl Crawler for TemplateRepoCrawler {
    fn crawler_id(&self) -> &'static str {
        "nuclei"
    }

    fn display_name(&self) -> &'static str {
        "Nuclei Templates Crawler"
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn crawl(&self, reporter: &ProgressReporter, cve_service: &CveService) -> CrawlOutcome {
        reporter
            .report(CrawlerStage::Preparing, 0, "starting update", json!({}))
            .await;

        if let Err(e) = self.clone_or_pull().await {
            reporter
                .report(CrawlerStage::Error, 0, &e, json!({}))
                .await;
            return CrawlOutcome {
                stage: CrawlerStage::Error,
                updated_count: 0,
                failed_count: 0,
                message: e,
                severity_histogram: std::collections::HashMap::new(),
                samples: Vec::new(),
            };
        }
        reporter
            .report(CrawlerStage::Preparing, 10, "repository ready", json!({}))
            .await;

        reporter
            .report(CrawlerStage::Fetching, 10, "collecting template files", json!({}))
            .await;
        let files = self.find_template_files().await;
        if files.is_empty() {
            let message = "no template files found".to_string();
            reporter
                .report(CrawlerStage::Error, 0, &message, json!({}))
                .await;
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
            .report(
                CrawlerStage::Fetching,
                20,
                &format!("collected {} template files", files.len()),
                json!({}),
            )
            .await;

        reporter
            .report(
                CrawlerStage::Processing,
                20,
                &format!("processing {} template files", files.len()),
                json!({}),
            )
            .await;

        let total = files.len();
        let web_base = self.repo_web_base();
        let mut parsed = Vec::with_capacity(total);
        for (chunk_idx, chunk) in files.chunks(CHUNK_SIZE).enumerate() {
            for file in chunk {
                if let Some(item) = parse_template_file(file, &web_base) {
                    parsed.push(item);
                }
            }
            let processed = ((chunk_idx + 1) * CHUNK_SIZE).min(total);
            let percent = 20 + (processed * 40 / total) as u8;
            reporter
                .report(
                    CrawlerStage::Processing,
                    percent,
                    &format!("processed {processed}/{total} files"),
                    json!({}),
                )
                .await;
        }

        if parsed.is_empty() {
            let message = "no template file yielded a usable CVE record".to_string();
            reporter
                .report(CrawlerStage::Error, 0, &message, json!({}))
                .await;
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
            .report(
                CrawlerStage::Saving,
                60,
                &format!("updating {} CVE records", parsed.len()),
                json!({}),
            )
            .await;

        let total_parsed = parsed.len();
        let mut updated_count = 0u32;
        let mut failed_count = 0u32;
        let mut severity_histogram: std::collections::HashMap<String, u32> = std::collections::HashMap::new();
        let mut samples = Vec::new();
        for (idx, item) in parsed.into_iter().enumerate() {
            let cve_id = cve_core::Cve::canonical_id(&item.cve_id);
            let severity_label = item
                .severity_raw
                .as_deref()
                .map(cve_core::Severity::from_upstream)
                .unwrap_or(cve_core::Severity::Unknown);
            match apply_template_item(cve_service, item).await {
                Ok(true) => {
                    updated_count += 1;
                    *severity_histogram
                        .entry(format!("{severity_label:?}").to_lowercase())
                        .or_insert(0) += 1;
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
                    .report(
                        CrawlerStage::Saving,
                        percent.min(100),
                        &format!("saved {}/{total_parsed}", idx + 1),
                        json!({}),
                    )
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

fn parse_template_file(path: &Path, repo_web_base: &str) -> Option<CveUpsertItem> {
    let file_name = path.file_name()?.to_str()?;
    let cve_id = extract_cve_id_from_filename(file_name)?;
    let content = std::fs::read_to_string(path).ok()?;
    let docs = YamlLoader::load_from_str(&content).ok()?;
    let doc = docs.into_iter().next()?;
    let info = &doc["info"];

    let title = info["name"].as_str().unwrap_or(&cve_id).to_string();
    let description = info["description"].as_str().unwrap_or_default().to_string();
    let severity_raw = info["severity"].as_str().map(|s| s.to_string());

    let mut references = Vec::new();
    match &info["reference"] {
        yaml_rust2::Yaml::Array(items) => {
            for item in items {
                if let Some(url) = item.as_str() {
                    references.push(make_reference(url));
                }
            }
        }
        yaml_rust2::Yaml::String(url) => references.push(make_reference(url)),
        _ => {}
    }

    let year = cve_id
        .strip_prefix("CVE-")
        .and_then(|rest| rest.split('-').next())
        .unwrap_or("unknown");
    let poc_url = format!("{repo_web_base}/blob/main/http/cves/{year}/{cve_id}.yaml");
    let poc = cve_core::ProofOfConcept {
        source: cve_core::PocSource::NucleiTemplates,
        url: poc_url,
        description: Some(format!("Nuclei template for {cve_id}")),
        audit: cve_core::AuditQuadruple::new(SOURCE_NAME, cve_core::clock::now()),
    };

    Some(CveUpsertItem {
        cve_id,
        title,
        description,
        severity_raw,
        source_hash: extract_digest_hash(&content),
        references,
        pocs: vec![poc],
        snort_rules: Vec::new(),
    })
}

fn make_reference(url: &str) -> cve_core::Reference {
    let category = if url.contains("nvd.nist.gov") {
        ReferenceCategory::Nvd
    } else if url.contains("exploit-db.com")
        || url.contains("nuclei-templates")
        || url.contains("metasploit-framework")
    {
        ReferenceCategory::Exploit
    } else {
        ReferenceCategory::Other
    };
    cve_core::Reference {
        url: url.to_string(),
        category,
        description: Some("Nuclei template reference".to_string()),
        audit: cve_core::AuditQuadruple::new(SOURCE_NAME, cve_core::clock::now()),
    }
}

/// `CVE-2021-44228.yaml` and `cve-2021-44228-log4shell.yaml` both yield
/// `CVE-2021-44228`; anything without an embedded CVE id is skipped.
fn extract_cve_id_from_filename(file_name: &str) -> Option<String> {
    static CVE_RE: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"(?i)(CVE-\d{4}-\d{4,})").unwrap());
    CVE_RE
        .captures(file_name)
        .map(|m| m[1].to_uppercase())
}

fn extract_digest_hash(content: &str) -> Option<String> {
    let re = Regex::new(r"#\s*digest:\s*([a-fA-F0-9:]+)").ok()?;
    re.captures(content).map(|m| m[1].to_string())
}

/// Applies the source-hash shortcut: if the stored `nuclei_hash` already
/// matches the item's digest, skip the write entirely; if it's missing,
/// write only the hash; otherwise patch everything the template is
/// authoritative for — content fields plus the merged references/PoCs —
/// as one update, so the run appends a single consolidated history entry
/// and emits a single `cve_updated` (the engine falls back to a
/// whole-document replace if the partial update fails). Returns whether a
/// write happened.
async fn apply_template_item(
    cve_service: &CveService,
    item: CveUpsertItem,
) -> cve_core::Result<bool> {
    let cve_id = cve_core::Cve::canonical_id(&item.cve_id);
    let digest = item.source_hash.as_deref();
    match cve_service.get_detail(&cve_id).await? {
        Some(current) => {
            if digest.is_some() && current.nuclei_hash.as_deref() == digest {
                return Ok(false);
            }
            if current.nuclei_hash.is_none() {
                let mut replaced = current.clone();
                replaced.nuclei_hash = digest.map(str::to_string);
                cve_service.replace(&cve_id, replaced).await?;
                return Ok(true);
            }

            let mut references = current.references.clone();
            merge_references(&mut references, &item.references, SOURCE_NAME);
            let mut pocs = current.pocs.clone();
            merge_pocs(&mut pocs, &item.pocs, SOURCE_NAME);

            let mut patch = serde_json::Map::new();
            patch.insert("title".to_string(), json!(item.title));
            patch.insert("description".to_string(), json!(item.description));
            if let Some(raw) = &item.severity_raw {
                patch.insert("severity".to_string(), json!(cve_core::Severity::from_upstream(raw)));
            }
            patch.insert("nuclei_hash".to_string(), json!(digest));
            patch.insert("references".to_string(), json!(references));
            patch.insert("pocs".to_string(), json!(pocs));
            cve_service
                .update(&cve_id, serde_json::Value::Object(patch), SOURCE_NAME)
                .await?;
            Ok(true)
        }
        None => {
            cve_service.create(item, SOURCE_NAME).await?;
            Ok(true)
        }
    }
}

fn clone_shallow(url: &str, path: &Path) -> Result<(), git2::Error> {
    let mut fetch_options = git2::FetchOptions::new();
    fetch_options.depth(1);
    git2::build::RepoBuilder::new()
        .fetch_options(fetch_options)
        .branch("main")
        .clone(url, path)?;
    Ok(())
}

fn pull_fast_forward(path: &Path) -> Result<(), git2::Error> {
    let repo = git2::Repository::open(path)?;
    let mut remote = repo.find_remote("origin")?;
    remote.fetch(&["main"], None, None)?;
    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let fetch_commit = repo.reference_to_annotated_commit(&fetch_head)?;
    let analysis = repo.merge_analysis(&[&fetch_commit])?;
    if analysis.0.is_up_to_date() {
        return Ok(());
    }
    let mut head_ref = repo.find_reference("refs/heads/main")?;
    head_ref.set_target(fetch_commit.id(), "fast-forward")?;
    repo.set_head("refs/heads/main")?;
    repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_cve_id_from_exact_filename() {
        assert_eq!(
            extract_cve_id_from_filename("CVE-2023-12345.yaml"),
            Some("CVE-2023-12345".to_string())
        );
    }

    #[test]
    fn extracts_cve_id_embedded_in_filename() {
        assert_eq!(
            extract_cve_id_from_filename("cve-2021-44228-log4shell.yaml"),
            Some("CVE-2021-44228".to_string())
        );
    }

    #[test]
    fn non_cve_filename_yields_none() {
        assert_eq!(extract_cve_id_from_filename("generic-template.yaml"), None);
    }

    #[test]
    fn extracts_trailing_digest_comment() {
        let content = "id: cve-2023-1\ninfo:\n  name: test\n# digest: 4a3b2c1d\n";
        assert_eq!(extract_digest_hash(content), Some("4a3b2c1d".to_string()));
    }
}
