//! Rules-file crawler: downloads a single Snort rules file and turns
//! every CVE-referencing rule into a [`cve_core::SnortRule`].

use super::base::{Crawler, CrawlOutcome, ProgressReporter};
use crate::cve_service::{CveService, CveUpsertItem};
use cve_core::CrawlerStage;
use regex::Regex;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;

const SOURCE_NAME: &str = "EmergingThreats-Crawler";

pub struct RulesFileCrawler {
    rule_url: String,
    rule_file_path: PathBuf,
    hash_file_path: PathBuf,
}

impl RulesFileCrawler {
    pub fn new(rule_url: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            rule_url: rule_url.into(),
            rule_file_path: data_dir.join("emerging-all.rules"),
            hash_file_path: data_dir.join("emerging-all.hash"),
        }
    }

    async fn fetch_if_changed(&self) -> Result<bool, String> {
        let response = reqwest::get(&self.rule_url)
            .await
            .map_err(|e| format!("download failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("download failed: HTTP {}", response.status()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| format!("reading response failed: {e}"))?;

        let current_hash = hex::encode(Sha256::digest(&body));
        let previous_hash = std::fs::read_to_string(&self.hash_file_path).ok();

        if previous_hash.as_deref().map(str::trim) == Some(current_hash.as_str())
            && self.rule_file_path.exists()
        {
            return Ok(false);
        }

        if let Some(parent) = self.rule_file_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&self.rule_file_path, &body).map_err(|e| e.to_string())?;
        std::fs::write(&self.hash_file_path, &current_hash).map_err(|e| e.to_string())?;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl Crawler for RulesFileCrawler {
    fn crawler_id(&self) -> &'static str {
        "emerging_threats"
    }

    fn display_name(&self) -> &'static str {
        "EmergingThreats Crawler"
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn crawl(&self, reporter: &ProgressReporter, cve_service: &CveService) -> CrawlOutcome {
        reporter
            .report(CrawlerStage::Preparing, 0, "preparing rule file download", json!({}))
            .await;

        reporter
            .report(CrawlerStage::Fetching, 10, "downloading rules file", json!({}))
            .await;
        match self.fetch_if_changed().await {
            Ok(changed) => {
                let message = if changed { "rule file downloaded" } else { "rule file already up to date" };
                reporter.report(CrawlerStage::Fetching, 100, message, json!({})).await;
            }
            Err(e) => {
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
        }

        reporter
            .report(CrawlerStage::Processing, 20, "parsing rules", json!({}))
            .await;
        let content = match std::fs::read_to_string(&self.rule_file_path) {
            Ok(c) => c,
            Err(e) => {
                let message = format!("failed to read rule file: {e}");
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
        };

        let items = parse_rules(&content);
        reporter
            .report(
                CrawlerStage::Processing,
                60,
                &format!("parsed {} CVE-referencing rules", items.len()),
                json!({}),
            )
            .await;

        if items.is_empty() {
            let message = "no CVE-referencing rules found".to_string();
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
            .report(CrawlerStage::Saving, 60, &format!("updating {} CVE records", items.len()), json!({}))
            .await;

        let total = items.len();
        let mut updated_count = 0u32;
        let mut failed_count = 0u32;
        let mut severity_histogram: HashMap<String, u32> = HashMap::new();
        let mut samples = Vec::new();
        for (idx, item) in items.into_iter().enumerate() {
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

            if (idx + 1) % 50 == 0 || idx + 1 == total {
                let percent = 60 + ((idx + 1) * 40 / total) as u8;
                reporter
                    .report(
                        CrawlerStage::Saving,
                        percent.min(100),
                        &format!("saved {}/{total}", idx + 1),
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

fn parse_rules(content: &str) -> Vec<CveUpsertItem> {
    let no_comments = Regex::new(r"(?m)^\s*#.*$").unwrap().replace_all(content, "");
    let rule_re = Regex::new(r"(?ms)alert\s+.*?\)\s*$").unwrap();
    let cve_re = Regex::new(r"reference:cve,(\d{4}-\d{4,})").unwrap();
    let url_re = Regex::new(r"reference:url,([^;]+)").unwrap();
    let sid_re = Regex::new(r"sid:(\d+)").unwrap();
    let strip_re = Regex::new(r"(reference|metadata):[^;]+;").unwrap();

    let mut by_cve: HashMap<String, CveUpsertItem> = HashMap::new();

    for rule_match in rule_re.find_iter(&no_comments) {
        let rule_text = rule_match.as_str();
        let cves: Vec<String> = cve_re
            .captures_iter(rule_text)
            .map(|c| c[1].to_string())
            .collect();
        if cves.is_empty() {
            continue;
        }

        let sid = sid_re.captures(rule_text).map(|c| c[1].to_string());
        let clean_rule = strip_re.replace_all(rule_text, "").trim().to_string();
        let urls: Vec<String> = url_re
            .captures_iter(rule_text)
            .map(|c| c[1].trim().to_string())
            .collect();

        for cve_suffix in cves {
            let cve_id = format!("CVE-{cve_suffix}");
            let entry = by_cve.entry(cve_id.clone()).or_insert_with(|| CveUpsertItem {
                cve_id: cve_id.clone(),
                title: cve_id.clone(),
                description: String::new(),
                severity_raw: None,
                source_hash: None,
                references: Vec::new(),
                pocs: Vec::new(),
                snort_rules: Vec::new(),
            });

            for url in &urls {
                if !entry.references.iter().any(|r| &r.url == url) {
                    entry.references.push(cve_core::Reference {
                        url: url.clone(),
                        category: cve_core::ReferenceCategory::Other,
                        description: Some("EmergingThreats rule reference".to_string()),
                        audit: cve_core::AuditQuadruple::new(
                            SOURCE_NAME,
                            cve_core::clock::now(),
                        ),
                    });
                }
            }

            entry.snort_rules.push(cve_core::SnortRule {
                rule: clean_rule.clone(),
                rule_type: "emerging-threats".to_string(),
                sid: sid.clone(),
                description: None,
                audit: cve_core::AuditQuadruple::new(SOURCE_NAME, cve_core::clock::now()),
            });
        }
    }

    by_cve.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rule_with_cve_reference() {
        let rule = r#"alert tcp any any -> any any (msg:"Test rule"; reference:cve,2023-12345; reference:url,example.com/advisory; sid:1000001; rev:1;)"#;
        let items = parse_rules(rule);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].cve_id, "CVE-2023-12345");
        assert_eq!(items[0].snort_rules.len(), 1);
        assert_eq!(items[0].snort_rules[0].sid.as_deref(), Some("1000001"));
        assert!(!items[0].snort_rules[0].rule.contains("reference:"));
    }

    #[test]
    fn rules_without_cve_reference_are_skipped() {
        let rule = r#"alert tcp any any -> any any (msg:"No CVE"; sid:2000001; rev:1;)"#;
        assert!(parse_rules(rule).is_empty());
    }
}
