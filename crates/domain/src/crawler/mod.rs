pub mod base;
pub mod exploit_modules;
pub mod registry;
pub mod rules_file;
pub mod template_repo;

pub use base::{update_cve, CrawlOutcome, Crawler, ProgressReporter};
pub use exploit_modules::ExploitModuleCrawler;
pub use registry::CrawlerRegistry;
pub use rules_file::RulesFileCrawler;
pub use template_repo::TemplateRepoCrawler;
