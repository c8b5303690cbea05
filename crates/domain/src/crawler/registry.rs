//! Crawler registry: explicit registration, no reflection or
//! subpackage scanning — new crawlers are added by listing them here.

use super::base::Crawler;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct CrawlerRegistry {
    crawlers: HashMap<&'static str, Arc<dyn Crawler>>,
}

impl CrawlerRegistry {
    pub fn new(crawlers: Vec<Arc<dyn Crawler>>) -> Self {
        let mut map = HashMap::new();
        for crawler in crawlers {
            map.insert(crawler.crawler_id(), crawler);
        }
        Self { crawlers: map }
    }

    pub fn get(&self, crawler_id: &str) -> Option<Arc<dyn Crawler>> {
        self.crawlers.get(crawler_id).cloned()
    }

    pub fn list_available(&self) -> Vec<(&'static str, &'static str)> {
        let mut ids: Vec<_> = self
            .crawlers
            .values()
            .map(|c| (c.crawler_id(), c.display_name()))
            .collect();
        ids.sort_by_key(|(id, _)| *id);
        ids
    }

    /// The attribution strings crawlers stamp into `modification_history`
    /// entries, used to scope the update-history feed to crawler activity.
    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .crawlers
            .values()
            .map(|c| c.source_name().to_string())
            .collect();
        names.sort();
        names
    }
}
