//! `sitemap`: sitemap.xml for every page and generated route.

use super::{escape_xml, HookPhase, Plugin, PostProcessInput};
use crate::artifacts::Artifact;
use crate::blog;
use crate::config::{OptionKind, OptionSchema, PluginOptions};
use anyhow::bail;
use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;

pub const NAME: &str = "sitemap";

const CHANGEFREQS: [&str; 7] = ["always", "hourly", "daily", "weekly", "monthly", "yearly", "never"];

#[derive(Debug, Default)]
pub struct SitemapPlugin;

impl SitemapPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for SitemapPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn hooks(&self) -> &[HookPhase] {
        &[HookPhase::PostProcess]
    }

    fn options_schema(&self) -> OptionSchema {
        OptionSchema::new()
            .field("changefreq", OptionKind::String)
            .with_default("ignore_patterns", OptionKind::StringList, Vec::<String>::new())
    }

    fn post_process(&self, input: &PostProcessInput, options: &PluginOptions) -> anyhow::Result<Vec<Artifact>> {
        let config = input.config.as_ref();
        let changefreq = options.get_str("changefreq");
        if let Some(freq) = changefreq {
            if !CHANGEFREQS.contains(&freq) {
                bail!("invalid changefreq `{}`", freq);
            }
        }
        let ignores = compile_ignore_patterns(&options.get_string_list("ignore_patterns"));

        // route -> lastmod
        let mut routes: BTreeMap<String, Option<NaiveDate>> = BTreeMap::new();
        routes.insert(config.route(&[]), None);
        for page in input.site.pages.iter() {
            routes.insert(page.permalink.clone(), page.blog.as_ref().and_then(|m| m.date));
        }
        for route in input.site.navigation.category_routes() {
            routes.entry(route.to_string()).or_insert(None);
        }
        for route in blog::generated_routes(config, &input.site.pages.blog_posts()) {
            routes.entry(route).or_insert(None);
        }

        let mut urls = String::new();
        let mut count = 0;
        for (route, lastmod) in &routes {
            if should_ignore(route, &ignores) {
                tracing::debug!("Ignoring {} in sitemap", route);
                continue;
            }
            urls.push_str("<url>");
            urls.push_str(&format!("<loc>{}</loc>", escape_xml(&config.absolute_url(route))));
            if let Some(date) = lastmod {
                urls.push_str(&format!("<lastmod>{}</lastmod>", date.format("%Y-%m-%d")));
            }
            if let Some(freq) = changefreq {
                urls.push_str(&format!("<changefreq>{}</changefreq>", freq));
            }
            urls.push_str("</url>");
            count += 1;
        }

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
{}
</urlset>
"#,
            urls
        );

        tracing::info!("Generated sitemap.xml with {} URLs", count);
        Ok(vec![Artifact::new("sitemap.xml", xml)])
    }
}

fn compile_ignore_patterns(patterns: &[String]) -> Vec<Regex> {
    let mut compiled = Vec::new();
    for pat in patterns {
        match Regex::new(pat) {
            Ok(re) => compiled.push(re),
            Err(err) => tracing::warn!("Invalid ignore pattern '{}': {}", pat, err),
        }
    }
    compiled
}

fn should_ignore(route: &str, ignores: &[Regex]) -> bool {
    ignores.iter().any(|re| re.is_match(route))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_patterns() {
        let ignores = compile_ignore_patterns(&["^/blog/tags".to_string(), "([".to_string()]);
        assert_eq!(ignores.len(), 1);
        assert!(should_ignore("/blog/tags/release", &ignores));
        assert!(!should_ignore("/docs/intro", &ignores));
    }
}
