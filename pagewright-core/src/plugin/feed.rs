//! `blog-feed`: RSS 2.0 and Atom feeds for the blog.

use super::{escape_xml, HookPhase, Plugin, PostProcessInput};
use crate::artifacts::Artifact;
use crate::config::{OptionKind, OptionSchema, PluginOptions};
use crate::models::PageRecord;
use anyhow::bail;
use chrono::NaiveDate;

pub const NAME: &str = "blog-feed";

#[derive(Debug, Default)]
pub struct BlogFeedPlugin;

impl BlogFeedPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for BlogFeedPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn hooks(&self) -> &[HookPhase] {
        &[HookPhase::PostProcess]
    }

    fn options_schema(&self) -> OptionSchema {
        OptionSchema::new()
            .with_default("types", OptionKind::StringList, vec!["rss", "atom"])
            .with_default("limit", OptionKind::Integer, 20u64)
            .field("title", OptionKind::String)
            .field("description", OptionKind::String)
    }

    fn post_process(&self, input: &PostProcessInput, options: &PluginOptions) -> anyhow::Result<Vec<Artifact>> {
        let config = input.config.as_ref();
        let Some(blog) = &config.blog else {
            tracing::debug!("Blog is disabled, no feeds generated");
            return Ok(Vec::new());
        };

        let limit = options.get_u64("limit").unwrap_or(20) as usize;
        let posts: Vec<&PageRecord> = input
            .site
            .pages
            .blog_posts()
            .into_iter()
            .take(limit)
            .collect();

        let feed = Feed {
            title: options
                .get_str("title")
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} Blog", config.site.title)),
            description: options
                .get_str("description")
                .map(str::to_string)
                .or_else(|| config.site.tagline.clone())
                .unwrap_or_else(|| format!("{} Blog", config.site.title)),
            link: config.absolute_url(&config.route(&[blog.route_base.as_str()])),
            items: posts
                .iter()
                .map(|post| FeedItem {
                    title: post.title.clone(),
                    link: config.absolute_url(&post.permalink),
                    summary: post
                        .blog
                        .as_ref()
                        .map(|m| m.summary.clone())
                        .unwrap_or_default(),
                    date: post.blog.as_ref().and_then(|m| m.date),
                    authors: post
                        .blog
                        .as_ref()
                        .map(|m| m.authors.iter().map(|a| a.name.clone()).collect())
                        .unwrap_or_default(),
                })
                .collect(),
        };

        let mut artifacts = Vec::new();
        for kind in options.get_string_list("types") {
            match kind.as_str() {
                "rss" => artifacts.push(Artifact::new(
                    format!("{}/rss.xml", blog.route_base.trim_matches('/')),
                    feed.rss(),
                )),
                "atom" => artifacts.push(Artifact::new(
                    format!("{}/atom.xml", blog.route_base.trim_matches('/')),
                    feed.atom(),
                )),
                other => bail!("unknown feed type `{}` (expected `rss` or `atom`)", other),
            }
        }
        tracing::info!("Generated {} blog feed(s) with {} posts", artifacts.len(), posts.len());
        Ok(artifacts)
    }
}

struct FeedItem {
    title: String,
    link: String,
    summary: String,
    date: Option<NaiveDate>,
    authors: Vec<String>,
}

struct Feed {
    title: String,
    description: String,
    link: String,
    items: Vec<FeedItem>,
}

impl Feed {
    fn rss(&self) -> String {
        let mut items = String::new();
        for item in &self.items {
            items.push_str(&format!(
                "<item><title>{}</title><link>{}</link><guid>{}</guid><description>{}</description>",
                escape_xml(&item.title),
                item.link,
                item.link,
                escape_xml(&item.summary)
            ));
            if let Some(pd) = item.date.and_then(|d| naive_to_rfc2822(&d)) {
                items.push_str(&format!("<pubDate>{}</pubDate>", pd));
            }
            for author in &item.authors {
                items.push_str(&format!("<dc:creator>{}</dc:creator>", escape_xml(author)));
            }
            items.push_str("</item>");
        }

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>{}</title>
    <link>{}</link>
    <description>{}</description>
    {}
  </channel>
</rss>
"#,
            escape_xml(&self.title),
            self.link,
            escape_xml(&self.description),
            items
        )
    }

    fn atom(&self) -> String {
        // Newest post date keeps the output reproducible.
        let updated = self
            .items
            .iter()
            .filter_map(|item| item.date)
            .max()
            .map(|d| naive_to_rfc3339(&d))
            .unwrap_or_else(|| "1970-01-01T00:00:00+00:00".to_string());

        let mut entries = String::new();
        for item in &self.items {
            entries.push_str(&format!(
                "<entry><title>{}</title><id>{}</id><link href=\"{}\"/>",
                escape_xml(&item.title),
                item.link,
                item.link
            ));
            if let Some(date) = item.date {
                entries.push_str(&format!("<updated>{}</updated>", naive_to_rfc3339(&date)));
            }
            for author in &item.authors {
                entries.push_str(&format!("<author><name>{}</name></author>", escape_xml(author)));
            }
            entries.push_str(&format!("<summary>{}</summary></entry>", escape_xml(&item.summary)));
        }

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>{}</id>
  <title>{}</title>
  <updated>{}</updated>
  <link href="{}"/>
  <subtitle>{}</subtitle>
  {}
</feed>
"#,
            self.link,
            escape_xml(&self.title),
            updated,
            self.link,
            escape_xml(&self.description),
            entries
        )
    }
}

fn naive_to_rfc2822(date: &NaiveDate) -> Option<String> {
    let datetime = date.and_hms_opt(0, 0, 0)?;
    Some(datetime.and_utc().to_rfc2822())
}

fn naive_to_rfc3339(date: &NaiveDate) -> String {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().to_rfc3339())
        .unwrap_or_default()
}
