//! Sitemap index, sub-sitemaps and robots.txt.
//!
//! Every public method returns a document: failures are logged and the
//! minimal fallback is served instead, so crawlers never see an error page.
//! Rendering is split into pure functions taking `now` for deterministic tests.

use std::sync::Arc;

use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::error;

use crate::application::admin::categories::{AdminCategoryError, AdminCategoryService};
use crate::application::admin::settings::{AdminSettingsError, AdminSettingsService};
use crate::application::repos::{IndexablePostsFilter, PostsRepo, RepoError};
use crate::cache::{
    deps,
    keys::{TAG_ALL_POSTS, TAG_POSTS},
};
use crate::domain::entities::{CategoryRecord, PostRecord, SiteSettingsRecord};
use crate::util::timestamp;

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

pub const POSTS_SITEMAP_PATH: &str = "/sitemap-posts.xml";
pub const CATEGORIES_SITEMAP_PATH: &str = "/sitemap-categories.xml";

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("failed to load settings: {0}")]
    Settings(#[from] AdminSettingsError),
    #[error("failed to list posts: {0}")]
    Posts(#[from] RepoError),
    #[error("failed to list categories: {0}")]
    Categories(#[from] AdminCategoryError),
}

#[derive(Clone)]
pub struct SitemapService {
    posts: Arc<dyn PostsRepo>,
    categories: AdminCategoryService,
    settings: AdminSettingsService,
    public_url: String,
}

impl SitemapService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        categories: AdminCategoryService,
        settings: AdminSettingsService,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            posts,
            categories,
            settings,
            public_url: public_url.into(),
        }
    }

    /// Settings override first, then the configured public URL.
    pub async fn base_url(&self) -> Result<String, SitemapError> {
        let settings = self.settings.load().await?;
        Ok(resolve_base_url(&settings, &self.public_url))
    }

    pub async fn sitemap_index(&self) -> String {
        let now = OffsetDateTime::now_utc();
        match self.base_url().await {
            Ok(base) => render_sitemap_index(&base, now),
            Err(err) => {
                error!(target: "inkpost::sitemap", error = %err, "sitemap index failed");
                render_fallback_index(&self.fallback_base(), now)
            }
        }
    }

    pub async fn posts_sitemap(&self) -> String {
        let now = OffsetDateTime::now_utc();
        match self.try_posts_sitemap(now).await {
            Ok(xml) => xml,
            Err(err) => {
                error!(target: "inkpost::sitemap", error = %err, "posts sitemap failed");
                render_posts_sitemap(&self.fallback_base(), &[], now)
            }
        }
    }

    pub async fn categories_sitemap(&self) -> String {
        let now = OffsetDateTime::now_utc();
        match self.try_categories_sitemap().await {
            Ok(xml) => xml,
            Err(err) => {
                error!(target: "inkpost::sitemap", error = %err, "categories sitemap failed");
                render_categories_sitemap(&self.fallback_base(), &[], now)
            }
        }
    }

    pub async fn robots_txt(&self) -> String {
        match self.settings.load().await {
            Ok(settings) => {
                let base = resolve_base_url(&settings, &self.public_url);
                render_robots(&settings, &base)
            }
            Err(err) => {
                error!(target: "inkpost::sitemap", error = %err, "robots.txt failed");
                render_robots(&SiteSettingsRecord::default(), &self.fallback_base())
            }
        }
    }

    async fn try_posts_sitemap(&self, now: OffsetDateTime) -> Result<String, SitemapError> {
        let base = self.base_url().await?;
        deps::record_all([TAG_POSTS, TAG_ALL_POSTS]);
        let posts = self
            .posts
            .list_indexable(&IndexablePostsFilter::default())
            .await?;
        Ok(render_posts_sitemap(&base, &posts, now))
    }

    async fn try_categories_sitemap(&self) -> Result<String, SitemapError> {
        let base = self.base_url().await?;
        let categories = self.categories.list().await?;
        Ok(render_categories_sitemap(
            &base,
            &categories,
            OffsetDateTime::now_utc(),
        ))
    }

    fn fallback_base(&self) -> String {
        self.public_url.trim_end_matches('/').to_string()
    }
}

pub fn resolve_base_url(settings: &SiteSettingsRecord, configured: &str) -> String {
    settings
        .site_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(configured)
        .trim_end_matches('/')
        .to_string()
}

/// Crawl hints derived from how long ago a page last changed.
pub fn recency(lastmod: OffsetDateTime, now: OffsetDateTime) -> (&'static str, &'static str) {
    let age = now - lastmod;
    if age <= Duration::days(7) {
        ("daily", "0.9")
    } else if age <= Duration::days(30) {
        ("weekly", "0.8")
    } else if age <= Duration::days(365) {
        ("monthly", "0.6")
    } else {
        ("yearly", "0.4")
    }
}

pub fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub fn render_sitemap_index(base: &str, now: OffsetDateTime) -> String {
    render_index(base, &[POSTS_SITEMAP_PATH, CATEGORIES_SITEMAP_PATH], now)
}

pub fn render_fallback_index(base: &str, now: OffsetDateTime) -> String {
    render_index(base, &[POSTS_SITEMAP_PATH], now)
}

fn render_index(base: &str, paths: &[&str], now: OffsetDateTime) -> String {
    let lastmod = timestamp::format(now);
    let mut xml = format!("{XML_HEADER}<sitemapindex xmlns=\"{SITEMAP_NS}\">\n");
    for path in paths {
        xml.push_str("  <sitemap>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&format!("{base}{path}"))));
        xml.push_str(&format!("    <lastmod>{lastmod}</lastmod>\n"));
        xml.push_str("  </sitemap>\n");
    }
    xml.push_str("</sitemapindex>\n");
    xml
}

/// Home and `/blog` followed by every post in `posts`.
pub fn render_posts_sitemap(base: &str, posts: &[PostRecord], now: OffsetDateTime) -> String {
    let stamp = timestamp::format(now);
    let mut xml = format!("{XML_HEADER}<urlset xmlns=\"{SITEMAP_NS}\">\n");
    push_url(&mut xml, base, &stamp, "daily", "1.0");
    push_url(&mut xml, &format!("{base}/blog"), &stamp, "daily", "0.9");

    for post in posts {
        let lastmod = post.last_modified();
        let (changefreq, priority) = recency(lastmod, now);
        push_url(
            &mut xml,
            &format!("{base}/blog/{}", post.slug),
            &timestamp::format(lastmod),
            changefreq,
            priority,
        );
    }

    xml.push_str("</urlset>\n");
    xml
}

pub fn render_categories_sitemap(
    base: &str,
    categories: &[CategoryRecord],
    now: OffsetDateTime,
) -> String {
    let mut xml = format!("{XML_HEADER}<urlset xmlns=\"{SITEMAP_NS}\">\n");
    for category in categories {
        let lastmod = category.updated_at.max(category.created_at).min(now);
        push_url(
            &mut xml,
            &format!("{base}/blog?category={}", category.id),
            &timestamp::format(lastmod),
            "weekly",
            "0.5",
        );
    }
    xml.push_str("</urlset>\n");
    xml
}

fn push_url(xml: &mut String, loc: &str, lastmod: &str, changefreq: &str, priority: &str) {
    xml.push_str("  <url>\n");
    xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(loc)));
    xml.push_str(&format!("    <lastmod>{lastmod}</lastmod>\n"));
    xml.push_str(&format!("    <changefreq>{changefreq}</changefreq>\n"));
    xml.push_str(&format!("    <priority>{priority}</priority>\n"));
    xml.push_str("  </url>\n");
}

pub fn render_robots(settings: &SiteSettingsRecord, base: &str) -> String {
    let mut body = String::from("User-agent: *\nAllow: /\nDisallow: /dashboard/\nDisallow: /api/\n");

    let mut directives = Vec::new();
    if !settings.robots_index {
        directives.push("noindex");
    }
    if !settings.robots_follow {
        directives.push("nofollow");
    }

    // Directives and crawl delay share one block after a blank line.
    let mut extra = Vec::new();
    if !directives.is_empty() {
        extra.push(directives.join(", "));
    }
    if settings.revisit_after_days > 1 {
        extra.push(format!("Crawl-delay: {}", settings.revisit_after_days));
    }
    if !extra.is_empty() {
        body.push('\n');
        for line in extra {
            body.push_str(&line);
            body.push('\n');
        }
    }

    body.push_str(&format!("\nSitemap: {base}/sitemap.xml\n"));
    body
}
