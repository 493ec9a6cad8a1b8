use crate::application::error::{ErrorReport, HttpError};
use crate::domain::entities::{CategoryRecord, PostWithRelations, SiteSettingsRecord};
use crate::util::timestamp::{self, SITE_OFFSET};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Posts shown in the strip below the featured post.
pub const CAROUSEL_LEN: usize = 4;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let content = ErrorPageView::not_found();
    let view = LayoutContext::new(chrome, content);
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

#[derive(Clone)]
pub struct NavigationView {
    pub entries: Vec<NavigationLinkView>,
}

#[derive(Clone)]
pub struct NavigationLinkView {
    pub label: String,
    pub href: String,
}

#[derive(Clone)]
pub struct BrandView {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct FooterView {
    pub copy: String,
}

#[derive(Clone)]
pub struct PageMetaView {
    pub title: String,
    pub description: String,
    pub canonical: String,
}

impl PageMetaView {
    pub fn with_canonical(self, canonical: String) -> Self {
        Self { canonical, ..self }
    }
}

#[derive(Clone)]
pub struct LayoutChrome {
    pub brand: BrandView,
    pub navigation: NavigationView,
    pub footer: FooterView,
    pub meta: PageMetaView,
}

impl LayoutChrome {
    /// Site-wide chrome; `base_url` has no trailing slash.
    pub fn from_settings(settings: &SiteSettingsRecord, base_url: &str) -> Self {
        let entries = vec![
            NavigationLinkView {
                label: "Home".to_string(),
                href: "/".to_string(),
            },
            NavigationLinkView {
                label: "Blog".to_string(),
                href: "/blog".to_string(),
            },
        ];

        Self {
            brand: BrandView {
                title: settings.site_name.clone(),
                href: "/".to_string(),
            },
            navigation: NavigationView { entries },
            footer: FooterView {
                copy: format!(
                    "© {} {}",
                    OffsetDateTime::now_utc().to_offset(SITE_OFFSET).year(),
                    settings.site_name
                ),
            },
            meta: PageMetaView {
                title: settings.site_name.clone(),
                description: settings.site_description.clone(),
                canonical: format!("{base_url}/"),
            },
        }
    }

    pub fn with_canonical(self, canonical: String) -> Self {
        Self {
            meta: self.meta.with_canonical(canonical),
            ..self
        }
    }

    pub fn with_title(self, title: &str) -> Self {
        let meta = PageMetaView {
            title: format!("{title} | {}", self.brand.title),
            ..self.meta
        };
        Self { meta, ..self }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub brand: BrandView,
    pub navigation: NavigationView,
    pub footer: FooterView,
    pub meta: PageMetaView,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            brand: chrome.brand,
            navigation: chrome.navigation,
            footer: chrome.footer,
            meta: chrome.meta,
            content,
        }
    }
}

#[derive(Clone)]
pub struct PostCard {
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub category: String,
    pub author: String,
    pub featured_image: Option<String>,
    pub iso_date: String,
    pub published: String,
}

impl PostCard {
    pub fn from_post(entry: &PostWithRelations) -> Self {
        let post = &entry.post;
        Self {
            slug: post.slug.clone(),
            title: post.title.clone(),
            excerpt: post.excerpt.clone().unwrap_or_default(),
            category: entry
                .category
                .as_ref()
                .map(|category| category.name.clone())
                .unwrap_or_else(|| "Uncategorized".to_string()),
            author: entry
                .author
                .as_ref()
                .map(|author| author.name.clone())
                .unwrap_or_else(|| "Anonymous".to_string()),
            featured_image: post.featured_image.clone(),
            iso_date: timestamp::format(post.created_at),
            published: display_date(post.created_at),
        }
    }
}

#[derive(Clone)]
pub struct CategoryFilterView {
    pub label: String,
    pub href: String,
    pub is_active: bool,
}

pub struct BlogPageContext {
    pub featured: Option<PostCard>,
    pub carousel: Vec<PostCard>,
    pub grid: Vec<PostCard>,
    pub categories: Vec<CategoryFilterView>,
    pub has_results: bool,
}

impl BlogPageContext {
    /// Newest post is featured; the next few fill the carousel and every
    /// other post lands in the grid.
    pub fn build(
        posts: &[PostWithRelations],
        categories: &[CategoryRecord],
        active: Option<Uuid>,
    ) -> Self {
        let cards: Vec<PostCard> = posts.iter().map(PostCard::from_post).collect();
        let mut filters = vec![CategoryFilterView {
            label: "All".to_string(),
            href: "/blog".to_string(),
            is_active: active.is_none(),
        }];
        filters.extend(categories.iter().map(|category| CategoryFilterView {
            label: category.name.clone(),
            href: format!("/blog?category={}", category.id),
            is_active: active == Some(category.id),
        }));

        let rest = cards.get(1..).unwrap_or_default();
        Self {
            featured: cards.first().cloned(),
            carousel: rest.iter().take(CAROUSEL_LEN).cloned().collect(),
            grid: rest.to_vec(),
            categories: filters,
            has_results: !cards.is_empty(),
        }
    }
}

#[derive(Template)]
#[template(path = "blog.html")]
pub struct BlogTemplate {
    pub view: LayoutContext<BlogPageContext>,
}

pub struct PostDetailContext {
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub category: String,
    pub category_href: Option<String>,
    pub author: String,
    pub featured_image: Option<String>,
    pub iso_date: String,
    pub published: String,
    pub paragraphs: Vec<String>,
}

impl PostDetailContext {
    pub fn from_post(entry: &PostWithRelations) -> Self {
        let card = PostCard::from_post(entry);
        Self {
            slug: card.slug,
            title: card.title,
            excerpt: card.excerpt,
            category: card.category,
            category_href: entry
                .category
                .as_ref()
                .map(|category| format!("/blog?category={}", category.id)),
            author: card.author,
            featured_image: card.featured_image,
            iso_date: card.iso_date,
            published: card.published,
            paragraphs: paragraphs(&entry.post.content),
        }
    }
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
    pub primary_action: Option<ErrorAction>,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page Not Found".to_string(),
            message: "The page you requested does not exist. Try returning to the homepage to continue exploring.".to_string(),
            primary_action: Some(ErrorAction::home()),
        }
    }
}

pub struct ErrorAction {
    pub href: String,
    pub label: String,
}

impl ErrorAction {
    pub fn home() -> Self {
        Self {
            href: "/".to_string(),
            label: "Back to home".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

/// `January 5, 2025` at the site offset.
pub fn display_date(instant: OffsetDateTime) -> String {
    let local = instant.to_offset(SITE_OFFSET);
    format!("{} {}, {}", local.month(), local.day(), local.year())
}

/// Split stored content on blank lines.
pub fn paragraphs(content: &str) -> Vec<String> {
    content
        .replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::entities::{CategoryRef, PostRecord};

    fn post(index: u8, category: Option<&CategoryRecord>) -> PostWithRelations {
        PostWithRelations {
            post: PostRecord {
                id: Uuid::new_v4(),
                title: format!("Post {index}"),
                slug: format!("post-{index}"),
                content: "First.\n\nSecond.".to_string(),
                excerpt: None,
                published: true,
                category_id: category.map(|c| c.id),
                author_id: None,
                featured_image: None,
                created_at: datetime!(2025-01-05 00:00 UTC),
                updated_at: datetime!(2025-01-05 00:00 UTC),
            },
            category: category.map(|c| CategoryRef {
                id: c.id,
                name: c.name.clone(),
            }),
            author: None,
        }
    }

    fn category(name: &str) -> CategoryRecord {
        CategoryRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn listing_splits_featured_carousel_and_grid() {
        let posts: Vec<_> = (0..7).map(|i| post(i, None)).collect();
        let context = BlogPageContext::build(&posts, &[], None);

        assert_eq!(context.featured.as_ref().map(|c| c.slug.as_str()), Some("post-0"));
        let carousel: Vec<_> = context.carousel.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(carousel, ["post-1", "post-2", "post-3", "post-4"]);
        assert_eq!(context.grid.len(), 6);
        assert!(context.has_results);
    }

    #[test]
    fn empty_listing_has_no_featured_post() {
        let context = BlogPageContext::build(&[], &[], None);
        assert!(context.featured.is_none());
        assert!(context.carousel.is_empty());
        assert!(context.grid.is_empty());
        assert!(!context.has_results);
    }

    #[test]
    fn active_category_is_marked() {
        let rust = category("Rust");
        let posts = vec![post(0, Some(&rust))];
        let context = BlogPageContext::build(&posts, std::slice::from_ref(&rust), Some(rust.id));

        assert!(!context.categories[0].is_active);
        assert!(context.categories[1].is_active);
        assert_eq!(context.categories[1].href, format!("/blog?category={}", rust.id));
        assert_eq!(context.featured.map(|c| c.category).as_deref(), Some("Rust"));
    }

    #[test]
    fn dates_render_at_site_offset() {
        assert_eq!(display_date(datetime!(2024-12-31 20:00 UTC)), "January 1, 2025");
    }

    #[test]
    fn content_splits_into_paragraphs() {
        assert_eq!(paragraphs("One\r\n\r\nTwo\n\n\n\nThree\n"), ["One", "Two", "Three"]);
    }

    #[test]
    fn empty_listing_renders_empty_state() {
        let settings = SiteSettingsRecord::default();
        let chrome = LayoutChrome::from_settings(&settings, "https://example.com");
        let view = LayoutContext::new(chrome, BlogPageContext::build(&[], &[], None));
        let html = BlogTemplate { view }.render().expect("render");
        assert!(html.contains("No posts found"));
    }

    #[test]
    fn post_page_escapes_content() {
        let mut entry = post(1, None);
        entry.post.content = "<script>alert(1)</script>".to_string();
        let settings = SiteSettingsRecord::default();
        let chrome = LayoutChrome::from_settings(&settings, "https://example.com");
        let view = LayoutContext::new(chrome, PostDetailContext::from_post(&entry));
        let html = PostTemplate { view }.render().expect("render");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }
}
