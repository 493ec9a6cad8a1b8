use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        CreatePostParams, IndexablePostsFilter, PostsRepo, PostsWriteRepo, RepoError,
        UpdatePostParams,
    },
    domain::entities::{AuthorRef, CategoryRef, PostRecord, PostWithRelations, RecentPost},
};

use super::{PostgresRepositories, map_sqlx_error, util::convert_count};

const POST_COLUMNS: &str = "p.id, p.title, p.slug, p.content, p.excerpt, p.published, \
    p.category_id, p.author_id, p.featured_image, p.created_at, p.updated_at";

const RELATION_COLUMNS: &str =
    "c.name AS category_name, u.name AS author_name, u.email AS author_email";

const RELATION_JOINS: &str = " FROM posts p \
    LEFT JOIN categories c ON c.id = p.category_id \
    LEFT JOIN users u ON u.id = p.author_id";

const RETURNING_POST: &str = " RETURNING id, title, slug, content, excerpt, published, \
    category_id, author_id, featured_image, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    title: String,
    slug: String,
    content: String,
    excerpt: Option<String>,
    published: bool,
    category_id: Option<Uuid>,
    author_id: Option<Uuid>,
    featured_image: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            slug: row.slug,
            content: row.content,
            excerpt: row.excerpt,
            published: row.published,
            category_id: row.category_id,
            author_id: row.author_id,
            featured_image: row.featured_image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PostWithRelationsRow {
    #[sqlx(flatten)]
    post: PostRow,
    category_name: Option<String>,
    author_name: Option<String>,
    author_email: Option<String>,
}

impl From<PostWithRelationsRow> for PostWithRelations {
    fn from(row: PostWithRelationsRow) -> Self {
        let category = row
            .post
            .category_id
            .zip(row.category_name)
            .map(|(id, name)| CategoryRef { id, name });
        let author = match (row.post.author_id, row.author_name, row.author_email) {
            (Some(id), Some(name), Some(email)) => Some(AuthorRef { id, name, email }),
            _ => None,
        };
        Self {
            post: row.post.into(),
            category,
            author,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RecentPostRow {
    id: Uuid,
    title: String,
    slug: String,
    published: bool,
    created_at: OffsetDateTime,
}

impl PostgresRepositories {
    fn relations_query<'q>() -> QueryBuilder<'q, Postgres> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(POST_COLUMNS);
        qb.push(", ");
        qb.push(RELATION_COLUMNS);
        qb.push(RELATION_JOINS);
        qb
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_posts(&self) -> Result<Vec<PostWithRelations>, RepoError> {
        let pool = self.pool().await?;
        let mut qb = Self::relations_query();
        qb.push(" ORDER BY p.created_at DESC, p.id DESC");

        let rows = qb
            .build_query_as::<PostWithRelationsRow>()
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PostWithRelations::from).collect())
    }

    async fn list_published(
        &self,
        category: Option<Uuid>,
    ) -> Result<Vec<PostWithRelations>, RepoError> {
        let pool = self.pool().await?;
        let mut qb = Self::relations_query();
        qb.push(" WHERE p.published = TRUE");
        if let Some(category) = category {
            qb.push(" AND p.category_id = ");
            qb.push_bind(category);
        }
        qb.push(" ORDER BY p.created_at DESC, p.id DESC");

        let rows = qb
            .build_query_as::<PostWithRelationsRow>()
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PostWithRelations::from).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(&pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(PostRecord::from))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts p WHERE p.slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(PostRecord::from))
    }

    async fn find_published_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<PostWithRelations>, RepoError> {
        let pool = self.pool().await?;
        let mut qb = Self::relations_query();
        qb.push(" WHERE p.published = TRUE AND p.slug = ");
        qb.push_bind(slug);

        let row = qb
            .build_query_as::<PostWithRelationsRow>()
            .fetch_optional(&pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(PostWithRelations::from))
    }

    async fn list_indexable(
        &self,
        filter: &IndexablePostsFilter,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let pool = self.pool().await?;
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT ");
        qb.push(POST_COLUMNS);
        qb.push(" FROM posts p WHERE p.published = TRUE");
        if let Some(since) = filter.updated_since {
            qb.push(" AND p.updated_at >= ");
            qb.push_bind(since);
        }
        qb.push(" ORDER BY p.updated_at DESC, p.id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(limit));
        }

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn category_ids_for(&self, ids: &[Uuid]) -> Result<Vec<Uuid>, RepoError> {
        let pool = self.pool().await?;
        sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT category_id FROM posts \
             WHERE id = ANY($1) AND category_id IS NOT NULL",
        )
        .bind(ids)
        .fetch_all(&pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn count_posts(&self, published: Option<bool>) -> Result<u64, RepoError> {
        let pool = self.pool().await?;
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM posts WHERE ($1::BOOLEAN IS NULL OR published = $1)",
        )
        .bind(published)
        .fetch_one(&pool)
        .await
        .map_err(map_sqlx_error)?;
        convert_count(count)
    }

    async fn recent_posts(&self, limit: u32) -> Result<Vec<RecentPost>, RepoError> {
        let pool = self.pool().await?;
        let rows = sqlx::query_as::<_, RecentPostRow>(
            "SELECT id, title, slug, published, created_at FROM posts \
             ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| RecentPost {
                id: row.id,
                title: row.title,
                slug: row.slug,
                published: row.published,
                created_at: row.created_at,
            })
            .collect())
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let CreatePostParams {
            title,
            slug,
            content,
            excerpt,
            published,
            category_id,
            author_id,
            featured_image,
        } = params;

        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "INSERT INTO posts (title, slug, content, excerpt, published, category_id, \
             author_id, featured_image) VALUES ($1, $2, $3, $4, $5, $6, $7, $8){RETURNING_POST}"
        ))
        .bind(title)
        .bind(slug)
        .bind(content)
        .bind(excerpt)
        .bind(published)
        .bind(category_id)
        .bind(author_id)
        .bind(featured_image)
        .fetch_one(&pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let UpdatePostParams {
            id,
            title,
            slug,
            content,
            excerpt,
            published,
            category_id,
            author_id,
            featured_image,
        } = params;

        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "UPDATE posts SET title = $2, slug = $3, content = $4, excerpt = $5, \
             published = $6, category_id = $7, author_id = $8, featured_image = $9, \
             updated_at = now() WHERE id = $1{RETURNING_POST}"
        ))
        .bind(id)
        .bind(title)
        .bind(slug)
        .bind(content)
        .bind(excerpt)
        .bind(published)
        .bind(category_id)
        .bind(author_id)
        .bind(featured_image)
        .fetch_optional(&pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_post(&self, id: Uuid) -> Result<PostRecord, RepoError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "DELETE FROM posts WHERE id = $1{RETURNING_POST}"
        ))
        .bind(id)
        .fetch_optional(&pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }

    async fn set_published(&self, id: Uuid, published: bool) -> Result<PostRecord, RepoError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "UPDATE posts SET published = $2, updated_at = now() WHERE id = $1{RETURNING_POST}"
        ))
        .bind(id)
        .bind(published)
        .fetch_optional(&pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }

    async fn touch_post_dates(&self, ids: &[Uuid], at: OffsetDateTime) -> Result<u64, RepoError> {
        let pool = self.pool().await?;
        let result =
            sqlx::query("UPDATE posts SET created_at = $2, updated_at = $2 WHERE id = ANY($1)")
                .bind(ids)
                .bind(at)
                .execute(&pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
