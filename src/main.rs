use std::{process, sync::Arc};

use inkpost::{
    application::{
        admin::{
            categories::AdminCategoryService,
            posts::AdminPostService,
            settings::AdminSettingsService,
            users::{AdminUserError, AdminUserService, SetupAdminCommand, SetupAdminOutcome},
        },
        blog::BlogService,
        dashboard::DashboardService,
        error::AppError,
        indexing::{IndexingClient, IndexingService, NotificationType},
        repos::{
            CategoriesRepo, HealthRepo, IndexablePostsFilter, PostsRepo, PostsWriteRepo,
            RolesRepo, SettingsRepo, UsersRepo,
        },
        sitemap::SitemapService,
    },
    cache::{CacheConfig, CacheState, InvalidationCoordinator, ResponseStore, TaggedCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, HttpState},
        indexing::GoogleIndexingClient,
        telemetry,
    },
};
use time::{
    Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};
use tokio::try_join;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::SeedRoles(_) => run_seed_roles(settings).await,
        config::Command::SetupAdmin(args) => run_setup_admin(settings, args).await,
        config::Command::SubmitIndexing(args) => run_submit_indexing(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;
    serve_http(&settings, app.http_state, app.admin_state).await
}

async fn run_seed_roles(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let users = user_service(&repositories, InvalidationCoordinator::default());

    let roles = users.seed_roles().await.map_err(user_error)?;
    info!(target: "inkpost::admin", roles = roles.len(), "roles seeded");
    Ok(())
}

async fn run_setup_admin(
    settings: config::Settings,
    args: config::SetupAdminArgs,
) -> Result<(), AppError> {
    let email = required_arg(args.email, "--email or ADMIN_EMAIL")?;
    let password = required_arg(args.password, "--password or ADMIN_PASSWORD")?;
    let name = args
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "Administrator".to_string());

    let repositories = init_repositories(&settings).await?;
    let users = user_service(&repositories, InvalidationCoordinator::default());

    let outcome = users
        .setup_admin(SetupAdminCommand {
            email: email.clone(),
            name,
            password,
            update_password: args.update_password,
        })
        .await
        .map_err(user_error)?;

    match outcome {
        SetupAdminOutcome::Created => {
            info!(target: "inkpost::admin", email = %email, "administrator created")
        }
        SetupAdminOutcome::Updated => {
            info!(target: "inkpost::admin", email = %email, "administrator updated")
        }
        SetupAdminOutcome::Unchanged => info!(
            target: "inkpost::admin",
            email = %email,
            "administrator already exists; pass --update-password to reset it"
        ),
    }
    Ok(())
}

async fn run_submit_indexing(
    settings: config::Settings,
    args: config::SubmitIndexingArgs,
) -> Result<(), AppError> {
    let filter = IndexablePostsFilter {
        updated_since: args
            .updated_since
            .as_deref()
            .map(parse_updated_since)
            .transpose()?,
        limit: args.limit,
    };

    let repositories = init_repositories(&settings).await?;
    let indexing = indexing_service(&settings)?;
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();

    let posts = posts_repo.list_indexable(&filter).await?;
    let urls: Vec<String> = posts
        .iter()
        .map(|post| indexing.post_url(&post.slug))
        .collect();

    info!(
        target: "inkpost::indexing",
        candidates = urls.len(),
        dry_run = args.dry_run,
        "collected published posts for indexing"
    );

    if args.dry_run {
        for url in &urls {
            info!(target: "inkpost::indexing", url = %url, "would submit");
        }
        return Ok(());
    }

    if !indexing.is_configured() {
        return Err(AppError::from(InfraError::configuration(
            "indexing credentials are not configured (indexing.client_email / indexing.private_key)",
        )));
    }

    let submitted = indexing
        .submit_batch(&urls, NotificationType::UrlUpdated)
        .await;
    let skipped = urls.len() - submitted;
    if skipped > 0 {
        warn!(
            target: "inkpost::indexing",
            submitted,
            skipped,
            "some URLs were not accepted for indexing"
        );
    }
    info!(
        target: "inkpost::indexing",
        submitted,
        total = urls.len(),
        "indexing submission finished"
    );
    Ok(())
}

fn user_error(err: AdminUserError) -> AppError {
    match err {
        AdminUserError::Validation(message) => AppError::validation(message),
        AdminUserError::Repo(err) => AppError::Repo(err),
        other => AppError::unexpected(other.to_string()),
    }
}

fn required_arg(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::validation(format!("{name} is required")))
}

/// RFC 3339 instant, or a bare `YYYY-MM-DD` read as midnight UTC.
fn parse_updated_since(raw: &str) -> Result<OffsetDateTime, AppError> {
    let raw = raw.trim();
    if let Ok(instant) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(instant);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| {
            AppError::validation(format!(
                "--updated-since `{raw}` is neither an RFC 3339 timestamp nor a YYYY-MM-DD date"
            ))
        })
}

struct ApplicationContext {
    http_state: HttpState,
    admin_state: AdminState,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    if settings.database.url.is_none() {
        return Err(AppError::from(InfraError::configuration(
            "database url is not configured",
        )));
    }

    let repositories = PostgresRepositories::from_settings(&settings.database);
    repositories.run_migrations().await?;
    Ok(Arc::new(repositories))
}

fn user_service(
    repositories: &Arc<PostgresRepositories>,
    invalidation: InvalidationCoordinator,
) -> AdminUserService {
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let roles_repo: Arc<dyn RolesRepo> = repositories.clone();
    AdminUserService::new(users_repo, roles_repo, invalidation)
}

fn indexing_service(settings: &config::Settings) -> Result<IndexingService, AppError> {
    let client = GoogleIndexingClient::from_settings(&settings.indexing)?
        .map(|client| Arc::new(client) as Arc<dyn IndexingClient>);
    if client.is_none() {
        info!(
            target: "inkpost::indexing",
            "indexing credentials not configured; submissions are disabled"
        );
    }
    Ok(IndexingService::new(
        client,
        settings.site.public_url.clone(),
        settings.indexing.submit_delay,
    ))
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let categories_repo: Arc<dyn CategoriesRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let settings_repo: Arc<dyn SettingsRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories.clone();

    let cache_config = CacheConfig::from(&settings.cache);
    let objects = Arc::new(TaggedCache::new(&cache_config));
    let responses = Arc::new(ResponseStore::new(&cache_config));

    let blog = Arc::new(BlogService::new(
        posts_repo.clone(),
        objects.clone(),
        cache_config.dedup_timeout,
    ));

    // In-flight reads are detached before the object cache drops its entries.
    let invalidation = InvalidationCoordinator::new(blog.invalidators())
        .with_backend(objects.clone())
        .with_backend(responses.clone());

    let indexing = Arc::new(indexing_service(settings)?);

    let categories = AdminCategoryService::new(
        categories_repo.clone(),
        objects.clone(),
        invalidation.clone(),
    );
    let site_settings =
        AdminSettingsService::new(settings_repo, objects.clone(), invalidation.clone());
    let users = Arc::new(user_service(&repositories, invalidation.clone()));
    let posts = Arc::new(AdminPostService::new(
        posts_repo.clone(),
        posts_write_repo,
        invalidation.clone(),
        indexing.as_ref().clone(),
    ));
    let dashboard = Arc::new(DashboardService::new(
        posts_repo.clone(),
        categories_repo,
        users_repo,
        objects,
    ));
    let sitemap = Arc::new(SitemapService::new(
        posts_repo,
        categories.clone(),
        site_settings.clone(),
        settings.site.public_url.clone(),
    ));

    let cache_state = cache_config.enable_response_cache.then(|| CacheState {
        config: cache_config.clone(),
        responses,
    });

    let categories = Arc::new(categories);
    let site_settings = Arc::new(site_settings);

    let http_state = HttpState {
        blog,
        categories: categories.clone(),
        settings: site_settings.clone(),
        users: users.clone(),
        sitemap,
        health: health_repo.clone(),
        public_url: Arc::from(settings.site.public_url.as_str()),
        cache: cache_state,
    };

    let admin_state = AdminState {
        health: health_repo,
        dashboard,
        posts,
        categories,
        users,
        settings: site_settings,
        indexing,
        invalidation,
    };

    Ok(ApplicationContext {
        http_state,
        admin_state,
    })
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listening"
    );

    let public_server = axum::serve(public_listener, public_router.into_make_service());
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service());

    try_join!(public_server, admin_server)
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
