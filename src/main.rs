use std::{process, sync::Arc};

use scrigno::{
    application::content::ContentService,
    config,
    infra::{
        attachments::AttachmentStore,
        cache::ResponseCache,
        http::{HttpState, build_router},
        index::SearchIndexManager,
        store::{ContentRegistry, ContentStore},
        telemetry,
    },
};
use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[derive(Debug, Error)]
enum StartupError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::LoadError),
    #[error(transparent)]
    Telemetry(#[from] scrigno::infra::telemetry::TelemetryError),
    #[error("failed to open content store: {0}")]
    Store(#[from] scrigno::infra::store::StoreError),
    #[error("failed to initialize search indexes: {0}")]
    Index(#[from] scrigno::infra::index::IndexError),
    #[error("failed to rebuild search indexes: {0}")]
    Rebuild(#[from] scrigno::application::error::ServiceError),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_startup_error(&error);
        process::exit(1);
    }
}

fn report_startup_error(error: &StartupError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "startup error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "startup error");
    });
}

async fn run() -> Result<(), StartupError> {
    let (_cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let registry = ContentRegistry::new(
        settings.content.types.clone(),
        settings.content.languages.clone(),
    );
    let store = ContentStore::open(&settings.store.path, registry.clone())?;
    let index = SearchIndexManager::new(&registry)?;
    let cache = ResponseCache::new(settings.cache.ttl);
    let attachments = Arc::new(AttachmentStore::new(settings.attachments.directory.clone())?);

    let service = Arc::new(ContentService::new(
        store,
        index,
        cache.clone(),
        Arc::clone(&attachments),
    ));

    // Indexes live in RAM only; traffic starts after they reflect the store.
    service.rebuild_index()?;
    info!(
        types = settings.content.types.len(),
        languages = settings.content.languages.len(),
        "search indexes rebuilt"
    );

    let purge_handle = cache.spawn_purge(settings.cache.purge_interval);

    let router = build_router(HttpState {
        service,
        attachments,
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr).await?;
    info!(addr = %settings.server.addr, "listening");
    let result = axum::serve(listener, router.into_make_service()).await;

    purge_handle.abort();
    result?;
    Ok(())
}
