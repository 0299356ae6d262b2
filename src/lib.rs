pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

use std::path::Path;
use std::sync::Arc;

// Export API types
pub use api::handlers;
pub use api::routes;
pub use api::{AppServices, AppState};

pub use error::{ErrorKind, ProdhubError, ProdhubResult, StorageError, StoreError};

// Export logic types
pub use logic::{
    ArtifactResolver, ArtifactSource, BranchOperations, CredentialHasher, DeleteOutcome,
    BcryptHasher, IdGenerator, RepositoryOperations, UserOperations, WriteCoordinator,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{
    LocalObjectStore, MemoryContentStore, MemoryLedger, MemoryObjectStore, PostgresContentStore,
    PostgresLedger,
};

use crate::config::{AppConfig, Backend};
use crate::store::traits::{CounterStore, MembershipLedger, ObjectStore, RepositoryStore};

/// Wires the store capabilities into the services the handlers use
pub fn build_services(
    repos: Arc<dyn RepositoryStore>,
    counters: Arc<dyn CounterStore>,
    ledger: Arc<dyn MembershipLedger>,
    objects: Arc<dyn ObjectStore>,
    hasher: Arc<dyn CredentialHasher>,
) -> AppServices {
    let coordinator = WriteCoordinator::new(
        repos.clone(),
        ledger.clone(),
        IdGenerator::new(counters),
        ArtifactResolver::new(objects),
    );
    AppServices {
        coordinator,
        repositories: RepositoryOperations::new(repos.clone()),
        users: UserOperations::new(ledger, repos, hasher),
    }
}

/// Services backed entirely by in-process stores, hashing passwords at the
/// lowest bcrypt cost
pub fn memory_services(public_base_url: &str) -> AppServices {
    let content = Arc::new(MemoryContentStore::new());
    build_services(
        content.clone(),
        content,
        Arc::new(MemoryLedger::new()),
        Arc::new(MemoryObjectStore::new(public_base_url)),
        Arc::new(BcryptHasher::new(4)),
    )
}

/// Connects the configured backend, running migrations for Postgres
pub async fn connect_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let objects = Arc::new(LocalObjectStore::new(
        &config.storage.root_dir,
        config.storage.public_base_url.clone(),
    ));
    let hasher = Arc::new(BcryptHasher::new(config.security.password_cost));

    match config.backend()? {
        Backend::Memory => {
            log::warn!("Using in-memory stores; only uploaded files survive a restart");
            let content = Arc::new(MemoryContentStore::new());
            Ok(build_services(
                content.clone(),
                content,
                Arc::new(MemoryLedger::new()),
                objects,
                hasher,
            ))
        }
        Backend::Postgres => {
            let timeout = config.store_call_timeout();

            log::info!("Connecting to content store...");
            let content = PostgresContentStore::connect(
                &config.content_database_url()?,
                config.content_store.max_connections(),
                timeout,
            )
            .await?;
            content.migrate().await?;

            log::info!("Connecting to membership ledger...");
            let ledger = PostgresLedger::connect(
                &config.ledger_database_url()?,
                config.ledger.max_connections(),
                timeout,
            )
            .await?;
            ledger.migrate().await?;

            let content = Arc::new(content);
            Ok(build_services(
                content.clone(),
                content,
                Arc::new(ledger),
                objects,
                hasher,
            ))
        }
    }
}

/// Router with state attached, ready to serve. `files_dir`, when given,
/// is served at `/files`.
pub fn app(services: AppServices, max_body_bytes: usize, files_dir: Option<&Path>) -> axum::Router {
    api::create_router(max_body_bytes, files_dir).with_state(Arc::new(services))
}

/// Loads configuration and serves until the listener fails
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    let services = connect_services(&config).await?;
    let app = app(
        services,
        config.storage.max_upload_bytes,
        Some(Path::new(&config.storage.root_dir)),
    );

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("ProdHub server running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
