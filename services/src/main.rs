use inventory_services::{
    config::Config,
    database::{self, PgStorage},
    routes,
    state::Integrations,
    telemetry,
    users::storage::PgUserStorage,
};
use inventory_utils::version_info::{build_commit, build_date, build_version};
use std::net::{IpAddr, SocketAddr};
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; deployed environments set real variables.
    let _ = dotenvy::dotenv();

    let config: Config = Config::init()?;
    telemetry::init_tracing(&config)?;
    print_build_info();
    info!(
        environment = %config.environment(),
        server_addr = %config.server_addr(),
        port = %config.port(),
        "Configuration loaded"
    );

    let pool = database::create_pool(&config).await?;
    if config.run_migrations() {
        database::run_migrations(&pool).await?;
        info!("Migrations applied");
    }

    let sql_storage = PgStorage::new(pool);
    let user_storage = PgUserStorage::new(sql_storage.clone());
    let integrations = Integrations::from_config(&config)?;

    let route = routes(sql_storage, user_storage, integrations, config.clone()).await;

    let addr = SocketAddr::from((config.server_addr().parse::<IpAddr>()?, config.port()));
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, route).await?;

    Ok(())
}

fn print_build_info() {
    info!(
        version = build_version(),
        build_date = build_date(),
        build_commit = build_commit(),
        "Inventory Services"
    );
}
