use dotenvy::dotenv;
use shared_charge::{
    config::{database, settings},
    core::{record, shift::Clock, user},
    errors::Result,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the deployment configuration
    let config = settings::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    let clock = config.settings.clock()?;
    info!(
        "Configuration loaded: {} users, default unit price {}, recent records limit {}, local date {}",
        config.users.len(),
        config.settings.default_unit_price,
        config.settings.recent_records_limit,
        clock.today()
    );

    // 4. Connect and make sure the schema exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Seed the user roster
    user::seed_users(&db, &config)
        .await
        .inspect_err(|e| error!("Failed to seed users: {}", e))?;

    let users = user::list_users(&db).await?;
    info!(
        "Ready: {} users registered, {} completion drifts recorded",
        users.len(),
        record::completion_drift_count()
    );

    Ok(())
}
