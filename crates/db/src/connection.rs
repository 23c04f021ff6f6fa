use crewdeck_config::Settings;
use mongodb::{Client, Database, options::ClientOptions};
use tracing::info;

pub async fn connect(settings: &Settings) -> Result<Database, mongodb::error::Error> {
    let mut options = ClientOptions::parse(&settings.database.url).await?;
    options.app_name = Some("crewdeck".to_string());
    options.max_pool_size = settings.database.max_pool_size;
    options.min_pool_size = settings.database.min_pool_size;

    let client = Client::with_options(options)?;

    // Fail at startup on an unreachable deployment
    client
        .database("admin")
        .run_command(bson::doc! { "ping": 1 })
        .await?;

    info!(db = %settings.database.name, "Connected to MongoDB");

    Ok(client.database(&settings.database.name))
}
