use dubmix_api::setup;
use dubmix_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (database, storage, pipeline, routes)
    let setup::Application {
        state,
        router,
        recording_listener,
        compensation_task,
    } = setup::initialize_app(&config).await?;

    // Start the server
    setup::server::start_server(&config, router).await?;

    if let Some(listener) = recording_listener {
        listener.shutdown().await;
    }

    // Last pipeline handle: the compensation queue closes once it is gone.
    drop(state);
    setup::drain_compensation(compensation_task).await;

    Ok(())
}
