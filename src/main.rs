use pressroom::{
    configuration::get_configuration,
    startup::Application,
    telemetry::{get_subscriber, init_subscriber},
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber("pressroom".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber)?;

    let config = get_configuration()?;
    let application = Application::build(config).await?;

    let shutdown = application.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutting down"),
            Err(e) => tracing::error!(error.cause_chain = ?e, "Failed to listen for the shutdown signal"),
        }
        shutdown.cancel();
    });

    application.run_until_stopped().await?;
    Ok(())
}
