use block_etl_server::{run, Settings};
use blockscout_service_launcher::launcher::ConfigSettings;

const SERVICE_NAME: &str = "block_etl";

fn log_error(err: anyhow::Error) -> anyhow::Error {
    tracing::error!(error = ?err, "service failed");
    err
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let settings = Settings::build().map_err(log_error)?;
    blockscout_service_launcher::tracing::init_logs(
        SERVICE_NAME,
        &settings.tracing,
        &settings.jaeger,
    )?;
    run(settings).await.map_err(log_error)
}
