use anyhow::Error;
use envconfig::Envconfig;
use identity_migrator::{config::Config, error::get_user_message, migrate};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer: tracing_subscriber::filter::Filtered<
        tracing_subscriber::fmt::Layer<tracing_subscriber::Registry>,
        EnvFilter,
        tracing_subscriber::Registry,
    > = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
pub async fn main() -> Result<(), Error> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_from_env()?;
    info!(
        "Unifying export {:?}, checkpoints in {:?}",
        config.export_dir, config.checkpoint_dir
    );

    match migrate::run(&config).await {
        Ok(report) => {
            info!(
                "Done: {} unified identities from {} processed and {} replayed accounts",
                report.unified, report.processed, report.replayed
            );
            Ok(())
        }
        Err(e) => {
            // Checkpoints already written stay valid, so re-running resumes from them
            error!("Migration failed: {:?}", e);
            error!("{}", get_user_message(&e));
            Err(e)
        }
    }
}
