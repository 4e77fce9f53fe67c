use std::sync::Arc;

use anyhow::{Context, Error};
use envconfig::Envconfig;
use registration_import::{
    config::Config,
    context::AppContext,
    error::get_user_message,
    preview::preview_rows,
    progress::LogProgressSink,
    upload::load_from_config,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn run(config: Config) -> Result<(), Error> {
    let request = load_from_config(&config).await?;
    info!(
        upload_id = %request.upload_id,
        event_id = %request.event_id,
        flow = %request.flow,
        rows = request.rows.len(),
        "Loaded upload"
    );

    if config.preview_only {
        let summary = preview_rows(&request, &config.pipeline_options())
            .context("Previewing upload")?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let context = AppContext::new(&config).await?;
    context.spawn_shutdown_listener();

    let sink = Arc::new(LogProgressSink {
        upload_id: request.upload_id.clone(),
        every: config.progress_log_every,
    });
    let pipeline = context.pipeline(sink);

    // The pipeline itself is a plain future; running it in the background is ours to do
    let handle = tokio::spawn(async move { pipeline.run(request).await });
    let result = handle
        .await
        .context("Import task panicked")?
        .context("Running import")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[tokio::main]
pub async fn main() -> Result<(), Error> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_from_env().context("Loading config from environment")?;

    if let Err(e) = run(config).await {
        error!("Import failed: {:?}", e);
        eprintln!("{}", get_user_message(&e));
        return Err(e);
    }

    info!("Shutting down");
    Ok(())
}
