use std::{net::TcpListener, sync::Arc, time::Duration};

use anyhow::Context;
use roastbot::{
    configuration::get_configuration,
    services::{
        BrowserbaseClient, LocalArtifactStore, OpenaiClient, Pipeline, Roaster, RunManager,
        WebDriverConnector,
    },
    startup::run,
    telemetry::init_logger,
};
use tokio::runtime::Handle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = get_configuration().context("Failed to read configuration.")?;
    init_logger(configuration.application.json_logs);

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tokio::fs::create_dir_all(&configuration.storage.root)
        .await
        .context("Failed to create artifact directory.")?;

    let sessions = BrowserbaseClient::new(configuration.browserbase.clone())?;
    let model = OpenaiClient::new(configuration.llm.clone());
    let pipeline = Pipeline {
        sessions: Arc::new(sessions),
        connector: Arc::new(WebDriverConnector::new(configuration.browser.clone())),
        roaster: Roaster::new(Arc::new(model), configuration.roast.clone()),
        storage: Arc::new(LocalArtifactStore::new(configuration.storage.clone())),
        directory: configuration.directory.clone(),
        timeouts: configuration.browser.timeouts(),
    };
    let run_manager = RunManager::new(pipeline, Handle::current());

    log::info!("Listening on {}", address);
    run(
        listener,
        run_manager.clone(),
        configuration.application.clone(),
        configuration.storage.root.clone(),
    )?
    .await?;

    let grace = Duration::from_secs(configuration.application.shutdown_grace_secs);
    if tokio::time::timeout(grace, run_manager.shutdown())
        .await
        .is_err()
    {
        log::warn!("Runs still in flight after {:?}, exiting anyway", grace);
    }

    Ok(())
}
