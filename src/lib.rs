pub mod config;
pub mod observer;
pub mod server;

use std::{fs::read_to_string, sync::Arc};

use service::{
    Service, ServiceOptions,
    accounts::AccountStore,
    nas::{NasEntry, NasRegistry},
};

use self::{config::Config, observer::Observer};

/// In order to let the integration test directly use the
/// radius-server crate and start the server, a function is opened to
/// replace the main function to directly start the server.
pub async fn startup(config: Arc<Config>) -> anyhow::Result<()> {
    let accounts = Arc::new(AccountStore::default());
    if let Some(path) = &config.accounts.file {
        let count = accounts.load_from_text(&read_to_string(path)?);
        log::info!("accounts loaded: file={:?}, count={}", path, count);
    }

    let nas = NasRegistry::new(config.server.default_secret.clone());
    for device in &config.server.devices {
        nas.register(NasEntry::parse(device)?)?;
    }

    if nas.is_empty() && config.server.default_secret.is_none() {
        log::warn!("no devices configured and no default secret, every datagram will be dropped");
    }

    let service = Service::new(ServiceOptions {
        realm_format: config.server.realm_format,
        nas,
        handler: Observer::new(accounts),
    });

    let _server = server::start(&config, &service).await?;

    // The server is non-blocking once it runs; keep the process alive
    // until it is killed.
    std::future::pending::<()>().await;
    Ok(())
}
