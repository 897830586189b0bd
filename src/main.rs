mod config;
mod discovery;
mod extract;
mod model;
mod normalize;
mod scraper;
mod server;
mod upstream;

use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use config::{Command, Config};
use discovery::catalog::CatalogDiscovery;
use scraper::Scraper;
use upstream::UpstreamClient;

#[macro_use]
extern crate lazy_static;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // a builder for `FmtSubscriber`, honouring RUST_LOG
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    // parse the command line args, falling back to the environment
    let opt: Command = Command::from_args();
    let config = Config::from_command(opt)?;

    tracing::info!(
        "exporting {} as {}* ({:?})",
        config.api_base(),
        config.metric_prefix,
        config.security
    );

    let client = UpstreamClient::new(&config);
    let discovery = CatalogDiscovery::new(client.clone());
    let scraper = Scraper::new(discovery, client, &config);

    let app = server::router(scraper, config.labels.clone());
    server::serve(app, config.bind_port).await?;

    Ok(())
}
