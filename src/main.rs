use anyhow::Result;
use std::{env, process};
use tcpproxy::{Config, ConfigError, Proxy, USAGE};
use tracing::info;

// Sessions are strictly sequential, so a single-threaded runtime is all we need.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = match Config::from_args(env::args().skip(1)) {
        Ok(config) => config,
        Err(ConfigError::Usage) => {
            println!("{USAGE}");
            process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        target_host = %config.target.host,
        target_port = config.target.port,
        listen_port = config.listen.port,
        "Configuration loaded"
    );

    let proxy = Proxy::bind(&config)?;
    proxy.run().await
}
