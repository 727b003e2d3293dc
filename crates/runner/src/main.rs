use std::process::ExitCode;

use log::{error, info, warn};
use shardline_runner::{
    ClientConfig, Orchestrator, TOKEN_ENV, init_logging, load_config, load_default_config,
};
use tokio::sync::broadcast::error::RecvError;

const USAGE: &str = r#"shardline - run gateway shards and print what they dispatch

USAGE:
    shardline [--config <PATH>] [--shards <COUNT|auto>] [--shard-ids <ID,ID,..>]

OPTIONS:
    -c, --config <PATH>       JSON configuration (embedded defaults otherwise)
    -s, --shards <COUNT>      Total shard count; `auto` asks the API
    -i, --shard-ids <IDS>     Comma-separated subset of shards this process runs
    -h, --help                Print this help message

ENVIRONMENT VARIABLES:
    SHARDLINE_TOKEN           Credential, overrides the config file
    RUST_LOG                  Log filter, e.g. `shardline_gateway=debug`
"#;

/// What the command line asked for
#[derive(Debug, Default, PartialEq)]
struct Cli {
    help: bool,
    config: Option<String>,
    /// `Some(0)` for `auto`
    shards: Option<u32>,
    shard_ids: Option<Vec<u32>>,
}

impl Cli {
    fn parse<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut cli = Cli::default();
        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            let mut value = |name: &str| args.next().ok_or_else(|| format!("{} needs a value", name));
            match flag.as_str() {
                "-h" | "--help" => cli.help = true,
                "-c" | "--config" => cli.config = Some(value("--config")?),
                "-s" | "--shards" => {
                    let count = value("--shards")?;
                    cli.shards = Some(match count.as_str() {
                        "auto" => 0,
                        n => n.parse().map_err(|_| format!("bad shard count `{}`", n))?,
                    });
                }
                "-i" | "--shard-ids" => {
                    let ids = value("--shard-ids")?
                        .split(',')
                        .map(|id| id.trim().parse().map_err(|_| format!("bad shard id `{}`", id)))
                        .collect::<Result<Vec<u32>, String>>()?;
                    cli.shard_ids = Some(ids);
                }
                other => return Err(format!("unknown argument `{}`", other)),
            }
        }
        Ok(cli)
    }

    /// Command-line overrides win over the file
    fn apply(&self, mut config: ClientConfig) -> ClientConfig {
        if let Some(shards) = self.shards {
            config.shard_count = shards;
        }
        if let Some(ids) = &self.shard_ids {
            config.shard_ids = Some(ids.clone());
        }
        config.with_token_override(std::env::var(TOKEN_ENV).ok())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = match Cli::parse(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            return ExitCode::FAILURE;
        }
    };
    if cli.help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let loaded = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path);
            load_config(path)
        }
        None => load_default_config(),
    };
    let config = match loaded {
        Ok(config) => cli.apply(config),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if config.token.is_empty() {
        warn!("No token configured, set {} or \"token\"", TOKEN_ENV);
    }

    let client = match Orchestrator::connect(config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Could not start: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut events = client.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => info!("[shard {}] {}", event.shard, event.name),
                Err(RecvError::Lagged(missed)) => warn!("Printer fell behind, {} events skipped", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.shutdown().await;
    ExitCode::SUCCESS
}
