//! Pulsar - data tunnelling over DNS, ICMP, UDP, TCP and the console
//!
//! Reads from the input connector, passes every buffer through the handler
//! chain and writes it to the output connector, optionally in both
//! directions.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use pulsar::relay::{self, Relay};
use pulsar::{ConnectorRegistry, Direction, HandlerRegistry, PulsarConfig};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser)]
#[command(name = "pulsar")]
#[command(version = VERSION)]
#[command(about = "Tunnel a byte stream through DNS, ICMP, UDP, TCP or the console", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Input connector, name[:address] (listens)
    #[arg(long = "in", value_name = "CONNECTOR")]
    input: Option<String>,

    /// Output connector, name[:address] (dials)
    #[arg(long = "out", value_name = "CONNECTOR")]
    output: Option<String>,

    /// Data handlers separated by a comma, name[:options]
    #[arg(long, value_delimiter = ',')]
    handlers: Vec<String>,

    /// Directions which must use a plain connector (in, out)
    #[arg(long, value_delimiter = ',')]
    plain: Vec<Direction>,

    /// Decode the data from the input connector instead of encoding it
    #[arg(long)]
    decode: bool,

    /// Enable two-way data flow
    #[arg(long)]
    duplex: bool,

    /// Delay between I/O loop iterations (e.g. 10ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    delay: Option<Duration>,

    /// Enable verbose logging and print statistics on exit
    #[arg(short, long)]
    verbose: bool,

    /// List built-in handlers and connectors
    #[arg(long)]
    list: bool,
}

impl Cli {
    /// File configuration (or defaults) with command line overrides
    fn into_config(self) -> Result<PulsarConfig> {
        let mut config = match &self.config {
            Some(path) => PulsarConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => PulsarConfig::default(),
        };

        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if !self.handlers.is_empty() {
            config.handlers = self.handlers;
        }
        if !self.plain.is_empty() {
            config.plain = self.plain;
        }
        if let Some(delay) = self.delay {
            config.delay = delay;
        }
        config.decode |= self.decode;
        config.duplex |= self.duplex;
        config.verbose |= self.verbose;

        config.validate()?;
        Ok(config)
    }
}

fn print_builtins(connectors: &ConnectorRegistry, handlers: &HandlerRegistry) {
    println!("Built-In Handlers:\n");
    for handler in handlers.iter() {
        println!("{}\n\t{}", handler.name(), handler.description());
    }

    println!("\nBuilt-In Connectors:\n");
    for connector in connectors.iter() {
        println!("{}\n\t{}", connector.name(), connector.description());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let connectors = ConnectorRegistry::with_builtins();
    let handlers = HandlerRegistry::with_builtins();

    if cli.list {
        print_builtins(&connectors, &handlers);
        return Ok(());
    }

    let config = cli.into_config()?;

    let forward = handlers
        .make_chain(&config.handlers)
        .context("Failed to build handler chain")?;

    let input = connectors
        .make_connect(&config.input, true, config.is_plain(Direction::In))
        .await
        .with_context(|| format!("Failed to open input connector {}", config.input))?;
    let output = connectors
        .make_connect(&config.output, false, config.is_plain(Direction::Out))
        .await
        .with_context(|| format!("Failed to open output connector {}", config.output))?;

    let mut relay = Relay::new(input.clone(), output.clone(), forward, config.decode)
        .delay(config.delay);
    if config.duplex {
        relay = relay.duplex(handlers.make_chain(&config.handlers)?);
    }

    relay.run().await?;

    if config.verbose {
        eprint!("{}", relay::stats_report(&*input, &*output));
    }

    Ok(())
}
