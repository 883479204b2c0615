mod cli;

use crate::cli::{Cli, Command, KeyArgs, LogFormatArg, NextArgs, StorageBackendArg};
use clap::Parser;
use sequin_core::{GenerationOptions, GeneratorDefaults, Record, Resolvable, SequenceStore};
use sequin_generator::{RetryPolicy, SequenceGenerator};
use sequin_storage::{InMemorySequenceStore, MySqlSequenceStore, RedisSequenceStore};
use std::error::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Cli::parse();
    init_tracing(config.log_format);

    info!(
        storage_backend = %config.storage,
        start_value = config.start_value,
        max_attempts = config.max_attempts,
        "starting sequin"
    );

    let defaults = GeneratorDefaults::builder()
        .year_format(config.year_format)
        .build();
    let retry = RetryPolicy::builder()
        .max_attempts(config.max_attempts)
        .build();

    match config.storage {
        StorageBackendArg::InMemory => {
            let store = InMemorySequenceStore::with_start_value(config.start_value);
            run(config.command, store, defaults, retry).await
        }
        StorageBackendArg::Mysql => {
            let mysql_dsn = config
                .mysql_dsn
                .ok_or("mysql dsn is required when storage backend is mysql")?;
            let store = MySqlSequenceStore::connect(&mysql_dsn)
                .await?
                .with_start_value(config.start_value);
            store.ensure_schema().await?;
            run(config.command, store, defaults, retry).await
        }
        StorageBackendArg::Redis => {
            let redis_url = config
                .redis_url
                .ok_or("redis url is required when storage backend is redis")?;
            let store = RedisSequenceStore::connect(&redis_url)
                .await?
                .with_start_value(config.start_value);
            run(config.command, store, defaults, retry).await
        }
    }
}

fn init_tracing(format: LogFormatArg) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // stdout carries the issued values
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormatArg::Text => subscriber.init(),
        LogFormatArg::Json => subscriber.json().init(),
    }
}

fn key_options(key: &KeyArgs) -> GenerationOptions {
    GenerationOptions {
        namespace: Some(key.namespace.clone()),
        prefix: key.prefix.clone().map(Resolvable::from),
        suffix: key.suffix.clone().map(Resolvable::from),
        ..GenerationOptions::default()
    }
}

fn next_options(args: &NextArgs) -> GenerationOptions {
    GenerationOptions {
        increment: args.increment,
        length: args.length,
        pad: args.pad,
        separator: args.separator.clone(),
        ..key_options(&args.key)
    }
}

async fn run<S: SequenceStore>(
    command: Command,
    store: S,
    defaults: GeneratorDefaults,
    retry: RetryPolicy,
) -> Result<(), Box<dyn Error>> {
    let generator = SequenceGenerator::new(store)
        .with_defaults(defaults)
        .with_retry_policy(retry);
    let record = Record::new();

    match command {
        Command::Next(args) => {
            let options = next_options(&args);
            for _ in 0..args.count {
                let generated = generator.generate(&options, &record).await?;
                println!("{}", generated.value);
            }
        }
        Command::Current(key) => {
            let resolved = generator.resolve(&key_options(&key), &record)?;
            let counter = generator
                .store()
                .current(&resolved.key)
                .await?
                .ok_or_else(|| format!("no counter allocated for {}", resolved.key))?;
            println!("{}", serde_json::to_string(&counter)?);
        }
        Command::Reset(args) => {
            let resolved = generator.resolve(&key_options(&args.key), &record)?;
            let counter = generator
                .store()
                .reset(&resolved.key, args.sequence)
                .await?;
            info!(key = %resolved.key, sequence = counter.sequence, "counter reset");
            println!("{}", serde_json::to_string(&counter)?);
        }
    }

    Ok(())
}
