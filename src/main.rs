use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Context as _;
use clap::Parser;
use env_logger::{Env, Target};
use place::{app, Args, Config};

fn init_logging(log_path: Option<&Path>) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));

    if let Some(path) = log_path {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .with_context(|| format!("could not open log file {path:?}"))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("could not install logger")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args(Args::parse())?;
    init_logging(config.log_path.as_deref())?;

    app::run(config).await
}
