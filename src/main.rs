use anyhow::Result;
use clap::Parser;
use geopipe::config::Layout;
use geopipe::pipeline::stages::{self, PipelineParams};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Fetch a dataset archive and reshape its sectioned annotation files into
/// TSV datasets.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Source archive URL.
    url: String,
    /// Filename the archive is stored under inside the data directory.
    archive: String,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    let layout = Layout::load()?;
    info!(url = %args.url, archive = %args.archive, data = %layout.data_dir.display(), "startup");

    let params = PipelineParams {
        url: args.url,
        archive_name: args.archive,
    };
    let report = stages::build(&params, &layout)?.run()?;

    for (stage, status) in &report.stages {
        info!(stage = %stage, ?status, "done");
    }
    Ok(())
}
