use anyhow::Result;
use daylog::config::config_dir;
use daylog_report::cli::{Args, USAGE};
use daylog_report::config::ReportConfig;
use daylog_report::registry::{all_sources, select};
use daylog_report::row::{DayWindow, ReportWriter};
use daylog_report::runner::SourceRunner;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daylog=info,daylog_report=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    if args.help {
        print!("{}", USAGE);
        return Ok(());
    }

    let dir = config_dir();
    let config = ReportConfig::load(&dir)?;
    let window = DayWindow::local(args.day())?;
    let sources = select(all_sources(&config), &args.selected());

    info!(
        day = %window.day,
        config_dir = %dir.display(),
        sources = sources.len(),
        "Building activity report"
    );

    // Sources run one after another so only one browser flow is open at a time
    let runner = SourceRunner::new(dir, config.broker.clone());
    let mut rows = Vec::new();
    for source in &sources {
        rows.extend(runner.run(source.as_ref(), &window).await?);
    }

    let mut writer = ReportWriter::new(std::io::stdout().lock());
    for row in &rows {
        writer.write_row(row)?;
    }
    writer.finish()?;

    Ok(())
}
