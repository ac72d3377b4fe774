// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

//! Headless dashboard driver.
//!
//! Runs one dashboard session against a live backend with an in-memory
//! surface. Filter changes are read from stdin, one command per line.

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tramlive::models::LineCatalog;
use tramlive::{
    DashboardConfig, DashboardSession, HttpSnapshotSource, MemorySurface, PageLocation,
    SessionCommand,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the tram backend
    #[arg(long, env = "TRAMLIVE_BACKEND_URL", default_value = "http://localhost:8021/")]
    backend_url: String,
    /// Page address the filter is read from, e.g. http://localhost/?line=101&course=12
    #[arg(long, env = "TRAMLIVE_PAGE_URL", default_value = "http://localhost/")]
    page_url: String,
    /// Seconds between refresh cycles
    #[arg(long, env = "TRAMLIVE_POLL_INTERVAL", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(10..=15))]
    poll_interval: u64,
    #[arg(long, env = "TRAMLIVE_REQUEST_TIMEOUT", default_value_t = 10)]
    request_timeout_secs: u64,
    #[arg(long, value_enum, env = "TRAMLIVE_LINE_CATALOG", default_value_t = LineCatalog::All)]
    line_catalog: LineCatalog,
    #[arg(long, env = "TRAMLIVE_LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,
}

fn parse_command(input: &str) -> Result<Option<SessionCommand>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    };

    let command = match word {
        "line" => SessionCommand::SelectLine(rest.to_string()),
        "course" => SessionCommand::SelectCourse(rest.to_string()),
        "refresh" => SessionCommand::Refresh,
        "status" => SessionCommand::Report,
        "quit" | "exit" => SessionCommand::Shutdown,
        other => return Err(format!("unknown command `{}`", other)),
    };

    Ok(Some(command))
}

async fn read_commands(commands: mpsc::UnboundedSender<SessionCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_command(&line) {
                Ok(Some(command)) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(message) => {
                    tracing::warn!(input = %line, "{}", message);
                }
            },
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "stdin closed");
                break;
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let config = DashboardConfig::new(&args.backend_url, args.poll_interval)?
        .with_request_timeout(std::time::Duration::from_secs(args.request_timeout_secs))
        .with_line_catalog(args.line_catalog);

    let source = HttpSnapshotSource::new(&config)?;
    let location = PageLocation::parse(&args.page_url)?;

    tracing::info!(
        backend = %config.backend_url,
        poll_interval = ?config.poll_interval,
        "starting linden"
    );

    let session = DashboardSession::new(&config, source, MemorySurface::new(), location);

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(read_commands(tx));

    let mut session = session.run(rx).await;
    session.handle_command(SessionCommand::Report);

    println!("{}", session.location().current());
    for text in session.surface().entry_texts() {
        println!("{}", text);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filter_commands() {
        assert_eq!(
            parse_command("line 101"),
            Ok(Some(SessionCommand::SelectLine("101".into())))
        );
        assert_eq!(
            parse_command("  course   12 "),
            Ok(Some(SessionCommand::SelectCourse("12".into())))
        );
        assert_eq!(
            parse_command("line"),
            Ok(Some(SessionCommand::SelectLine(String::new())))
        );
        assert_eq!(parse_command("quit"), Ok(Some(SessionCommand::Shutdown)));
        assert_eq!(parse_command(""), Ok(None));
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(parse_command("teleport 4").is_err());
    }

    #[test]
    fn poll_interval_outside_range_is_rejected() {
        assert!(Args::try_parse_from(["linden", "--poll-interval", "5"]).is_err());
        let args = Args::try_parse_from(["linden", "--poll-interval", "12"]).unwrap();
        assert_eq!(args.poll_interval, 12);
    }
}
