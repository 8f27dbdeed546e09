//! Line commands accepted on stdin while `siaga-sync run` is polling.

use std::sync::Arc;
use sync_engine::{PollingScheduler, ViewKind};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::render::summarize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    City(String),
    Refresh(Option<String>),
    Pause,
    Resume,
    Status,
    Show(ViewKind),
    Help,
}

pub const HELP: &str = "commands: city <name> | refresh [resource] | pause | resume | status | show <view> | help";

fn parse_view(raw: &str) -> Option<ViewKind> {
    ViewKind::ALL.into_iter().find(|k| k.as_str() == raw)
}

pub fn parse(line: &str) -> Result<ConsoleCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err("empty command".into());
    };
    let rest: Vec<&str> = parts.collect();

    match (head.to_ascii_lowercase().as_str(), rest.as_slice()) {
        ("city", []) => Err("city needs a name".into()),
        ("city", words) => Ok(ConsoleCommand::City(words.join(" ").to_ascii_lowercase())),
        ("refresh", []) => Ok(ConsoleCommand::Refresh(None)),
        ("refresh", [name]) => Ok(ConsoleCommand::Refresh(Some(name.to_string()))),
        ("pause", []) => Ok(ConsoleCommand::Pause),
        ("resume", []) => Ok(ConsoleCommand::Resume),
        ("status", []) => Ok(ConsoleCommand::Status),
        ("show", [view]) => parse_view(view)
            .map(ConsoleCommand::Show)
            .ok_or_else(|| format!("unknown view '{}'", view)),
        ("help", _) => Ok(ConsoleCommand::Help),
        (other, _) => Err(format!("unrecognized command '{}'", other)),
    }
}

async fn execute(scheduler: &PollingScheduler, cmd: ConsoleCommand) {
    match cmd {
        ConsoleCommand::City(city) => {
            let results = scheduler.set_city(&city).await;
            let failed = results.iter().filter(|(_, r)| r.error.is_some()).count();
            info!("city={} refetched={} failed={}", city, results.len(), failed);
        }
        ConsoleCommand::Refresh(Some(name)) => match scheduler.refresh_now(&name).await {
            Ok(result) => match result.error {
                Some(e) => warn!("{} refresh failed: {}", name, e),
                None => info!("{} refreshed in {} attempt(s)", name, result.attempts),
            },
            Err(e) => warn!("refresh {}: {}", name, e),
        },
        ConsoleCommand::Refresh(None) => {
            let results = scheduler.refresh_all().await;
            let failed = results.iter().filter(|(_, r)| r.error.is_some()).count();
            info!("refreshed {} resources, {} failed", results.len(), failed);
        }
        ConsoleCommand::Pause => scheduler.pause(),
        ConsoleCommand::Resume => scheduler.resume(),
        ConsoleCommand::Status => {
            for s in scheduler.status() {
                info!(
                    "{:<18} {:?} every {}s value={} stale={} error={}",
                    s.name,
                    s.phase,
                    s.refresh_interval.as_secs(),
                    s.has_value,
                    s.is_stale,
                    s.error.map(|e| e.to_string()).unwrap_or_else(|| "-".into())
                );
            }
        }
        ConsoleCommand::Show(kind) => {
            if let Some(store) = scheduler.store() {
                println!("{}", summarize(&store.get_snapshot(kind)));
            }
        }
        ConsoleCommand::Help => println!("{}", HELP),
    }
}

/// Read commands until stdin closes.
pub async fn run(scheduler: Arc<PollingScheduler>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match parse(&line) {
                    Ok(cmd) => execute(&scheduler, cmd).await,
                    Err(e) => warn!("{}; {}", e, HELP),
                }
            }
            Ok(None) => {
                info!("stdin closed; console disabled");
                // Keep polling without a console.
                std::future::pending::<()>().await;
            }
            Err(e) => {
                warn!("stdin read failed: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("city Bandung"), Ok(ConsoleCommand::City("bandung".into())));
        assert_eq!(
            parse("city  Kota Bogor "),
            Ok(ConsoleCommand::City("kota bogor".into()))
        );
        assert_eq!(parse("refresh"), Ok(ConsoleCommand::Refresh(None)));
        assert_eq!(
            parse("refresh risk-zones"),
            Ok(ConsoleCommand::Refresh(Some("risk-zones".into())))
        );
        assert_eq!(parse("PAUSE"), Ok(ConsoleCommand::Pause));
        assert_eq!(
            parse("show map-layers"),
            Ok(ConsoleCommand::Show(ViewKind::MapLayers))
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse("city").is_err());
        assert!(parse("show heatmap").unwrap_err().contains("heatmap"));
        assert!(parse("refresh a b").is_err());
        assert!(parse("launch").unwrap_err().contains("launch"));
        assert!(parse("   ").is_err());
    }
}
