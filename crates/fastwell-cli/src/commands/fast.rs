use std::time::Duration;

use clap::Subcommand;
use fastwell_core::{Config, Event, FastingLabel, FastingProgress, FastingService};
use serde::Serialize;
use tokio::sync::mpsc;

use super::print_json;

#[derive(Subcommand)]
pub enum FastAction {
    /// Start a fast (defaults to timer.default_label)
    Start {
        /// Protocol: 12:12, 14:10, 16:8, 18:6, 20:4 or OMAD
        label: Option<FastingLabel>,
    },
    /// End the active fast; an overdue fast is completed and logged instead
    Stop,
    /// Print current progress, completing the fast if its target has passed
    Status,
    /// Follow the active fast until it completes or ends
    Watch,
    /// List the available protocols
    Protocols,
}

#[derive(Serialize)]
struct ProtocolInfo {
    label: FastingLabel,
    duration_hours: u64,
    duration_secs: u64,
}

enum WatchUpdate {
    Progress(FastingProgress),
    Completed(Event),
}

pub fn run(action: FastAction) -> Result<(), Box<dyn std::error::Error>> {
    if let FastAction::Protocols = action {
        let protocols: Vec<ProtocolInfo> = FastingLabel::ALL
            .into_iter()
            .map(|label| ProtocolInfo {
                label,
                duration_hours: label.duration_hours(),
                duration_secs: label.duration_secs(),
            })
            .collect();
        print_json(&protocols)?;
        return Ok(());
    }

    let config = Config::load()?;
    let service = FastingService::open(&config)?;

    match action {
        FastAction::Start { label } => {
            // An overdue fast is finished before the slot is reused.
            if let Some(event) = service.check_completion()? {
                print_json(&event)?;
            }
            let label = label.unwrap_or_else(|| config.default_label());
            let event = service.start_fast(label)?;
            print_json(&event)?;
        }
        FastAction::Stop => match service.end_fast()? {
            Some(event) => print_json(&event)?,
            None => print_json(&service.snapshot_event()?)?,
        },
        FastAction::Status => {
            if let Some(event) = service.check_completion()? {
                print_json(&event)?;
            }
            print_json(&service.snapshot_event()?)?;
        }
        FastAction::Watch => watch(&service, config.poll_interval())?,
        FastAction::Protocols => {}
    }
    Ok(())
}

fn watch(service: &FastingService, interval: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let progress_tx = tx.clone();
        let _poller = service.poller()?.spawn(interval, move |progress| {
            let _ = progress_tx.send(WatchUpdate::Progress(progress));
        });
        let _observer = service.observer().clone().spawn(interval, move |event| {
            let _ = tx.send(WatchUpdate::Completed(event));
        });

        let mut seen_active = false;
        while let Some(update) = rx.recv().await {
            let progress = match update {
                WatchUpdate::Completed(event) => {
                    print_line(&event)?;
                    break;
                }
                WatchUpdate::Progress(progress) => progress,
            };

            // Another process may have ended the fast without telling us.
            let stored = service.store().get_snapshot()?;
            if progress.active && stored.is_some() {
                seen_active = true;
                print_line(&progress)?;
                continue;
            }

            if seen_active {
                // Give the observer one interval to report a completion.
                match tokio::time::timeout(interval, next_completion(&mut rx)).await {
                    Ok(Some(event)) => print_line(&event)?,
                    _ => print_line(&service.snapshot_event()?)?,
                }
            } else {
                print_line(&service.snapshot_event()?)?;
            }
            break;
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

async fn next_completion(rx: &mut mpsc::UnboundedReceiver<WatchUpdate>) -> Option<Event> {
    while let Some(update) = rx.recv().await {
        if let WatchUpdate::Completed(event) = update {
            return Some(event);
        }
    }
    None
}

fn print_line<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
