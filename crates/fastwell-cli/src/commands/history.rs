use clap::Subcommand;
use fastwell_core::{ActivityLog, Config, Database};

use super::{print_json, signed_in_user};

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List completed fasts, newest first
    List {
        /// Maximum number of entries
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Totals across all completed fasts
    Stats,
}

pub fn run(action: HistoryAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let user = signed_in_user(&config)?;
    let db = Database::open()?;

    match action {
        HistoryAction::List { limit } => {
            let records = db.recent(&user, limit)?;
            print_json(&records)?;
        }
        HistoryAction::Stats => {
            let stats = db.stats(&user)?;
            print_json(&stats)?;
        }
    }
    Ok(())
}
