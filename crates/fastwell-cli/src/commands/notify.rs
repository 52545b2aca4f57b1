use clap::Subcommand;
use fastwell_core::Database;

use super::print_json;

#[derive(Subcommand)]
pub enum NotifyAction {
    /// Reminders that are scheduled and not cancelled
    Pending,
}

pub fn run(action: NotifyAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        NotifyAction::Pending => print_json(&db.pending_notifications()?)?,
    }
    Ok(())
}
