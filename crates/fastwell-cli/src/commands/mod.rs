pub mod config;
pub mod fast;
pub mod history;
pub mod notify;

use fastwell_core::backend::UserId;
use fastwell_core::Config;

/// The configured account, or an error telling the user how to sign in.
pub(crate) fn signed_in_user(config: &Config) -> Result<UserId, Box<dyn std::error::Error>> {
    match config.account.user_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Ok(UserId(id.to_string())),
        _ => Err("not signed in; run `fastwell-cli config set account.user_id <ID>`".into()),
    }
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
