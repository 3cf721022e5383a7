//! `lmgram users`: Manage the allow-list.

use std::path::Path;

use lmgram_config::AppConfig;
use lmgram_security::{BotUser, UserStore};

fn open(config_path: &Path) -> Result<UserStore, Box<dyn std::error::Error>> {
    let config = AppConfig::init(config_path)?;
    Ok(UserStore::load(AppConfig::resolve(
        config_path,
        &config.paths.users_file,
    ))?)
}

pub fn list(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open(config_path)?;
    if store.is_empty() {
        println!("No users yet. Anyone who messages the bot is recorded here.");
        return Ok(());
    }
    print!("{}", render(&store.sorted()));
    Ok(())
}

pub fn set(config_path: &Path, id: i64, allowed: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = open(config_path)?;
    let user = store.set_allowed(id, allowed);
    store.save()?;

    let verb = if allowed { "Allowed" } else { "Denied" };
    println!("{verb} {} ({})", user.id, display_username(&user));
    Ok(())
}

fn display_username(user: &BotUser) -> &str {
    if user.username.is_empty() {
        "unknown"
    } else {
        &user.username
    }
}

fn render(users: &[BotUser]) -> String {
    let mut out = format!("{:<14} {:<24} {}\n", "ID", "USERNAME", "ALLOWED");
    for user in users {
        out.push_str(&format!(
            "{:<14} {:<24} {}\n",
            user.id,
            display_username(user),
            if user.allowed { "yes" } else { "no" }
        ));
    }
    out
}
