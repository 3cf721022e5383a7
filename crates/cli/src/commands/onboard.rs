//! `lmgram onboard`: First-time setup.

use std::path::{Path, PathBuf};

use lmgram_config::AppConfig;

/// Locale catalogs shipped inside the binary.
const CATALOGS: &[(&str, &str)] = &[
    ("en", include_str!("../../../../locales/en.json")),
    ("ru", include_str!("../../../../locales/ru.json")),
];

pub fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("lmgram: First-Time Setup");
    println!("=========================\n");

    let existed = config_path.exists();
    let created = setup(config_path)?;

    if existed {
        println!("  Config already exists: {}", config_path.display());
    }
    for path in &created {
        println!("✅ Created {}", path.display());
    }

    println!("\n📝 Next steps:");
    println!("   1. Set telegram.bot_token in {}", config_path.display());
    println!("   2. Start LM Studio's server and pick a model: lmgram models");
    println!("   3. Start the bot: lmgram run --model <id>");
    println!("   4. Allow yourself once the bot has seen you: lmgram users allow <id>");
    Ok(())
}

/// Create whatever is missing next to `config_path`; returns what was created.
fn setup(config_path: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut created = Vec::new();

    if !config_path.exists() {
        created.push(config_path.to_path_buf());
    }
    let config = AppConfig::init(config_path)?;

    let users_path = AppConfig::resolve(config_path, &config.paths.users_file);
    if !users_path.exists() {
        if let Some(parent) = users_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&users_path, "[]\n")?;
        created.push(users_path);
    }

    let locales_dir = AppConfig::resolve(config_path, &config.paths.locales_dir);
    std::fs::create_dir_all(&locales_dir)?;
    for (language, catalog) in CATALOGS {
        let path = locales_dir.join(format!("{language}.json"));
        if !path.exists() {
            std::fs::write(&path, catalog)?;
            created.push(path);
        }
    }

    Ok(created)
}
