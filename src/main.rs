use abusefilter::cli::{Cli, Commands, ConfigAction, FilterAction};
use abusefilter::config::Config;
use abusefilter::engine::{AbuseFilterEngine, FilterHit};
use abusefilter::error::{AbuseFilterError, Result};
use abusefilter::filter::{parse_filter_file, FilterKey};
use abusefilter::storage::StorageManager;
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
        Commands::Filter { action } => {
            cmd_filter(cli.config, action)?;
        }
        Commands::Run { hit, json } => {
            cmd_run(cli.config, &hit, json)?;
        }
        Commands::Log { limit, filter } => {
            cmd_log(cli.config, limit, filter)?;
        }
        Commands::Revert {
            filter,
            hours,
            reason,
            performer,
        } => {
            cmd_revert(cli.config, &filter, hours, &reason, &performer)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "abusefilter=debug"
    } else {
        "abusefilter=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn cmd_filter(config_path: Option<PathBuf>, action: FilterAction) -> Result<()> {
    let config = load_config(config_path)?;
    let storage = StorageManager::from_config(&config)?;
    let services = storage.services();

    match action {
        FilterAction::Add { file } => {
            let content = read_file(&file)?;
            let filters = parse_filter_file(&content)?;
            for filter in &filters {
                services.filters.save_filter(filter)?;
                println!("✓ Saved filter {} ({})", filter.key, filter.name);
            }
        }
        FilterAction::Show { key } => {
            let key: FilterKey = key.parse()?;
            let filter = services
                .filters
                .filter(&key)?
                .ok_or_else(|| AbuseFilterError::FilterNotFound {
                    key: key.to_string(),
                })?;
            println!("{}", toml::to_string_pretty(&filter)?);
        }
    }

    Ok(())
}

fn cmd_run(config_path: Option<PathBuf>, hit_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let storage = StorageManager::from_config(&config)?;
    let engine = AbuseFilterEngine::new(config, storage.services());

    let content = read_file(hit_path)?;
    let hit: FilterHit = serde_json::from_str(&content).map_err(|e| AbuseFilterError::Json {
        source: e,
        context: format!("Failed to parse hit file: {}", hit_path.display()),
    })?;

    let outcome = engine.handle_hit(&hit)?;
    let failed = outcome.run_deferred_updates();
    if failed > 0 {
        tracing::warn!("{} deferred update(s) failed", failed);
    }

    if json {
        let report = serde_json::json!({
            "request_id": outcome.request_id,
            "status": outcome.status,
            "actions_taken": outcome.actions_taken,
            "log_ids": outcome.log_ids,
        });
        let text = serde_json::to_string_pretty(&report).map_err(|e| AbuseFilterError::Json {
            source: e,
            context: "Failed to serialize outcome".to_string(),
        })?;
        println!("{}", text);
        return Ok(());
    }

    println!("Request {}", outcome.request_id);
    for (key, actions) in &outcome.actions_taken {
        if actions.is_empty() {
            println!("  filter {}: no actions", key);
        } else {
            println!("  filter {}: {}", key, actions.join(", "));
        }
    }
    if outcome.status.is_good() {
        println!("✓ Status: good");
    } else {
        println!("✗ Status: rejected");
        for message in outcome.status.messages() {
            println!("  - {}", message);
        }
    }

    Ok(())
}

fn cmd_log(config_path: Option<PathBuf>, limit: usize, filter: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let storage = StorageManager::from_config(&config)?;
    let services = storage.services();

    let entries = match filter {
        Some(key) => {
            let key: FilterKey = key.parse()?;
            let mut entries = services.abuse_log.log_entries_for_filter(
                &key,
                chrono::DateTime::<Utc>::MIN_UTC,
                Utc::now(),
            )?;
            entries.reverse();
            entries.truncate(limit);
            entries
        }
        None => services.abuse_log.recent_log_entries(limit)?,
    };

    if entries.is_empty() {
        println!("No abuse log entries");
        return Ok(());
    }

    for entry in &entries {
        let actions = if entry.actions.is_empty() {
            "none".to_string()
        } else {
            entry.actions.join(",")
        };
        println!(
            "#{} {} filter {} {} by {} on {} [{}]",
            entry.id.unwrap_or_default(),
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.filter,
            entry.action,
            entry.user.name,
            entry.target,
            actions
        );
    }

    Ok(())
}

fn cmd_revert(
    config_path: Option<PathBuf>,
    filter: &str,
    hours: i64,
    reason: &str,
    performer: &str,
) -> Result<()> {
    if hours <= 0 {
        return Err(AbuseFilterError::InvalidConfigValue {
            path: "hours".to_string(),
            message: "must be positive".to_string(),
        });
    }
    let key: FilterKey = filter.parse()?;

    let config = load_config(config_path)?;
    let storage = StorageManager::from_config(&config)?;
    let services = storage.services();
    let performer = services.users.find_or_create_system_user(performer)?;
    let engine = AbuseFilterEngine::new(config, services);

    let to = Utc::now();
    let from = to - Duration::hours(hours);
    let report = engine
        .reverter()
        .revert_filter(&key, from, to, &performer, reason)?;

    println!(
        "Examined {} log entries for filter {}",
        report.entries_examined, report.filter
    );
    for action in &report.actions {
        let mark = if action.reverted { "✓" } else { "✗" };
        println!(
            "  {} #{} {} on {}",
            mark, action.log_id, action.action, action.user
        );
    }
    println!(
        "Reverted {} of {} action(s)",
        report.reverted_count(),
        report.actions.len()
    );

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'abusefilter config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| AbuseFilterError::Io {
        source: e,
        context: format!("Failed to read {}", path.display()),
    })
}
