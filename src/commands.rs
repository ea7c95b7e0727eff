//! CLI command handlers
//!
//! Each handler opens the SQLite stores in the data directory and runs
//! the engine on the blocking pool.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use tracing::info;

use lexis::config::{self, Config, DEFAULT_CONFIG};
use lexis::error::validate_id;
use lexis::scheduler::sm2::{format_interval, preview_intervals, Schedule};
use lexis::scheduler::Scheduler;
use lexis::storage::{catalog, CatalogDb, ProgressDb};

const DB_FILE: &str = "lexis.sqlite";

/// Data directory, its database and the loaded configuration
struct Workspace {
    dir: PathBuf,
    db_path: PathBuf,
    config: Config,
}

impl Workspace {
    fn locate() -> Result<Self> {
        let dir = config::data_dir()?;
        let config = Config::load(&dir.join("config.toml"))?;
        Ok(Self {
            db_path: dir.join(DB_FILE),
            dir,
            config,
        })
    }

    /// Like `locate`, but the database must already exist
    fn open() -> Result<Self> {
        let workspace = Self::locate()?;
        if !workspace.db_path.exists() {
            return Err(anyhow!(
                "No database found at {:?}. Run 'lexis init' first.",
                workspace.db_path
            ));
        }
        Ok(workspace)
    }

    fn stores(&self) -> Result<(ProgressDb, CatalogDb)> {
        let timeout = self.config.storage.busy_timeout();
        let progress = ProgressDb::open(&self.db_path, timeout)?;
        let catalog = CatalogDb::open(&self.db_path, timeout)?;
        Ok((progress, catalog))
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Initialize data directory, database and configuration
pub async fn init() -> Result<()> {
    let workspace = Workspace::locate()?;
    std::fs::create_dir_all(&workspace.dir)
        .with_context(|| format!("creating {:?}", workspace.dir))?;

    blocking(move || {
        workspace.stores()?;
        info!("lexis initialized at {:?}", workspace.dir);

        let config_path = workspace.dir.join("config.toml");
        if !config_path.exists() {
            std::fs::write(&config_path, DEFAULT_CONFIG)?;
            info!("Created default configuration at {:?}", config_path);
        }

        println!("Initialized lexis at {}", workspace.dir.display());
        Ok(())
    })
    .await
}

/// Show current lexis status
pub async fn show_status() -> Result<()> {
    let workspace = Workspace::locate()?;

    println!("lexis Status");
    println!("============");
    println!();

    if !workspace.db_path.exists() {
        println!("Status: NOT INITIALIZED");
        println!("Run 'lexis init' to initialize lexis");
        return Ok(());
    }

    println!("Status: INITIALIZED");
    println!("Data directory: {}", workspace.dir.display());

    blocking(move || {
        let (progress, catalog) = workspace.stores()?;

        let languages = catalog.count_by_language()?;
        if languages.is_empty() {
            println!("Vocabulary: empty (load items with 'lexis import <file.json>')");
        } else {
            println!("Vocabulary:");
            for (language, count) in languages {
                println!("  {}: {} items", language, count);
            }
        }
        println!("Progress records: {}", progress.count()?);

        println!();
        println!("Configuration:");
        for line in toml::to_string_pretty(&workspace.config)?.lines() {
            println!("  {}", line);
        }
        Ok(())
    })
    .await
}

/// Import vocabulary items from a JSON file
pub async fn import(input: PathBuf) -> Result<()> {
    let workspace = Workspace::open()?;

    blocking(move || {
        let (_, catalog) = workspace.stores()?;
        let count = catalog::import_items(&catalog, &input)?;
        println!("Imported {} items from {}", count, input.display());
        Ok(())
    })
    .await
}

/// Set a learner's target language
pub async fn set_language(learner: String, language: String) -> Result<()> {
    validate_id("learner_id", &learner)?;
    validate_id("language_code", &language)?;
    let workspace = Workspace::open()?;

    blocking(move || {
        let (_, catalog) = workspace.stores()?;
        catalog.set_target_language(&learner, &language)?;
        println!("Learner {} now studies '{}'", learner, language);
        Ok(())
    })
    .await
}

/// Print the next session for a learner
pub async fn session(learner: String, size: Option<usize>, json: bool) -> Result<()> {
    let workspace = Workspace::open()?;

    blocking(move || {
        let (progress, catalog) = workspace.stores()?;
        let scheduler = Scheduler::new(&progress, &catalog, &catalog, &workspace.config);
        let size = size.unwrap_or(workspace.config.session.default_size);

        let items = scheduler.compose_session(&learner, size)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&items)?);
            return Ok(());
        }

        if items.is_empty() {
            println!("Nothing to review for {} right now.", learner);
            return Ok(());
        }

        println!("Session for {} ({} items)", learner, items.len());
        println!("{}", "=".repeat(40));
        for (n, entry) in items.iter().enumerate() {
            let tag = if entry.is_new() { "new" } else { "due" };
            let mut line = format!(
                "{:>3}. [{}] {} -> {}",
                n + 1,
                tag,
                entry.item.word,
                entry.item.translation
            );
            if !entry.item.part_of_speech.is_empty() {
                line.push_str(&format!(" ({})", entry.item.part_of_speech));
            }
            if !entry.is_new() {
                line.push_str(&format!(
                    "  ease {:.2}, every {}",
                    entry.ease_factor,
                    format_interval(entry.interval)
                ));
            }
            println!("{}", line);
            println!("       id: {}", entry.item.id);
        }
        Ok(())
    })
    .await
}

/// Grade one review
pub async fn review(
    learner: String,
    item: String,
    quality: i64,
    response_time_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let workspace = Workspace::open()?;

    blocking(move || {
        let (progress, catalog) = workspace.stores()?;
        let scheduler = Scheduler::new(&progress, &catalog, &catalog, &workspace.config);

        let outcome = scheduler.submit_review(&learner, &item, quality, response_time_ms)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            return Ok(());
        }

        println!(
            "Next review of {} in {} ({})",
            item,
            format_interval(outcome.interval),
            outcome.next_review_at.format("%Y-%m-%d %H:%M UTC")
        );
        println!("  Ease factor: {:.2}", outcome.ease_factor);
        println!("  Streak: {}", outcome.repetitions);
        println!(
            "  Mastery: {} ({}/5){}",
            outcome.mastery_level.as_str(),
            u8::from(outcome.mastery_level),
            if outcome.is_mastered { " - mastered" } else { "" }
        );
        Ok(())
    })
    .await
}

/// Show learner statistics
pub async fn stats(learner: String, json: bool) -> Result<()> {
    let workspace = Workspace::open()?;

    blocking(move || {
        let (progress, catalog) = workspace.stores()?;
        let scheduler = Scheduler::new(&progress, &catalog, &catalog, &workspace.config);

        let stats = scheduler.statistics(&learner)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }

        println!("Statistics for {}", learner);
        println!("{}", "=".repeat(40));
        println!("  Items in progress: {}", stats.total_items);
        println!("  Due for review: {}", stats.due_count);
        if stats.total_reviews > 0 {
            println!(
                "  Accuracy: {:.2}% ({}/{} reviews)",
                stats.accuracy_rate, stats.correct_reviews, stats.total_reviews
            );
        } else {
            println!("  Accuracy: N/A (no reviews recorded)");
        }
        println!("  Average ease factor: {:.2}", stats.average_ease_factor);
        println!("  Mastered: {}", stats.mastered_items);

        if !stats.mastery_distribution.is_empty() {
            println!("  By mastery level:");
            for (level, count) in &stats.mastery_distribution {
                println!("    {} {}: {}", u8::from(*level), level.as_str(), count);
            }
        }
        Ok(())
    })
    .await
}

/// Show what each rating would do to an item's schedule
pub async fn preview(learner: String, item: String) -> Result<()> {
    validate_id("learner_id", &learner)?;
    validate_id("item_id", &item)?;
    let workspace = Workspace::open()?;

    blocking(move || {
        let (progress, _) = workspace.stores()?;
        let now = Utc::now();

        let schedule = match progress.get(&learner, &item)? {
            Some(record) => record.schedule,
            None => Schedule::initial(now),
        };
        let intervals = preview_intervals(&schedule, now);

        println!("Preview for {} / {}", learner, item);
        for (quality, days) in intervals.iter().enumerate() {
            println!("  quality {}: {}", quality, format_interval(*days));
        }
        Ok(())
    })
    .await
}
