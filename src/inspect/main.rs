/**
 * xfsync-inspect
 *
 * Prints the offline queue stored in a local xfsync database: pending
 * effects in replay order and the identifier map.
 *
 * Usage: xfsync-inspect [path/to/offline.db]
 * Without an argument the path comes from XFSYNC_DB_PATH or the platform
 * data directory.
 */
use xfsync::client::local_db::LocalDatabase;
use xfsync::shared::SyncConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let path = match std::env::args().nth(1) {
        Some(path) => path.into(),
        None => SyncConfig::default().with_env_overrides()?.resolved_database_path(),
    };
    tracing::info!("[Inspect] Opening {}", path.display());

    let db = LocalDatabase::open(&path).await?;
    let stats = db.get_stats().await?;
    let state = db.load_state().await?;

    println!("Database: {}", path.display());
    println!("Schema version: {}", db.schema_version().await?);
    println!("Pending effects: {}", stats.pending_effects);
    println!();

    for (position, effect) in state.effects.iter().enumerate() {
        println!(
            "{:>3}. {} {} (retries: {}, queued: {})",
            position + 1,
            effect.id,
            effect.mutation_name().unwrap_or_else(|| "anonymous".to_string()),
            effect.retry_count,
            effect.enqueued_at
        );
        if !effect.operation.variables.is_empty() {
            println!("     variables: {}", serde_json::Value::Object(effect.operation.variables.clone()));
        }
        if let Some(error) = &effect.last_error {
            println!("     last error: {}", error);
        }
    }

    println!();
    println!("Identifier map: {} entries", state.id_map.len());
    for entry in state.id_map.entries() {
        println!(
            "  {} -> {} ({} at '{}', effect {})",
            entry.temp_id,
            entry.server_id.as_deref().unwrap_or("<pending>"),
            entry.typename,
            entry.path,
            entry.effect_id
        );
    }

    match &state.snapshot {
        Some(snapshot) => println!("Snapshot: {} records, taken {}", snapshot.len(), snapshot.taken_at),
        None => println!("Snapshot: none"),
    }
    if let Some(cache) = &state.cache {
        println!("Persisted cache: {} records", cache.len());
    }

    db.close().await;
    Ok(())
}
