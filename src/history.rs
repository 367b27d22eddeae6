//! Capture history commands.
//!
//! Read-side CLI entry points over the store: `scancatch recent`,
//! `scancatch show <id>` and `scancatch copy <id>`.

use std::sync::Arc;

use anyhow::{bail, Result};

use scancatch_core::models::CapturedRequest;
use scancatch_core::store::RequestStore;

use crate::config::Config;
use crate::db;
use crate::delivery::{Deliverer, DeliveryOutcome};
use crate::sqlite_store::SqliteStore;

async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let pool = db::open(config).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

/// Fetch one capture or fail with a not-found error.
pub async fn get_capture(store: &dyn RequestStore, id: i64) -> Result<CapturedRequest> {
    match store.get(id).await? {
        Some(record) => Ok(record),
        None => bail!("capture not found: {}", id),
    }
}

/// CLI entry point for `recent`.
pub async fn run_recent(config: &Config, limit: usize, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let records = store.recent(limit).await?;
    store.pool().close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No captures yet.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<19}  {:<15}  {:<6}  {}",
        "ID", "TIME", "CLIENT", "COPIED", "BODY"
    );
    for r in &records {
        println!(
            "{:>6}  {:<19}  {:<15}  {:<6}  {}",
            r.id,
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.client_ip,
            if r.is_copied { "yes" } else { "" },
            preview(&r.body, 60)
        );
    }

    Ok(())
}

/// CLI entry point for `show`.
pub async fn run_show(config: &Config, id: i64) -> Result<()> {
    let store = open_store(config).await?;
    let record = get_capture(store.as_ref(), id).await;
    store.pool().close().await;
    let r = record?;

    println!("--- Capture ---");
    println!("id:        {}", r.id);
    println!("time:      {}", r.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f%:z"));
    println!("method:    {}", r.method);
    println!("path:      {}", r.path);
    println!("client_ip: {}", r.client_ip);
    println!("copied:    {}", r.is_copied);
    if !r.kind.is_empty() {
        println!("type:      {}", r.kind);
    }
    println!();

    println!("--- Headers ---");
    println!("{}", r.headers);
    println!();

    println!("--- Body ---");
    println!("{}", r.body);

    Ok(())
}

/// CLI entry point for `copy`: deliver a stored capture to the clipboard.
pub async fn run_copy(config: &Config, id: i64) -> Result<()> {
    let store = open_store(config).await?;
    let mut record = get_capture(store.as_ref(), id).await?;

    let deliverer = Deliverer::one_shot(&config.delivery, store.clone());
    let outcome = deliverer.deliver_record(&mut record).await;
    store.pool().close().await;

    match outcome? {
        DeliveryOutcome::Copied { strategy } => {
            println!("Copied capture {} to the clipboard (via {}).", id, strategy);
        }
        DeliveryOutcome::ManualFallback { artifact, cause } => {
            println!("Clipboard unavailable ({}).", cause);
            println!("Opened {} for manual copy.", artifact.display());
        }
    }

    Ok(())
}

/// First line of `body`, cut to `max` characters.
fn preview(body: &str, max: usize) -> String {
    let line = body.lines().next().unwrap_or("");
    let mut out: String = line.chars().take(max).collect();
    if line.chars().count() > max || body.lines().nth(1).is_some() {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use scancatch_core::models::NewCapturedRequest;
    use scancatch_core::store::memory::InMemoryStore;
    use tempfile::TempDir;

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdefghij", 4), "abcd…");
        assert_eq!(preview("line one\nline two", 20), "line one…");
        assert_eq!(preview("", 5), "");
    }

    #[tokio::test]
    async fn test_get_capture_not_found() {
        let store = InMemoryStore::new();
        let err = get_capture(&store, 9).await.unwrap_err();
        assert!(err.to_string().contains("not found"));

        let id = store
            .insert(&NewCapturedRequest {
                method: "POST".to_string(),
                path: "/".to_string(),
                headers: String::new(),
                body: "x".to_string(),
                timestamp: Local::now(),
                client_ip: "Unknown".to_string(),
                kind: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(get_capture(&store, id).await.unwrap().body, "x");
    }

    #[tokio::test]
    async fn test_history_on_fresh_database() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("scancatch.sqlite");

        run_recent(&config, 20, false).await.unwrap();
        run_recent(&config, 20, true).await.unwrap();
        let err = run_show(&config, 1).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
