//! 演示数据
//!
//! 写入 5 个 example.com 页面，每页若干条过去 30 天内的已同意事件。

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::RngExt;
use tracing::info;

use crate::storage::{EventKind, Metadata, NewEvent, SeaOrmStorage, StorageFactory};
use crate::utils::fingerprint;

const SEED_PAGES: [(&str, &str); 5] = [
    ("https://example.com/", "Home Page"),
    ("https://example.com/about", "About Us"),
    ("https://example.com/products", "Products"),
    ("https://example.com/contact", "Contact"),
    ("https://example.com/blog", "Blog"),
];

const SEED_USER_AGENT: &str = "Mozilla/5.0 (seed data)";
const SEED_VISITORS: usize = 5;

struct SeedEvent {
    kind: EventKind,
    visitor: usize,
    timestamp: DateTime<Utc>,
}

fn plan_events(count: usize) -> Vec<SeedEvent> {
    let mut rng = rand::rng();
    let now = Utc::now();
    (0..count)
        .map(|_| SeedEvent {
            kind: match rng.random_range(0..3) {
                0 => EventKind::Pageview,
                1 => EventKind::Click,
                _ => EventKind::FormSubmit,
            },
            visitor: rng.random_range(0..SEED_VISITORS),
            timestamp: now
                - Duration::days(rng.random_range(0..30))
                - Duration::minutes(rng.random_range(0..24 * 60)),
        })
        .collect()
}

/// 写入演示数据，返回写入的事件数。`events_per_page` 为 None 时每页随机 10..60 条
pub async fn seed_storage(storage: &SeaOrmStorage, events_per_page: Option<usize>) -> Result<usize> {
    let visitors: Vec<String> = (0..SEED_VISITORS)
        .map(|i| fingerprint(&format!("seed-visitor-{}", i), SEED_USER_AGENT))
        .collect();

    let mut total = 0;
    for (url, title) in SEED_PAGES {
        let page = storage
            .create_page_if_absent(url, Some(title))
            .await
            .with_context(|| format!("Failed to create page {}", url))?;

        let count = events_per_page.unwrap_or_else(|| rand::rng().random_range(10..60));
        for planned in plan_events(count) {
            storage
                .record_event_at(
                    NewEvent {
                        page_id: page.id.clone(),
                        kind: planned.kind,
                        visitor_hash: visitors[planned.visitor].clone(),
                        user_agent: SEED_USER_AGENT.to_string(),
                        metadata: Metadata::new(),
                        consent_given: true,
                    },
                    planned.timestamp,
                )
                .await
                .context("Failed to record seed event")?;
        }
        info!("Created {} events for {}", count, title);
        total += count;
    }
    Ok(total)
}

pub async fn run_seed(events_per_page: Option<usize>) -> Result<()> {
    crate::runtime::lifetime::startup::install_crypto_provider();
    let storage = StorageFactory::create()
        .await
        .context("Failed to create storage backend")?;
    let total = seed_storage(&storage, events_per_page).await?;
    println!("Seed completed: {} events across {} pages", total, SEED_PAGES.len());
    Ok(())
}
