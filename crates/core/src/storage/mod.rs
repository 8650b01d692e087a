pub mod kv;
pub mod lock;
pub mod market;
pub mod recommendations;

pub use kv::{KvStore, MemoryKv, PgKv};
pub use market::{AuthState, MarketStore};
pub use recommendations::{RecommendationStore, HISTORY_CAP};

use anyhow::Context;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
