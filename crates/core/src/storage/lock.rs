use anyhow::Context;
use sqlx::{Connection, PgConnection};

// Advisory locks are scoped to the Postgres session. The worker takes one per cycle kind so two
// one-shot runs of the same cycle never write the store concurrently.
const LOCK_NAMESPACE: i64 = 0x484F_5450_554C; // "HOTPUL"

fn lock_key(cycle: &str) -> i64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in cycle.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    LOCK_NAMESPACE ^ ((h >> 16) as i64)
}

/// A held cycle lock. It pins the session that took the lock; dropping it without
/// [`CycleLock::release`] closes that session, which also frees the lock.
#[derive(Debug)]
pub struct CycleLock {
    conn: PgConnection,
    cycle: String,
    key: i64,
}

pub async fn try_acquire_cycle_lock(
    pool: &sqlx::PgPool,
    cycle: &str,
) -> anyhow::Result<Option<CycleLock>> {
    let key = lock_key(cycle);
    // Detached from the pool so the locking session is never handed to anyone else.
    let mut conn = pool
        .acquire()
        .await
        .context("failed to check out a connection for the cycle lock")?
        .detach();
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (cycle={cycle}, key={key})"))?;
    if !acquired.0 {
        return Ok(None);
    }
    Ok(Some(CycleLock {
        conn,
        cycle: cycle.to_string(),
        key,
    }))
}

impl CycleLock {
    pub fn cycle(&self) -> &str {
        &self.cycle
    }

    pub async fn release(mut self) -> anyhow::Result<bool> {
        let released: (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(self.key)
            .fetch_one(&mut self.conn)
            .await
            .with_context(|| {
                format!(
                    "failed to release advisory lock (cycle={}, key={})",
                    self.cycle, self.key
                )
            })?;
        if let Err(err) = self.conn.close().await {
            tracing::debug!(
                cycle = %self.cycle,
                error = %err,
                "lock session did not close cleanly"
            );
        }
        Ok(released.0)
    }
}
