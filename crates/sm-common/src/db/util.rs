#![allow(async_fn_in_trait)]

use deadpool_postgres::GenericClient;
use std::{sync::OnceLock, time::Instant};
use tokio_postgres::{ToStatement, types::ToSql};
use tracing::warn;

fn parse_threshold(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(|v| v.max(0) as u64)
        .filter(|v| *v > 0)
}

fn slow_query_threshold_ms() -> Option<u64> {
    static CACHE: OnceLock<Option<u64>> = OnceLock::new();

    *CACHE.get_or_init(|| parse_threshold(std::env::var("SM_DB_LOG_MIN_DURATION_MS").ok().as_deref()))
}

fn maybe_log_slow_query(label: &str, started_at: Instant) {
    if let Some(threshold_ms) = slow_query_threshold_ms() {
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        if elapsed_ms >= threshold_ms {
            warn!(query = label, elapsed_ms, "slow_query_detected");
        }
    }
}

/// Query helpers that log statements slower than `SM_DB_LOG_MIN_DURATION_MS`.
pub trait TimedClientExt: GenericClient {
    async fn timed_query<S>(
        &self,
        statement: &S,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<Vec<tokio_postgres::Row>, tokio_postgres::Error>
    where
        S: ToStatement + Sync + Send + ?Sized,
    {
        let started = Instant::now();
        let result = self.query(statement, params).await;
        maybe_log_slow_query(label, started);
        result
    }

    async fn timed_execute<S>(
        &self,
        statement: &S,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<u64, tokio_postgres::Error>
    where
        S: ToStatement + Sync + Send + ?Sized,
    {
        let started = Instant::now();
        let result = self.execute(statement, params).await;
        maybe_log_slow_query(label, started);
        result
    }

    async fn timed_execute_cached(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
        label: &str,
    ) -> Result<u64, tokio_postgres::Error> {
        let started = Instant::now();
        let prepared = self.prepare_cached(statement).await?;
        let result = self.execute(&prepared, params).await;
        maybe_log_slow_query(label, started);
        result
    }
}

impl<T: GenericClient + ?Sized> TimedClientExt for T {}
