use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::{self, FetchRow};

const CONCURRENCY: usize = 10;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

pub fn build_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .cookie_store(true)
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Download documents concurrently, saving each result to DB as it arrives.
pub async fn fetch_documents_streaming(
    conn: &Connection,
    documents: Vec<(i64, String)>,
) -> Result<FetchStats> {
    let client = build_client()?;
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let total = documents.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Workers send results, this task is the only DB writer
    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchRow>(CONCURRENCY * 2);

    for (document_id, url) in documents {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let row = fetch_with_retry(&client, document_id, &url).await;
            let _ = tx.send(row).await;
        });
    }

    // rx closes once every task has dropped its sender
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    while let Some(row) = rx.recv().await {
        if row.error.is_some() {
            errors += 1;
        } else {
            ok += 1;
        }
        db::save_fetch(conn, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} documents ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

async fn fetch_with_retry(client: &reqwest::Client, document_id: i64, url: &str) -> FetchRow {
    let mut attempt = 0;
    loop {
        let row = fetch_one(client, document_id, url).await;
        if !should_retry(&row) || attempt == MAX_RETRIES {
            return row;
        }

        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
        warn!(
            "Fetch of {} failed ({}), attempt {}/{}, backing off {:.1}s",
            url,
            row.error.as_deref().unwrap_or("unknown error"),
            attempt + 1,
            MAX_RETRIES,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// Rate limiting, server errors and transport failures are worth another try.
fn should_retry(row: &FetchRow) -> bool {
    match row.status {
        Some(429) | Some(500..=599) => true,
        Some(_) => false,
        None => row.error.is_some(),
    }
}

async fn fetch_one(client: &reqwest::Client, document_id: i64, url: &str) -> FetchRow {
    let start = Instant::now();
    let result = async {
        let response = client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok::<_, reqwest::Error>((status, body))
    }
    .await;
    let latency_ms = Some(start.elapsed().as_millis() as i64);

    match result {
        Ok((status, body)) if status.is_success() => FetchRow {
            document_id,
            url: url.to_string(),
            content: Some(body.to_vec()),
            status: Some(status.as_u16() as i32),
            error: None,
            latency_ms,
        },
        Ok((status, _)) => FetchRow {
            document_id,
            url: url.to_string(),
            content: None,
            status: Some(status.as_u16() as i32),
            error: Some(format!("HTTP {}", status)),
            latency_ms,
        },
        Err(e) => FetchRow {
            document_id,
            url: url.to_string(),
            content: None,
            status: e.status().map(|s| s.as_u16() as i32),
            error: Some(e.to_string()),
            latency_ms,
        },
    }
}
