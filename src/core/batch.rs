//! Chunked, concurrent validation of record lists with streamed progress.
//!
//! The driver counts the input first, then validates it in groups of
//! `batch_size` records. A reader task feeds a bounded channel holding at most
//! one group, so reading never runs more than a group ahead of validation.

use crate::core::error::{AppError, Result};
use crate::core::models::{BatchEvent, BatchRecord, Record, ValidationResult};
use crate::core::verifier::EmailVerifier;
use crate::utils::dns::DnsResolver;
use crate::utils::smtp::Connector;

use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;

/// Field names checked, in order, for the address of a record.
pub const EMAIL_FIELDS: [&str; 6] = ["email", "Email", "EMAIL", "e-mail", "E-mail", "E-Mail"];

/// A record list that can be read from the start more than once.
///
/// Reading is synchronous and runs on the blocking pool.
pub trait RecordSource: Send + Sync + 'static {
    fn open(&self) -> Result<Box<dyn Iterator<Item = Result<Record>> + Send + '_>>;
}

impl RecordSource for Vec<Record> {
    fn open(&self) -> Result<Box<dyn Iterator<Item = Result<Record>> + Send + '_>> {
        Ok(Box::new(self.iter().cloned().map(Ok)))
    }
}

/// Returns the trimmed address under the first matching field name.
pub fn email_field(record: &Record) -> Option<&str> {
    EMAIL_FIELDS
        .iter()
        .filter_map(|name| record.get(*name))
        .filter_map(|value| value.as_str())
        .map(str::trim)
        .find(|email| !email.is_empty())
}

/// Validates every record of `source` and streams the progress.
///
/// Nothing runs until the stream is first polled. It ends with `Complete`,
/// or with a single `Error` when the input is empty or unreadable. Dropping
/// it stops the work at the next event.
pub fn validate_batch<R, C, S>(
    verifier: Arc<EmailVerifier<R, C>>,
    source: S,
) -> impl Stream<Item = BatchEvent>
where
    R: DnsResolver + 'static,
    C: Connector + 'static,
    S: RecordSource,
{
    stream::once(async move {
        let (events_tx, events_rx) = mpsc::channel(1);
        tokio::spawn(drive(verifier, Arc::new(source), events_tx));
        events_rx
    })
    .flat_map(|events_rx| {
        stream::unfold(events_rx, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    })
}

fn count_records<S: RecordSource>(source: &S) -> Result<(usize, Vec<String>)> {
    let mut total = 0;
    let mut field_names = Vec::new();
    for record in source.open()? {
        let record = record?;
        if total == 0 {
            field_names = record.keys().cloned().collect();
        }
        total += 1;
    }
    Ok((total, field_names))
}

fn read_records<S: RecordSource>(source: &S, records: mpsc::Sender<Result<Record>>) {
    let iter = match source.open() {
        Ok(iter) => iter,
        Err(e) => {
            let _ = records.blocking_send(Err(e));
            return;
        }
    };
    for record in iter {
        let failed = record.is_err();
        if records.blocking_send(record).is_err() || failed {
            return;
        }
    }
}

async fn drive<R, C, S>(
    verifier: Arc<EmailVerifier<R, C>>,
    source: Arc<S>,
    events: mpsc::Sender<BatchEvent>,
) where
    R: DnsResolver + 'static,
    C: Connector + 'static,
    S: RecordSource,
{
    let counting = Arc::clone(&source);
    let counted = tokio::task::spawn_blocking(move || count_records(&*counting))
        .await
        .map_err(|e| AppError::Task(e.to_string()))
        .and_then(|counted| counted);

    let (total, field_names) = match counted {
        Ok((0, _)) => {
            tracing::warn!(target: "batch_task", "Input contains no records.");
            let _ = events
                .send(BatchEvent::Error {
                    message: "No records found in input".to_string(),
                })
                .await;
            return;
        }
        Ok(counted) => counted,
        Err(e) => {
            tracing::error!(target: "batch_task", "Failed to read input: {}", e);
            let _ = events
                .send(BatchEvent::Error {
                    message: format!("Failed to read input: {}", e),
                })
                .await;
            return;
        }
    };

    tracing::info!(target: "batch_task", "Validating {} records in groups of {}", total, verifier.batch_size());
    if events
        .send(BatchEvent::Init {
            total_records: total,
            field_names,
        })
        .await
        .is_err()
    {
        return;
    }

    let group_size = verifier.batch_size();
    let (records_tx, mut records_rx) = mpsc::channel(group_size);
    tokio::task::spawn_blocking(move || read_records(&*source, records_tx));

    let mut processed = 0usize;
    loop {
        let mut group = Vec::with_capacity(group_size);
        while group.len() < group_size {
            match records_rx.recv().await {
                Some(Ok(record)) => group.push(record),
                Some(Err(e)) => {
                    tracing::error!(target: "batch_task", "Input read failed after {} records: {}", processed, e);
                    let _ = events
                        .send(BatchEvent::Error {
                            message: format!("Failed to read input: {}", e),
                        })
                        .await;
                    return;
                }
                None => break,
            }
        }
        if group.is_empty() {
            break;
        }

        let records = validate_group(&verifier, group).await;
        processed += records.len();
        let percent = (processed * 100 / total).min(100) as u8;
        tracing::debug!(target: "batch_task", "Processed {}/{} records ({}%)", processed, total, percent);
        if events
            .send(BatchEvent::Progress { percent, records })
            .await
            .is_err()
        {
            tracing::debug!(target: "batch_task", "Event stream dropped, stopping batch.");
            return;
        }
    }

    tracing::info!(target: "batch_task", "Batch complete: {} records processed", processed);
    let _ = events.send(BatchEvent::Complete).await;
}

/// Validates one group concurrently and returns it in input order.
async fn validate_group<R, C>(
    verifier: &Arc<EmailVerifier<R, C>>,
    group: Vec<Record>,
) -> Vec<BatchRecord>
where
    R: DnsResolver + 'static,
    C: Connector + 'static,
{
    let pending = group.into_iter().map(|fields| {
        let email = email_field(&fields).map(str::to_string);
        let task = email.clone().map(|email| {
            let verifier = Arc::clone(verifier);
            tokio::spawn(async move { verifier.validate(&email).await })
        });
        async move {
            let validation = match (email, task) {
                (Some(email), Some(task)) => match task.await {
                    Ok(result) => result,
                    Err(e) => {
                        let message = panic_message(e);
                        tracing::error!(target: "batch_task", "{}", AppError::Task(format!("validating <{}>: {}", email, message)));
                        ValidationResult::failed(email, format!("Processing error: {}", message))
                    }
                },
                _ => ValidationResult::failed("", "No email address found"),
            };
            BatchRecord { fields, validation }
        }
    });
    futures::future::join_all(pending).await
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "validation task panicked".to_string()),
        Err(err) => err.to_string(),
    }
}
