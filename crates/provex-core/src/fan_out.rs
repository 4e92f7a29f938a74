//! Bounded, order-preserving concurrent sub-requests.

use std::future::Future;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use crate::adapter::RawPayload;
use crate::envelope::Warning;
use crate::source::SourceError;

/// Outcome of one sub-request, tagged with its key.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutItem<T> {
    pub key: String,
    pub outcome: Result<T, SourceError>,
}

/// Run `fetch` for every key with at most `limit` in flight.
///
/// Results come back in input order regardless of completion order. An item
/// still pending at `deadline` fails with a timeout without affecting the
/// items that already finished.
pub async fn fan_out<I, T, F, Fut>(
    keys: I,
    limit: usize,
    deadline: Option<Instant>,
    mut fetch: F,
) -> Vec<FanOutItem<T>>
where
    I: IntoIterator<Item = String>,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let pending = keys.into_iter().map(|key| {
        let request = fetch(key.clone());
        async move {
            let outcome = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, request)
                    .await
                    .unwrap_or_else(|_| {
                        Err(SourceError::timeout(format!(
                            "'{key}' did not finish before the deadline"
                        )))
                    }),
                None => request.await,
            };
            FanOutItem { key, outcome }
        }
    });
    stream::iter(pending).buffered(limit.max(1)).collect().await
}

/// Fold sub-request bodies into one payload.
///
/// Failed keys become partial-fetch warnings. When every key failed the
/// first error is returned instead.
pub fn collect_payload(items: Vec<FanOutItem<String>>) -> Result<RawPayload, SourceError> {
    let mut payload = RawPayload::default();
    let mut first_error = None;
    for item in items {
        match item.outcome {
            Ok(body) => payload.push(item.key, body),
            Err(error) => {
                payload.warnings.push(Warning::partial_fetch(&item.key, &error));
                first_error.get_or_insert(error);
            }
        }
    }
    match first_error {
        Some(error) if payload.is_empty() => Err(error),
        _ => Ok(payload),
    }
}
