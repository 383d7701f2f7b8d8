// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Signed fan-out to PubSubHubbub subscribers.
//!
//! Every active subscription gets its own task. Delivery is best-effort:
//! failures are logged and counted, never retried.

use crate::metrics::Metrics;
use crate::store::{Subscription, SubscriptionStore};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use sha1::Sha1;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// Failure delivering a notification to one subscriber.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("could not reach {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// `sha1=<hex>` signature of `body` keyed by `secret`.
pub fn signature(secret: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha1>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Outcome of a fan-out, once every task has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
}

/// Handles to in-flight deliveries.
///
/// Dropping a dispatch detaches its tasks; they still run to completion.
#[derive(Debug, Default)]
pub struct Dispatch {
    handles: Vec<JoinHandle<bool>>,
}

impl Dispatch {
    pub(crate) fn new(handles: Vec<JoinHandle<bool>>) -> Self {
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every delivery and count the results.
    pub async fn wait(self) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for handle in self.handles {
            match handle.await {
                Ok(true) => summary.delivered += 1,
                _ => summary.failed += 1,
            }
        }
        summary
    }
}

/// A feed body to push, with the content type it is served as.
#[derive(Debug, Clone)]
pub struct FeedBody {
    pub content: Bytes,
    pub content_type: String,
}

/// Pushes new feed content to every active hub subscriber.
#[derive(Clone)]
pub struct HubNotifier {
    store: Arc<dyn SubscriptionStore>,
    client: reqwest::Client,
    metrics: Metrics,
}

impl HubNotifier {
    pub fn new(store: Arc<dyn SubscriptionStore>, client: reqwest::Client, metrics: Metrics) -> Self {
        Self {
            store,
            client,
            metrics,
        }
    }

    /// Start one delivery per subscription active at `now`.
    pub async fn notify(&self, feed: FeedBody, now: DateTime<Utc>) -> Dispatch {
        debug!("Sending PubSubHubbub notifications");
        let subs = match self.store.active_subscriptions(now).await {
            Ok(subs) => subs,
            Err(e) => {
                error!(error = %e, "Could not load PubSubHubbub subscribers");
                return Dispatch::default();
            }
        };

        let handles = subs
            .into_iter()
            .map(|sub| {
                let client = self.client.clone();
                let metrics = self.metrics.clone();
                let feed = feed.clone();
                tokio::spawn(async move {
                    let ok = match deliver(&client, &sub, &feed).await {
                        Ok(()) => {
                            debug!(url = %sub.url, "Notified subscriber");
                            true
                        }
                        Err(e) => {
                            warn!(id = sub.id, error = %e, "Could not notify subscriber");
                            false
                        }
                    };
                    metrics.delivered("websub", ok);
                    ok
                })
            })
            .collect();
        Dispatch::new(handles)
    }
}

async fn deliver(
    client: &reqwest::Client,
    sub: &Subscription,
    feed: &FeedBody,
) -> Result<(), DeliveryError> {
    let mut req = client
        .post(&sub.url)
        .header(CONTENT_TYPE, &feed.content_type)
        .body(feed.content.clone());
    if let Some(secret) = &sub.secret {
        req = req.header(SIGNATURE_HEADER, signature(secret, &feed.content));
    }

    // The response body carries nothing we act on.
    req.send().await.map_err(|source| DeliveryError::Transport {
        url: sub.url.clone(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_signature() {
        assert_eq!(
            signature("abc", b"hello"),
            "sha1=d373670db3c99ebfa96060e993c340ccf6dd079e"
        );
    }

    #[test]
    fn test_signature_depends_on_secret() {
        assert_ne!(
            signature("abc", b"hello"),
            signature("abd", b"hello")
        );
        // Empty and over-long keys are legal for HMAC.
        assert!(signature("", b"hello").starts_with("sha1="));
        assert_eq!(signature(&"k".repeat(200), b"hello").len(), "sha1=".len() + 40);
    }

    #[tokio::test]
    async fn test_empty_dispatch() {
        assert_eq!(Dispatch::default().wait().await, DispatchSummary::default());
    }
}
