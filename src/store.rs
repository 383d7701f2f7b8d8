// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Subscriber persistence.
//!
//! Protocol components receive their store at construction time as a trait
//! object. Records are never deleted: they simply fall out of the `active_*`
//! queries once their lease has elapsed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// A verified PubSubHubbub subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: u64,
    /// Callback URL that receives pushed feed bodies.
    pub url: String,
    pub lease_until: DateTime<Utc>,
    /// Shared secret for `X-Hub-Signature`, if the subscriber asked for one.
    pub secret: Option<String>,
    pub created: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.lease_until > now
    }
}

/// A subscription as handed to the store; the store assigns `id` and `created`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscription {
    pub url: String,
    pub lease_until: DateTime<Utc>,
    pub secret: Option<String>,
}

/// A registered RSS-Cloud subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssCloud {
    pub id: u64,
    /// Canonical callback URL, the natural key.
    pub url: String,
    /// XML-RPC method the subscriber wants called.
    pub method: String,
    pub subscribed_until: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

impl RssCloud {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.subscribed_until > now
    }
}

/// Persistence failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    Query(String),
}

/// Storage for PubSubHubbub subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Subscriptions whose lease ends strictly after `now`.
    async fn active_subscriptions(&self, now: DateTime<Utc>)
        -> Result<Vec<Subscription>, StoreError>;

    /// Insert a subscription, or refresh the lease and secret of the one
    /// already held for the same callback URL.
    async fn upsert_subscription(
        &self,
        sub: NewSubscription,
        now: DateTime<Utc>,
    ) -> Result<Subscription, StoreError>;

    /// End every lease held by `url` at `now`. Returns how many were expired.
    async fn expire_subscriptions(&self, url: &str, now: DateTime<Utc>)
        -> Result<usize, StoreError>;
}

/// Storage for RSS-Cloud registrations.
#[async_trait]
pub trait RssCloudStore: Send + Sync {
    /// Registrations whose lease ends strictly after `now`.
    async fn active_rss_clouds(&self, now: DateTime<Utc>) -> Result<Vec<RssCloud>, StoreError>;

    /// Create or refresh the registration keyed by `url`.
    async fn upsert_rss_cloud(
        &self,
        url: &str,
        method: &str,
        subscribed_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RssCloud, StoreError>;
}

/// In-memory store used by the bundled binary and the test suite.
#[derive(Clone, Default)]
pub struct MemoryStore {
    next_id: Arc<AtomicU64>,
    subscriptions: Arc<RwLock<HashMap<String, Subscription>>>,
    clouds: Arc<RwLock<HashMap<String, RssCloud>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Every stored subscription, active or not.
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        let mut subs: Vec<_> = self.subscriptions.read().await.values().cloned().collect();
        subs.sort_by_key(|s| s.id);
        subs
    }

    /// Every stored RSS-Cloud registration, active or not.
    pub async fn rss_clouds(&self) -> Vec<RssCloud> {
        let mut clouds: Vec<_> = self.clouds.read().await.values().cloned().collect();
        clouds.sort_by_key(|c| c.id);
        clouds
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn active_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, StoreError> {
        let subs = self.subscriptions.read().await;
        Ok(subs.values().filter(|s| s.is_active(now)).cloned().collect())
    }

    async fn upsert_subscription(
        &self,
        sub: NewSubscription,
        now: DateTime<Utc>,
    ) -> Result<Subscription, StoreError> {
        let mut subs = self.subscriptions.write().await;
        if let Some(existing) = subs.get_mut(&sub.url) {
            existing.lease_until = sub.lease_until;
            existing.secret = sub.secret;
            debug!(id = existing.id, url = %existing.url, "Refreshed subscription");
            return Ok(existing.clone());
        }

        let record = Subscription {
            id: self.allocate_id(),
            url: sub.url.clone(),
            lease_until: sub.lease_until,
            secret: sub.secret,
            created: now,
        };
        subs.insert(sub.url, record.clone());
        debug!(id = record.id, url = %record.url, "Inserted subscription");
        Ok(record)
    }

    async fn expire_subscriptions(
        &self,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut subs = self.subscriptions.write().await;
        Ok(match subs.get_mut(url) {
            Some(existing) if existing.is_active(now) => {
                existing.lease_until = now;
                1
            }
            _ => 0,
        })
    }
}

#[async_trait]
impl RssCloudStore for MemoryStore {
    async fn active_rss_clouds(&self, now: DateTime<Utc>) -> Result<Vec<RssCloud>, StoreError> {
        let clouds = self.clouds.read().await;
        Ok(clouds.values().filter(|c| c.is_active(now)).cloned().collect())
    }

    async fn upsert_rss_cloud(
        &self,
        url: &str,
        method: &str,
        subscribed_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RssCloud, StoreError> {
        let mut clouds = self.clouds.write().await;
        let record = clouds.entry(url.to_string()).or_insert_with(|| RssCloud {
            id: self.allocate_id(),
            url: url.to_string(),
            method: String::new(),
            subscribed_until,
            created: now,
        });
        record.method = method.to_string();
        record.subscribed_until = subscribed_until;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_sub(url: &str, lease_until: DateTime<Utc>) -> NewSubscription {
        NewSubscription {
            url: url.to_string(),
            lease_until,
            secret: None,
        }
    }

    #[tokio::test]
    async fn test_active_subscriptions_respects_lease() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store
            .upsert_subscription(new_sub("http://a.example/cb", now - Duration::seconds(1)), now)
            .await
            .unwrap();
        store
            .upsert_subscription(new_sub("http://b.example/cb", now + Duration::seconds(1)), now)
            .await
            .unwrap();

        let active = store.active_subscriptions(now).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].url, "http://b.example/cb");
    }

    #[tokio::test]
    async fn test_lease_ending_now_is_inactive() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .upsert_subscription(new_sub("http://a.example/cb", now), now)
            .await
            .unwrap();
        assert!(store.active_subscriptions(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resubscribe_refreshes_existing() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = store
            .upsert_subscription(new_sub("http://a.example/cb", now + Duration::hours(1)), now)
            .await
            .unwrap();

        let mut again = new_sub("http://a.example/cb", now + Duration::hours(2));
        again.secret = Some("s3cret".to_string());
        let second = store
            .upsert_subscription(again, now + Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.created, now);
        assert_eq!(second.secret.as_deref(), Some("s3cret"));
        assert_eq!(store.subscriptions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_expire_subscriptions() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .upsert_subscription(new_sub("http://a.example/cb", now + Duration::hours(1)), now)
            .await
            .unwrap();

        assert_eq!(store.expire_subscriptions("http://a.example/cb", now).await.unwrap(), 1);
        assert_eq!(store.expire_subscriptions("http://a.example/cb", now).await.unwrap(), 0);
        assert!(store.active_subscriptions(now).await.unwrap().is_empty());
        assert_eq!(store.subscriptions().await.len(), 1, "expired records are kept");
    }

    #[tokio::test]
    async fn test_rss_cloud_upsert_keyed_by_url() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let later = now + Duration::minutes(10);

        let first = store
            .upsert_rss_cloud("http://10.0.0.1:5337/RPC2", "river.ping", now + Duration::hours(25), now)
            .await
            .unwrap();
        let second = store
            .upsert_rss_cloud("http://10.0.0.1:5337/RPC2", "other.ping", later + Duration::hours(25), later)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.method, "other.ping");
        assert_eq!(second.subscribed_until, later + Duration::hours(25));
        assert_eq!(second.created, now);
        assert_eq!(store.rss_clouds().await.len(), 1);
    }
}
