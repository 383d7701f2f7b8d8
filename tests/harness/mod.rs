// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared fixtures for driving the hub end to end.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use cares_hub::{
    config::Config,
    handlers::{router, AppState},
    hub::Hub,
    metrics::Metrics,
    rsscloud::RssCloudHub,
    store::{
        MemoryStore, NewSubscription, RssCloud, RssCloudStore, StoreError, Subscription,
        SubscriptionStore,
    },
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Host the blog is served from in every test.
pub const HOST: &str = "blog.example";

/// Challenge the hub sends; stub callbacks echo it back.
pub const CHALLENGE: &str = "yup";

/// Address requests appear to come from.
pub fn peer() -> SocketAddr {
    SocketAddr::from(([192, 0, 2, 7], 41000))
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.hub.challenge = Some(CHALLENGE.to_string());
    config
}

pub fn test_state(store: &MemoryStore) -> Arc<AppState> {
    state_with(Arc::new(store.clone()))
}

pub fn state_with<S>(store: Arc<S>) -> Arc<AppState>
where
    S: SubscriptionStore + RssCloudStore + 'static,
{
    let config = test_config();
    Arc::new(AppState {
        hub: Hub::new(
            store.clone(),
            reqwest::Client::new(),
            config.site.clone(),
            config.hub.challenge.clone(),
        ),
        cloud: RssCloudHub::new(store, config.site.clone(), config.cloud.clone()),
        metrics: Metrics::new().unwrap(),
        config,
    })
}

pub fn app(store: &MemoryStore) -> Router {
    router(test_state(store)).layer(MockConnectInfo(peer()))
}

/// Router over a store whose every call fails.
pub fn broken_app() -> Router {
    router(state_with(Arc::new(BrokenStore))).layer(MockConnectInfo(peer()))
}

/// A store that is never reachable.
#[derive(Debug, Clone, Copy)]
pub struct BrokenStore;

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl SubscriptionStore for BrokenStore {
    async fn active_subscriptions(
        &self,
        _now: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, StoreError> {
        Err(down())
    }

    async fn upsert_subscription(
        &self,
        _sub: NewSubscription,
        _now: DateTime<Utc>,
    ) -> Result<Subscription, StoreError> {
        Err(down())
    }

    async fn expire_subscriptions(
        &self,
        _url: &str,
        _now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        Err(StoreError::Query("expire failed".to_string()))
    }
}

#[async_trait]
impl RssCloudStore for BrokenStore {
    async fn active_rss_clouds(&self, _now: DateTime<Utc>) -> Result<Vec<RssCloud>, StoreError> {
        Err(down())
    }

    async fn upsert_rss_cloud(
        &self,
        _url: &str,
        _method: &str,
        _subscribed_until: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<RssCloud, StoreError> {
        Err(down())
    }
}

/// Send one request and collect status, headers and body text.
pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, String) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

pub fn form(pairs: &[(&str, &str)]) -> String {
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        ser.append_pair(k, v);
    }
    ser.finish()
}

pub fn post_form(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("host", HOST)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

pub fn post_xml(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("host", HOST)
        .header("content-type", "text/xml")
        .body(Body::from(body))
        .unwrap()
}

/// A `cloud.notify` call registering `path` on `port` for `feed`.
pub fn cloud_notify_call(method: &str, port: u16, path: &str, feed: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n\
         <methodCall>\n\
         <methodName>cloud.notify</methodName>\n\
         <params>\n\
         <param><value>{method}</value></param>\n\
         <param><value><i4>{port}</i4></value></param>\n\
         <param><value>{path}</value></param>\n\
         <param><value>xml-rpc</value></param>\n\
         <param><value><array><data><value>{feed}</value></data></array></value></param>\n\
         </params>\n\
         </methodCall>"
    )
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
