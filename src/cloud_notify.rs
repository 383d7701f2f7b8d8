// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! RSS-Cloud update pings.

use crate::metrics::Metrics;
use crate::push::Dispatch;
use crate::store::{RssCloud, RssCloudStore};
use crate::xmlrpc;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Calls every active RSS-Cloud subscriber's method with the feed URL.
#[derive(Clone)]
pub struct CloudNotifier {
    store: Arc<dyn RssCloudStore>,
    client: reqwest::Client,
    metrics: Metrics,
}

impl CloudNotifier {
    pub fn new(store: Arc<dyn RssCloudStore>, client: reqwest::Client, metrics: Metrics) -> Self {
        Self {
            store,
            client,
            metrics,
        }
    }

    /// Start one ping per registration active at `now`.
    pub async fn notify(&self, feed_url: &str, now: DateTime<Utc>) -> Dispatch {
        debug!("Sending RSS cloud notifications");
        let clouds = match self.store.active_rss_clouds(now).await {
            Ok(clouds) => clouds,
            Err(e) => {
                error!(error = %e, "Could not load RSS clouds to notify of feed update");
                return Dispatch::default();
            }
        };

        let handles = clouds
            .into_iter()
            .map(|cloud| {
                let client = self.client.clone();
                let metrics = self.metrics.clone();
                let feed_url = feed_url.to_string();
                tokio::spawn(async move {
                    let ok = ping(&client, &cloud, &feed_url).await;
                    metrics.delivered("rsscloud", ok);
                    ok
                })
            })
            .collect();
        Dispatch::new(handles)
    }
}

async fn ping(client: &reqwest::Client, cloud: &RssCloud, feed_url: &str) -> bool {
    debug!(url = %cloud.url, method = %cloud.method, "Building RSS cloud notification");
    let body = xmlrpc::method_call(&cloud.method, feed_url);

    // Any response at all counts; faults are not inspected.
    match client
        .post(&cloud.url)
        .header(CONTENT_TYPE, "text/xml")
        .body(body)
        .send()
        .await
    {
        Ok(resp) => {
            debug!(url = %cloud.url, status = %resp.status(), "Sent RSS cloud notification");
            true
        }
        Err(e) => {
            warn!(url = %cloud.url, error = %e, "Could not post RSS cloud notification");
            false
        }
    }
}
