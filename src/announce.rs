// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Entry point for the publishing side: call [`FeedAnnouncer::announce`]
//! after a post is saved.

use crate::cloud_notify::CloudNotifier;
use crate::config::SiteConfig;
use crate::push::{Dispatch, FeedBody, HubNotifier};
use bytes::Bytes;
use chrono::Utc;
use tracing::info;

/// Deliveries started by one announcement.
#[derive(Debug)]
pub struct Announcement {
    pub websub: Dispatch,
    pub rsscloud: Dispatch,
}

#[derive(Clone)]
pub struct FeedAnnouncer {
    hub: HubNotifier,
    cloud: CloudNotifier,
    site: SiteConfig,
}

impl FeedAnnouncer {
    pub fn new(hub: HubNotifier, cloud: CloudNotifier, site: SiteConfig) -> Self {
        Self { hub, cloud, site }
    }

    /// Push `atom` to hub subscribers and ping cloud subscribers with the RSS
    /// URL for `host`. Returns as soon as the deliveries are spawned.
    pub async fn announce(&self, atom: Bytes, host: &str) -> Announcement {
        let now = Utc::now();
        let host = self.site.host(Some(host)).unwrap_or(host);
        let feed = FeedBody {
            content: atom,
            content_type: self.site.feed_content_type.clone(),
        };

        let websub = self.hub.notify(feed, now).await;
        let rsscloud = self.cloud.notify(&self.site.rss_url(host), now).await;
        info!(
            websub = websub.len(),
            rsscloud = rsscloud.len(),
            "Announced feed update"
        );
        Announcement { websub, rsscloud }
    }
}
