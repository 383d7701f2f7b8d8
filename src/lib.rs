// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Cares Hub
//!
//! Real-time feed notification for a single-author blog, speaking both
//! syndication push protocols:
//!
//! - PubSubHubbub intake with sync/async verification handshakes
//! - HMAC-SHA1 signed fan-out of new feed bodies to hub subscribers
//! - RSS-Cloud `cloud.notify` registration over a narrow XML-RPC subset
//! - RSS-Cloud update pings
//! - Compact reversible slugs for post permalinks

pub mod announce;
pub mod cloud_notify;
pub mod config;
pub mod handlers;
pub mod http;
pub mod hub;
pub mod metrics;
pub mod push;
pub mod rsscloud;
pub mod slug;
pub mod store;
pub mod xmlrpc;

pub use announce::FeedAnnouncer;
pub use config::Config;
pub use hub::{Hub, HubError};
pub use rsscloud::{CloudError, RssCloudHub};
pub use store::{MemoryStore, RssCloudStore, StoreError, SubscriptionStore};
