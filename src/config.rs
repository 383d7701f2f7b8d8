// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the notification hub.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the hub service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Where this blog's feeds live
    #[serde(default)]
    pub site: SiteConfig,

    /// PubSubHubbub configuration
    #[serde(default)]
    pub hub: HubConfig,

    /// RSS-Cloud configuration
    #[serde(default)]
    pub cloud: CloudConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Canonical feed locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Host used in canonical feed URLs. When unset, the request's `Host`
    /// header is used.
    #[serde(default)]
    pub public_host: Option<String>,

    /// Path of the Atom feed, the PubSubHubbub topic (default: /atom)
    #[serde(default = "default_atom_path")]
    pub atom_path: String,

    /// Path of the RSS feed announced over RSS-Cloud (default: /rss)
    #[serde(default = "default_rss_path")]
    pub rss_path: String,

    /// Content-Type of pushed feed bodies (default: application/atom+xml)
    #[serde(default = "default_feed_content_type")]
    pub feed_content_type: String,
}

/// PubSubHubbub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Fixed verification challenge. A random one is generated per attempt
    /// when unset.
    #[serde(default)]
    pub challenge: Option<String>,

    /// Timeout for outbound requests in seconds (default: 30)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// RSS-Cloud configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Hours a registration stays active (default: 25)
    #[serde(default = "default_lease_hours")]
    pub lease_hours: i64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_atom_path() -> String {
    "/atom".to_string()
}

fn default_rss_path() -> String {
    "/rss".to_string()
}

fn default_feed_content_type() -> String {
    "application/atom+xml".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_lease_hours() -> i64 {
    25 // RSS-Cloud clients re-register daily
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            site: SiteConfig::default(),
            hub: HubConfig::default(),
            cloud: CloudConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            public_host: None,
            atom_path: default_atom_path(),
            rss_path: default_rss_path(),
            feed_content_type: default_feed_content_type(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            challenge: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            lease_hours: default_lease_hours(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl SiteConfig {
    /// Host to build canonical URLs with, preferring the configured one.
    pub fn host<'a>(&'a self, request_host: Option<&'a str>) -> Option<&'a str> {
        self.public_host.as_deref().or(request_host)
    }

    /// The Atom feed URL, which is the only topic this hub serves.
    pub fn topic_url(&self, host: &str) -> String {
        format!("http://{}{}", host, self.atom_path)
    }

    /// The RSS feed URL RSS-Cloud subscribers register for.
    pub fn rss_url(&self, host: &str) -> String {
        format!("http://{}{}", host, self.rss_path)
    }
}

impl HubConfig {
    /// Get the outbound request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl CloudConfig {
    /// Get the registration lease
    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lease_hours)
    }
}
