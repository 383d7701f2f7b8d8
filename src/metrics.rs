// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for intake and delivery.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Hub counters, registered on their own registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// PubSubHubbub intake by outcome (`verified`, `accepted`, `rejected`, `error`)
    pub hub_requests: IntCounterVec,
    /// RSS-Cloud registrations by outcome (`registered`, `fault`, `error`)
    pub cloud_registrations: IntCounterVec,
    /// Outbound notifications by protocol (`websub`, `rsscloud`) and result
    pub deliveries: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("cares_hub".to_string()), None)?;

        let hub_requests = IntCounterVec::new(
            Opts::new("hub_requests_total", "PubSubHubbub subscription requests"),
            &["outcome"],
        )?;
        let cloud_registrations = IntCounterVec::new(
            Opts::new("cloud_registrations_total", "RSS-Cloud registration requests"),
            &["outcome"],
        )?;
        let deliveries = IntCounterVec::new(
            Opts::new("deliveries_total", "Outbound feed notifications"),
            &["protocol", "result"],
        )?;

        registry.register(Box::new(hub_requests.clone()))?;
        registry.register(Box::new(cloud_registrations.clone()))?;
        registry.register(Box::new(deliveries.clone()))?;

        Ok(Self {
            registry,
            hub_requests,
            cloud_registrations,
            deliveries,
        })
    }

    pub fn delivered(&self, protocol: &str, ok: bool) {
        let result = if ok { "ok" } else { "failed" };
        self.deliveries.with_label_values(&[protocol, result]).inc();
    }

    /// Render every counter in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
