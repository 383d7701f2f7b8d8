// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! PubSubHubbub subscription intake.
//!
//! A request moves through `Received -> Validated -> Verifying -> Verified`,
//! or ends early as `Rejected` (an error response) or, for asynchronous
//! verification, `Dropped` (logged, nobody to tell). Only verified requests
//! ever reach the store.

use crate::config::SiteConfig;
use crate::store::{NewSubscription, StoreError, Subscription, SubscriptionStore};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Months, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

/// Longest slice of a callback's response kept for error reporting.
const MAX_ECHOED_BODY: usize = 256;

/// Query parameters the handshake sets on the callback URL.
const HANDSHAKE_PARAMS: [&str; 5] = [
    "hub.mode",
    "hub.topic",
    "hub.challenge",
    "hub.lease_seconds",
    "hub.verify_token",
];

/// Hub errors. Everything but `Store` is the requester's fault.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("None of your requested verification modes ({}) are supported", .requested.join(","))]
    UnsupportedVerifyMode { requested: Vec<String> },

    #[error("Your requested subscription topic {topic} is not tracked by this hub")]
    TopicMismatch { topic: String },

    #[error("Could not parse your callback URL {callback}")]
    InvalidCallback { callback: String },

    #[error("Your callback URL's scheme {scheme} is not supported")]
    UnsupportedScheme { scheme: String },

    #[error("Your callback URL has a fragment ({fragment}) which is not supported")]
    CallbackFragment { fragment: String },

    #[error("Your requested mode {mode} is not supported")]
    UnsupportedMode { mode: String },

    #[error("Could not parse your requested lease seconds ({value})")]
    InvalidLeaseSeconds { value: String },

    #[error("Response body did not contain the verification challenge: {body}")]
    UnverifiedResponse { body: String },

    #[error("Unexpected HTTP error verifying request: {0}")]
    VerifyTransport(#[source] reqwest::Error),

    #[error("Could not save your subscription")]
    Store(#[from] StoreError),
}

impl HubError {
    pub fn status(&self) -> StatusCode {
        match self {
            HubError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Subscribe,
    Unsubscribe,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Subscribe => "subscribe",
            Mode::Unsubscribe => "unsubscribe",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    Sync,
    Async,
}

/// Raw `hub.*` form fields. Single-valued fields keep their first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubForm {
    pub mode: String,
    pub topic: String,
    pub callback: String,
    pub lease_seconds: String,
    pub secret: String,
    pub verify_token: String,
    pub verify: Vec<String>,
}

impl HubForm {
    /// Parse an `application/x-www-form-urlencoded` body.
    pub fn parse(body: &[u8]) -> Self {
        let mut form = HubForm::default();
        let mut seen = Vec::new();
        for (key, value) in form_urlencoded::parse(body) {
            if key == "hub.verify" {
                form.verify.push(value.into_owned());
                continue;
            }
            if seen.contains(&key) {
                continue;
            }
            let slot = match &*key {
                "hub.mode" => &mut form.mode,
                "hub.topic" => &mut form.topic,
                "hub.callback" => &mut form.callback,
                "hub.lease_seconds" => &mut form.lease_seconds,
                "hub.secret" => &mut form.secret,
                "hub.verify_token" => &mut form.verify_token,
                _ => continue,
            };
            *slot = value.into_owned();
            seen.push(key);
        }
        form
    }
}

/// A validated request, ready for the verification handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub mode: Mode,
    pub topic: String,
    pub callback: Url,
    pub lease_until: DateTime<Utc>,
    pub secret: Option<String>,
    pub verify_token: Option<String>,
    pub verify: VerifyMode,
}

/// How an accepted request proceeds.
#[derive(Debug)]
pub enum Intake {
    /// Verified inline and persisted.
    Verified(Option<Subscription>),
    /// Verification continues on the returned task.
    Accepted(JoinHandle<()>),
}

/// PubSubHubbub hub for this blog's Atom feed.
#[derive(Clone)]
pub struct Hub {
    store: Arc<dyn SubscriptionStore>,
    client: reqwest::Client,
    site: SiteConfig,
    challenge: Option<String>,
}

impl Hub {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        client: reqwest::Client,
        site: SiteConfig,
        challenge: Option<String>,
    ) -> Self {
        Self {
            store,
            client,
            site,
            challenge,
        }
    }

    /// Check a request against the hub's rules. The first failure wins.
    pub fn validate(
        &self,
        form: &HubForm,
        host: &str,
        now: DateTime<Utc>,
    ) -> Result<SubscribeRequest, HubError> {
        let can_async = form.verify.iter().any(|m| m == "async");
        let can_sync = form.verify.iter().any(|m| m == "sync");
        let verify = match (can_async, can_sync) {
            (true, _) => VerifyMode::Async,
            (false, true) => VerifyMode::Sync,
            (false, false) => {
                debug!(modes = ?form.verify, "No supported verification mode");
                return Err(HubError::UnsupportedVerifyMode {
                    requested: form.verify.clone(),
                });
            }
        };

        if form.topic != self.site.topic_url(host) {
            debug!(topic = %form.topic, "Topic not tracked by this hub");
            return Err(HubError::TopicMismatch {
                topic: form.topic.clone(),
            });
        }

        let callback = Url::parse(&form.callback).map_err(|e| {
            debug!(callback = %form.callback, error = %e, "Callback does not parse");
            HubError::InvalidCallback {
                callback: form.callback.clone(),
            }
        })?;
        if !matches!(callback.scheme(), "http" | "https") {
            debug!(callback = %callback, "Callback has unsupported scheme");
            return Err(HubError::UnsupportedScheme {
                scheme: callback.scheme().to_string(),
            });
        }
        if let Some(fragment) = callback.fragment().filter(|f| !f.is_empty()) {
            debug!(callback = %callback, "Callback has a fragment");
            return Err(HubError::CallbackFragment {
                fragment: fragment.to_string(),
            });
        }

        let mode = match form.mode.as_str() {
            "subscribe" => Mode::Subscribe,
            "unsubscribe" => Mode::Unsubscribe,
            other => {
                return Err(HubError::UnsupportedMode {
                    mode: other.to_string(),
                })
            }
        };

        let lease_until = if form.lease_seconds.is_empty() {
            now.checked_add_months(Months::new(1))
                .unwrap_or_else(|| now + Duration::days(30))
        } else {
            let secs: u32 =
                form.lease_seconds
                    .trim()
                    .parse()
                    .map_err(|_| HubError::InvalidLeaseSeconds {
                        value: form.lease_seconds.clone(),
                    })?;
            now + Duration::seconds(i64::from(secs))
        };

        Ok(SubscribeRequest {
            mode,
            topic: form.topic.clone(),
            callback,
            lease_until,
            secret: non_empty(&form.secret),
            verify_token: non_empty(&form.verify_token),
            verify,
        })
    }

    /// Run a validated request according to its verification mode.
    pub async fn intake(&self, req: SubscribeRequest) -> Result<Intake, HubError> {
        match req.verify {
            VerifyMode::Sync => {
                let sub = self.verify(&req, Utc::now()).await?;
                Ok(Intake::Verified(sub))
            }
            VerifyMode::Async => {
                let hub = self.clone();
                let handle = tokio::spawn(async move {
                    match hub.verify(&req, Utc::now()).await {
                        Ok(_) => {}
                        Err(e) => warn!(
                            callback = %req.callback,
                            error = %e,
                            "Dropping unverified subscription request"
                        ),
                    }
                });
                Ok(Intake::Accepted(handle))
            }
        }
    }

    /// Perform the verification handshake and persist on success.
    ///
    /// Returns the stored subscription for `subscribe`, `None` for
    /// `unsubscribe`.
    pub async fn verify(
        &self,
        req: &SubscribeRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, HubError> {
        let challenge = self.challenge.clone().unwrap_or_else(random_challenge);
        let verify_url = verification_url(req, &challenge, now);
        debug!(url = %verify_url, mode = req.mode.as_str(), "Verifying subscriber");

        let resp = self
            .client
            .get(verify_url)
            .send()
            .await
            .map_err(HubError::VerifyTransport)?;
        let body = resp.text().await.map_err(HubError::VerifyTransport)?;
        if !body.contains(&challenge) {
            return Err(HubError::UnverifiedResponse {
                body: truncate(body, MAX_ECHOED_BODY),
            });
        }

        match req.mode {
            Mode::Subscribe => {
                let sub = self
                    .store
                    .upsert_subscription(
                        NewSubscription {
                            url: req.callback.to_string(),
                            lease_until: req.lease_until,
                            secret: req.secret.clone(),
                        },
                        now,
                    )
                    .await?;
                info!(id = sub.id, url = %sub.url, lease_until = %sub.lease_until, "Subscription verified");
                Ok(Some(sub))
            }
            Mode::Unsubscribe => {
                let expired = self
                    .store
                    .expire_subscriptions(req.callback.as_str(), now)
                    .await?;
                info!(url = %req.callback, expired, "Unsubscribe verified");
                Ok(None)
            }
        }
    }
}

/// The callback URL with the handshake parameters set. Every other query
/// parameter the subscriber supplied is kept.
fn verification_url(req: &SubscribeRequest, challenge: &str, now: DateTime<Utc>) -> Url {
    let mut url = req.callback.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !HANDSHAKE_PARAMS.contains(&&**k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.extend_pairs(kept);
        query.append_pair("hub.mode", req.mode.as_str());
        query.append_pair("hub.topic", &req.topic);
        query.append_pair("hub.challenge", challenge);
        if req.mode == Mode::Subscribe {
            let lease = (req.lease_until - now).num_seconds().max(0);
            query.append_pair("hub.lease_seconds", &lease.to_string());
        }
        if let Some(token) = &req.verify_token {
            query.append_pair("hub.verify_token", token);
        }
    }
    url
}

fn random_challenge() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
