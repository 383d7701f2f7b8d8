// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! RSS-Cloud registration.
//!
//! Subscribers register with a `cloud.notify` XML-RPC call naming the port,
//! path and method to call back. The callback host is never taken from the
//! request body; it is the address the request came from.

use crate::config::{CloudConfig, SiteConfig};
use crate::store::{RssCloud, RssCloudStore, StoreError};
use crate::xmlrpc::{self, Element, Node, XmlError};
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

/// The only procedure a registrant may call.
pub const NOTIFY_METHOD: &str = "cloud.notify";

/// Registration errors. Everything but `Store` becomes an XML-RPC fault.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("Could not find cloud request's request method")]
    MissingMethodName,

    #[error("Could not unpack cloud request with {0} params")]
    ParamCount(usize),

    #[error("Could not unpack cloud request with {0} param not text")]
    NotText(&'static str),

    #[error("Could not unpack cloud request with {0} param not an element")]
    NotElement(&'static str),

    #[error("Could not unpack cloud request with second param a {0} element, not int or i4")]
    PortNotInt(String),

    #[error("Could not unpack cloud request with port {0}")]
    InvalidPort(String),

    #[error("Could not unpack cloud request with fifth param a {0} element, not array")]
    NotArray(String),

    #[error("Could not unpack cloud request with fifth param containing no data values")]
    EmptyArray,

    #[error("Unknown method {0}")]
    UnknownMethod(String),

    #[error("Only XML-RPC is supported")]
    NotXmlRpc,

    #[error("RSS URL {0} is not a feed managed here")]
    ForeignFeed(String),

    #[error("Could not determine the address to call back")]
    UnknownRegistrant,

    #[error("Could not build a callback URL for host {0}")]
    InvalidCallbackHost(String),

    #[error("error saving rsscloud for URL {url}")]
    Store {
        url: String,
        #[source]
        source: StoreError,
    },
}

/// A decoded `cloud.notify` call, exactly as the registrant sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudRequest {
    /// The procedure invoked, expected to be `cloud.notify`.
    pub request_method: String,
    /// Method to call back on future notifications.
    pub method_name: String,
    pub port: u16,
    pub path: String,
    /// Protocol indicator, untrimmed.
    pub protocol: String,
    pub feed_url: String,
}

impl CloudRequest {
    /// Parse and unpack a request body.
    pub fn parse(body: &str) -> Result<Self, CloudError> {
        let root = xmlrpc::parse(body)?;
        Self::unpack(&root)
    }

    /// Walk a `methodCall` tree by position.
    pub fn unpack(root: &Element) -> Result<Self, CloudError> {
        let names = root.find_all("methodName");
        let request_method = match names.as_slice() {
            [name] => name.text().trim().to_string(),
            _ => return Err(CloudError::MissingMethodName),
        };
        if request_method.is_empty() {
            return Err(CloudError::MissingMethodName);
        }

        let params = root.find_all("params/param/value");
        let [method, port, path, protocol, feeds] = params.as_slice() else {
            return Err(CloudError::ParamCount(params.len()));
        };

        let method_name = text_value(method).ok_or(CloudError::NotText("first"))?;

        let port = match port.first_child() {
            Some(Node::Element(e)) if e.name == "int" || e.name == "i4" => {
                let digits = match e.first_child() {
                    Some(Node::Text(t)) => t.trim(),
                    _ => return Err(CloudError::NotText("second")),
                };
                digits
                    .parse::<u16>()
                    .map_err(|_| CloudError::InvalidPort(digits.to_string()))?
            }
            Some(Node::Element(e)) => return Err(CloudError::PortNotInt(e.name.clone())),
            _ => return Err(CloudError::NotElement("second")),
        };

        let path = text_value(path).ok_or(CloudError::NotText("third"))?;
        let protocol = text_value(protocol).ok_or(CloudError::NotText("fourth"))?;

        let feed_url = match feeds.first_child() {
            Some(Node::Element(e)) if e.name == "array" => e
                .find_all("data/value")
                .into_iter()
                .find_map(text_value)
                .ok_or(CloudError::EmptyArray)?,
            Some(Node::Element(e)) => return Err(CloudError::NotArray(e.name.clone())),
            _ => return Err(CloudError::NotElement("fifth")),
        };

        debug!(method = %method_name, port, path = %path, "Unpacked cloud request");
        Ok(Self {
            request_method,
            method_name,
            port,
            path,
            protocol,
            feed_url,
        })
    }

    pub fn is_xml_rpc(&self) -> bool {
        self.protocol.trim() == "xml-rpc"
    }
}

/// The string carried by a `<value>`: bare text, or a `<string>` element.
fn text_value(value: &Element) -> Option<String> {
    match value.first_child()? {
        Node::Text(t) => Some(t.clone()),
        Node::Element(e) if e.name == "string" => Some(e.text()),
        Node::Element(_) => None,
    }
}

/// Host of the registrant: the first `X-Forwarded-For` entry when it is
/// non-empty, otherwise the peer address. Any port is stripped.
pub fn registrant_host(forwarded_for: Option<&str>, peer: Option<SocketAddr>) -> Option<String> {
    let first = forwarded_for
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|entry| !entry.is_empty());
    let host = match first {
        Some(entry) => strip_port(entry),
        None => peer?.ip().to_string(),
    };
    (!host.is_empty()).then_some(host)
}

fn strip_port(addr: &str) -> String {
    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return sock.ip().to_string();
    }
    if addr.parse::<IpAddr>().is_ok() {
        return addr.to_string();
    }
    if let Some(inner) = addr.strip_prefix('[').and_then(|a| a.strip_suffix(']')) {
        return inner.to_string();
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            host.to_string()
        }
        _ => addr.to_string(),
    }
}

/// Canonical callback URL: `https` only on 443, default ports omitted.
pub fn callback_url(host: &str, port: u16, path: &str) -> Result<String, CloudError> {
    let scheme = if port == 443 { "https" } else { "http" };
    let authority = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    let invalid = || CloudError::InvalidCallbackHost(host.to_string());

    let mut url = Url::parse(&format!("{scheme}://{authority}/")).map_err(|_| invalid())?;
    if port != 80 && port != 443 {
        url.set_port(Some(port)).map_err(|_| invalid())?;
    }
    url.set_path(path);
    Ok(url.to_string())
}

/// RSS-Cloud endpoint for this blog's RSS feed.
#[derive(Clone)]
pub struct RssCloudHub {
    store: Arc<dyn RssCloudStore>,
    site: SiteConfig,
    cloud: CloudConfig,
}

impl RssCloudHub {
    pub fn new(store: Arc<dyn RssCloudStore>, site: SiteConfig, cloud: CloudConfig) -> Self {
        Self { store, site, cloud }
    }

    /// Validate a registration and upsert it.
    ///
    /// `server_host` is the host this request was addressed to; `registrant`
    /// is where callbacks will go.
    pub async fn register(
        &self,
        body: &str,
        server_host: &str,
        registrant: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RssCloud, CloudError> {
        let request = CloudRequest::parse(body)?;

        if request.request_method != NOTIFY_METHOD {
            return Err(CloudError::UnknownMethod(request.request_method));
        }
        if !request.is_xml_rpc() {
            return Err(CloudError::NotXmlRpc);
        }
        if request.feed_url != self.site.rss_url(server_host) {
            return Err(CloudError::ForeignFeed(request.feed_url));
        }

        let host = registrant.ok_or(CloudError::UnknownRegistrant)?;
        let url = callback_url(&host, request.port, &request.path)?;
        debug!(url = %url, method = %request.method_name, "Registering cloud callback");

        let cloud = self
            .store
            .upsert_rss_cloud(&url, &request.method_name, now + self.cloud.lease(), now)
            .await
            .map_err(|source| CloudError::Store {
                url: url.clone(),
                source,
            })?;
        info!(id = cloud.id, url = %cloud.url, until = %cloud.subscribed_until, "RSS cloud registered");
        Ok(cloud)
    }
}

/// The HTTP response for a registration attempt.
pub fn respond(result: &Result<RssCloud, CloudError>) -> Response {
    let body = match result {
        Ok(_) => xmlrpc::success_response(),
        Err(CloudError::Store { url, source }) => {
            error!(url = %url, error = %source, "Could not save rss cloud");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("error saving rsscloud for URL {url}"),
            )
                .into_response();
        }
        Err(e) => {
            warn!(error = %e, "Rejected rss cloud request");
            xmlrpc::fault_response(&e.to_string())
        }
    };
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/xml".to_string()),
            (header::CONTENT_LENGTH, body.len().to_string()),
        ],
        body,
    )
        .into_response()
}
