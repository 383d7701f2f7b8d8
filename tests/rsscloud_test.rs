// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! RSS-Cloud registration through the router.

mod harness;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cares_hub::store::MemoryStore;
use chrono::{Duration, Utc};
use harness::{app, broken_app, cloud_notify_call, post_xml, send, HOST};

const RSS: &str = "http://blog.example/rss";

#[tokio::test]
async fn test_register_from_peer_address() {
    let store = MemoryStore::new();
    let before = Utc::now();
    let (status, headers, body) = send(
        app(&store),
        post_xml(
            "/rssCloud",
            cloud_notify_call("river.feedUpdated", 5337, "/RPC2", RSS),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/xml");
    assert_eq!(headers["content-length"], body.len().to_string().as_str());
    assert!(body.contains("<boolean>1</boolean>"));

    let clouds = store.rss_clouds().await;
    assert_eq!(clouds.len(), 1);
    assert_eq!(clouds[0].url, "http://192.0.2.7:5337/RPC2");
    assert_eq!(clouds[0].method, "river.feedUpdated");
    assert!(clouds[0].subscribed_until >= before + Duration::hours(25));
}

#[tokio::test]
async fn test_register_prefers_forwarded_for() {
    let store = MemoryStore::new();
    let mut req = post_xml("/rssCloud", cloud_notify_call("ping", 443, "/notify", RSS));
    req.headers_mut().insert(
        "x-forwarded-for",
        "203.0.113.9, 10.0.0.1".parse().unwrap(),
    );
    let (status, _, body) = send(app(&store), req).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<boolean>1</boolean>"));
    assert_eq!(store.rss_clouds().await[0].url, "https://203.0.113.9/notify");
}

#[tokio::test]
async fn test_empty_forwarded_entry_uses_peer() {
    let store = MemoryStore::new();
    let mut req = post_xml("/rssCloud", cloud_notify_call("ping", 80, "/cb", RSS));
    req.headers_mut()
        .insert("x-forwarded-for", ", 10.0.0.1".parse().unwrap());
    let (status, _, body) = send(app(&store), req).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<boolean>1</boolean>"), "{body}");
    assert_eq!(store.rss_clouds().await[0].url, "http://192.0.2.7/cb");
}

#[tokio::test]
async fn test_store_failure_is_server_error() {
    let (status, headers, body) = send(
        broken_app(),
        post_xml("/rssCloud", cloud_notify_call("ping", 80, "/cb", RSS)),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "error saving rsscloud for URL http://192.0.2.7/cb");
    assert_ne!(headers["content-type"], "text/xml");
}

#[tokio::test]
async fn test_malformed_call_is_a_fault() {
    let store = MemoryStore::new();
    let four_params = "<?xml version=\"1.0\"?><methodCall><methodName>cloud.notify</methodName>\
        <params>\
        <param><value>ping</value></param>\
        <param><value><i4>80</i4></value></param>\
        <param><value>/cb</value></param>\
        <param><value>xml-rpc</value></param>\
        </params></methodCall>";
    let (status, headers, body) =
        send(app(&store), post_xml("/rssCloud", four_params.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-length"], body.len().to_string().as_str());
    assert!(body.contains("<name>faultCode</name>"));
    assert!(body.contains("<value><int>4</int></value>"));
    assert!(body.contains("Could not unpack cloud request with 4 params"));
    assert!(store.rss_clouds().await.is_empty());
}

#[tokio::test]
async fn test_foreign_feed_is_a_fault() {
    let store = MemoryStore::new();
    let (status, _, body) = send(
        app(&store),
        post_xml(
            "/rssCloud",
            cloud_notify_call("ping", 80, "/cb", "http://elsewhere.example/rss"),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("is not a feed managed here"));
    assert!(store.rss_clouds().await.is_empty());
}

#[tokio::test]
async fn test_reregistration_keeps_one_record() {
    let store = MemoryStore::new();
    for method in ["first.method", "second.method"] {
        let (status, _, _) = send(
            app(&store),
            post_xml("/rssCloud", cloud_notify_call(method, 8080, "/cb", RSS)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let clouds = store.rss_clouds().await;
    assert_eq!(clouds.len(), 1);
    assert_eq!(clouds[0].method, "second.method");
}

#[tokio::test]
async fn test_rss_cloud_requires_post() {
    let store = MemoryStore::new();
    let req = Request::builder()
        .uri("/rssCloud")
        .header("host", HOST)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(app(&store), req).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let store = MemoryStore::new();
    let app = app(&store);

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, body) = send(app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "healthy");

    let (status, _, _) = send(
        app.clone(),
        post_xml("/rssCloud", cloud_notify_call("ping", 80, "/cb", RSS)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, _, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("cares_hub_cloud_registrations_total{outcome=\"registered\"} 1"));
}
