//! Integration tests driving the ureq client against a real local
//! server.

use certnet_api::*;
use certnet_http_ureq::{UreqHttpClient, UreqHttpClientConfig};
use certnet_test_utils::enable_tracing;
use certnet_test_utils::http_server::TestHttpServer;
use std::str::FromStr;

fn client() -> UreqHttpClient {
    UreqHttpClient::new(UreqHttpClientConfig::default())
}

fn get(url: &str) -> HttpRequest {
    HttpRequest {
        url: FetchUrl::from_str(url).unwrap(),
        verb: HttpVerb::Get,
        body: None,
        timeout_hint: Some(std::time::Duration::from_secs(10)),
    }
}

async fn read_all(mut response: DynHttpResponse) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = response.read_chunk().await.unwrap() {
        out.extend_from_slice(&chunk);
    }
    out
}

#[tokio::test(flavor = "multi_thread")]
async fn fetches_fixture_bodies() {
    enable_tracing();
    let server = TestHttpServer::start().await.unwrap();
    let client = client();

    let response = client
        .start(get(&server.url("/cert.crt")))
        .await
        .unwrap();
    assert_eq!(200, response.status());
    assert_eq!(b"-cert.crt-\n".to_vec(), read_all(response).await);
    assert_eq!(1, server.request_count());
}

#[tokio::test(flavor = "multi_thread")]
async fn follows_plain_http_redirects() {
    enable_tracing();
    let server = TestHttpServer::start().await.unwrap();
    let client = client();

    let response = client
        .start(get(&server.url("/redirect/cert.crt")))
        .await
        .unwrap();
    assert_eq!(200, response.status());
    assert_eq!(b"-cert.crt-\n".to_vec(), read_all(response).await);

    // the redirect itself plus the target
    assert_eq!(2, server.request_count());
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_redirects_to_https() {
    enable_tracing();
    let server = TestHttpServer::start().await.unwrap();
    let client = client();

    let err = client
        .start(get(&server.url("/redirect-https")))
        .await
        .unwrap_err();
    assert_eq!(Some(FetchErrorKind::DisallowedScheme), err.kind());

    // exactly one request was issued before the policy cut in
    assert_eq!(1, server.request_count());
}

#[tokio::test(flavor = "multi_thread")]
async fn surfaces_non_200_statuses_as_responses() {
    enable_tracing();
    let server = TestHttpServer::start().await.unwrap();
    let client = client();

    let response = client
        .start(get(&server.url("/status/404")))
        .await
        .unwrap();
    assert_eq!(404, response.status());
}

#[tokio::test(flavor = "multi_thread")]
async fn decodes_gzip_bodies() {
    enable_tracing();
    let server = TestHttpServer::start().await.unwrap();
    let client = client();

    let response = client
        .start(get(&server.url("/gzipped/root.crl")))
        .await
        .unwrap();
    assert_eq!(200, response.status());
    assert_eq!(b"-root.crl-\n".to_vec(), read_all(response).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn serves_cacheable_responses_after_origin_shutdown() {
    enable_tracing();
    let mut server = TestHttpServer::start().await.unwrap();
    let client = client();
    let url = server.url("/cacheable/ca.crt");

    let response = client.start(get(&url)).await.unwrap();
    assert_eq!(b"-ca.crt-\n".to_vec(), read_all(response).await);
    assert_eq!(1, server.request_count());

    server.shutdown().await;

    // a second fetch succeeds without the origin
    let response = client.start(get(&url)).await.unwrap();
    assert_eq!(200, response.status());
    assert_eq!(b"-ca.crt-\n".to_vec(), read_all(response).await);
    assert_eq!(1, server.request_count());
}

#[tokio::test(flavor = "multi_thread")]
async fn uncacheable_responses_are_not_replayed() {
    enable_tracing();
    let mut server = TestHttpServer::start().await.unwrap();
    let client = client();
    let url = server.url("/cert.crt");

    let response = client.start(get(&url)).await.unwrap();
    assert_eq!(b"-cert.crt-\n".to_vec(), read_all(response).await);

    server.shutdown().await;

    let err = client.start(get(&url)).await.unwrap_err();
    assert_eq!(Some(FetchErrorKind::HttpFailed), err.kind());
}
