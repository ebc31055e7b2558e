//! End-to-end fetch scenarios against the in-memory http client.

use certnet_api::*;
use certnet_core::factories::{
    CoreCertNetFetcherFactory, MemHttpClient, MemRoute,
};
use certnet_core::default_test_builder;
use certnet_test_utils::{enable_tracing, iter_check};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

fn url(u: &str) -> FetchUrl {
    FetchUrl::from_str(u).unwrap()
}

async fn make_fetcher(client: &MemHttpClient) -> DynCertNetFetcher {
    let builder = default_test_builder()
        .with_default_config()
        .unwrap()
        .build();
    CoreCertNetFetcherFactory::create()
        .create(builder, Arc::new(client.clone()))
        .await
        .unwrap()
}

async fn verify_success(expected_body: &str, request: DynFetchRequest) {
    let body = tokio::task::spawn_blocking(move || request.wait_for_result())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(expected_body.as_bytes(), &body[..]);
}

async fn verify_failure(expected: FetchErrorKind, request: DynFetchRequest) {
    let err = tokio::task::spawn_blocking(move || request.wait_for_result())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(Some(expected), err.kind());
}

/// Fetch a few unique urls in parallel. Each gets its own body and its
/// own underlying request.
#[tokio::test(flavor = "multi_thread")]
async fn parallel_fetch_no_duplicates() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route("http://a/cert.crt", MemRoute::ok("-cert.crt-\n"));
    client.set_route("http://a/root.crl", MemRoute::ok("-root.crl-\n"));
    client.set_route("http://a/certs.p7c", MemRoute::ok("-certs.p7c-\n"));
    let fetcher = make_fetcher(&client).await;

    let request1 =
        fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None);
    let request2 = fetcher.fetch_crl(url("http://a/root.crl"), None, None);
    let request3 =
        fetcher.fetch_ca_issuers(url("http://a/certs.p7c"), None, None);

    verify_success("-cert.crt-\n", request1).await;
    verify_success("-root.crl-\n", request2).await;
    verify_success("-certs.p7c-\n", request3).await;

    assert_eq!(3, client.request_count());
}

/// Fetch the same urls in parallel and verify that only one underlying
/// request is made per url, even with some of the duplicates cancelled.
#[tokio::test(flavor = "multi_thread")]
async fn parallel_fetch_duplicates() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route(
        "http://a/cert.crt",
        MemRoute::ok("-cert.crt-\n")
            .with_head_delay(Duration::from_millis(100)),
    );
    client.set_route(
        "http://a/root.crl",
        MemRoute::ok("-root.crl-\n")
            .with_head_delay(Duration::from_millis(100)),
    );
    let fetcher = make_fetcher(&client).await;

    let url1 = url("http://a/cert.crt");
    let url2 = url("http://a/root.crl");

    let request1 = fetcher.fetch_ca_issuers(url1.clone(), None, None);
    let request2 = fetcher.fetch_ca_issuers(url2.clone(), None, None);
    let request3 = fetcher.fetch_ca_issuers(url1.clone(), None, None);
    let request4 = fetcher.fetch_ca_issuers(url2.clone(), None, None);
    let request5 = fetcher.fetch_ca_issuers(url2.clone(), None, None);
    let request6 = fetcher.fetch_ca_issuers(url1.clone(), None, None);

    // cancel all but one of the requests for url1
    drop(request1);
    drop(request3);

    verify_success("-root.crl-\n", request2).await;
    verify_success("-root.crl-\n", request4).await;
    verify_success("-root.crl-\n", request5).await;
    verify_success("-cert.crt-\n", request6).await;

    // 6 fetches, 2 underlying requests
    assert_eq!(2, client.request_count());
}

/// Sequential fetches for the same url do not coalesce; each starts a
/// fresh job once the previous one completed.
#[tokio::test(flavor = "multi_thread")]
async fn sequential_fetches_start_fresh_jobs() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route("http://a/cert.crt", MemRoute::ok("-cert.crt-\n"));
    let fetcher = make_fetcher(&client).await;

    let request =
        fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None);
    verify_success("-cert.crt-\n", request).await;

    let request =
        fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None);
    verify_success("-cert.crt-\n", request).await;

    assert_eq!(2, client.request_count());
}

/// A response body larger than the cap fails the fetch with no body.
#[tokio::test(flavor = "multi_thread")]
async fn too_large() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route("http://a/certs.p7c", MemRoute::ok("-certs.p7c-\n"));
    let fetcher = make_fetcher(&client).await;

    // the body is 12 bytes, so a cap of 11 fails it
    let request =
        fetcher.fetch_ca_issuers(url("http://a/certs.p7c"), None, Some(11));
    verify_failure(FetchErrorKind::FileTooBig, request).await;
}

/// A server that never responds trips the fetch deadline.
#[tokio::test(flavor = "multi_thread")]
async fn hang() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route("http://a/certs.p7c", MemRoute::hang());
    let fetcher = make_fetcher(&client).await;

    let request = fetcher.fetch_ca_issuers(
        url("http://a/certs.p7c"),
        Some(Duration::from_millis(10)),
        None,
    );
    verify_failure(FetchErrorKind::TimedOut, request).await;
}

/// Non-200 responses are failures and their bodies are discarded.
#[tokio::test(flavor = "multi_thread")]
async fn http_status_code() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route("http://a/404.html", MemRoute::status(404));
    client.set_route("http://a/500.html", MemRoute::status(500));
    let fetcher = make_fetcher(&client).await;

    let request =
        fetcher.fetch_ca_issuers(url("http://a/404.html"), None, None);
    verify_failure(FetchErrorKind::HttpFailed, request).await;

    let request =
        fetcher.fetch_ca_issuers(url("http://a/500.html"), None, None);
    verify_failure(FetchErrorKind::HttpFailed, request).await;
}

/// An https url is rejected without any underlying request being made,
/// and the rejection arrives through the handle like any other failure.
#[tokio::test(flavor = "multi_thread")]
async fn https_not_allowed() {
    enable_tracing();
    let client = MemHttpClient::new();
    let fetcher = make_fetcher(&client).await;

    let request =
        fetcher.fetch_ca_issuers(url("https://foopy/foo.crt"), None, None);
    verify_failure(FetchErrorKind::DisallowedScheme, request).await;

    assert_eq!(0, client.request_count());
}

/// A redirect to https fails after exactly one underlying request.
#[tokio::test(flavor = "multi_thread")]
async fn redirect_to_https_not_allowed() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route(
        "http://a/redirect",
        MemRoute::redirect("https://foopy/foo.crt"),
    );
    let fetcher = make_fetcher(&client).await;

    let request =
        fetcher.fetch_ca_issuers(url("http://a/redirect"), None, None);
    verify_failure(FetchErrorKind::DisallowedScheme, request).await;

    assert_eq!(1, client.request_count());
}

/// Cancelling an https fetch right after issuing it must not trip over
/// the scheme rejection racing in from the network thread.
#[tokio::test(flavor = "multi_thread")]
async fn cancel_https_not_allowed() {
    enable_tracing();
    let client = MemHttpClient::new();
    let fetcher = make_fetcher(&client).await;

    let request =
        fetcher.fetch_ca_issuers(url("https://foopy/foo.crt"), None, None);
    drop(request);
}

/// Cancel a fetch and then start another one for the same url.
#[tokio::test(flavor = "multi_thread")]
async fn cancel_then_start() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route(
        "http://a/cert.crt",
        MemRoute::ok("-cert.crt-\n")
            .with_head_delay(Duration::from_millis(50)),
    );
    let fetcher = make_fetcher(&client).await;

    let request1 =
        fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None);
    drop(request1);

    let request2 =
        fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None);

    let request3 =
        fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None);
    drop(request3);

    // all but request2 were cancelled
    verify_success("-cert.crt-\n", request2).await;
}

/// Start duplicate fetches and cancel all of them: the one underlying
/// request is cancelled and the job does not linger.
#[tokio::test(flavor = "multi_thread")]
async fn cancel_all() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route("http://a/cert.crt", MemRoute::hang());
    let fetcher = make_fetcher(&client).await;

    let requests = (0..3)
        .map(|_| {
            fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None)
        })
        .collect::<Vec<_>>();

    // let the one underlying request actually start before cancelling
    iter_check!({
        if client.request_count() == 1 {
            break;
        }
    });

    drop(requests);

    iter_check!({
        if fetcher.state_summary().await.unwrap().jobs.is_empty()
            && client.active_response_count() == 0
        {
            break;
        }
    });

    assert_eq!(1, client.request_count());
}
