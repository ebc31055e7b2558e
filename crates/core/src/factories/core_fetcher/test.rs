use crate::factories::{
    CertNetFetcherModConfig, CoreCertNetFetcherFactory, MemHttpClient,
    MemRoute,
};
use certnet_api::*;
use certnet_test_utils::{enable_tracing, iter_check};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

fn url(u: &str) -> FetchUrl {
    FetchUrl::from_str(u).unwrap()
}

async fn make_fetcher(client: &MemHttpClient) -> DynCertNetFetcher {
    let builder = crate::default_test_builder()
        .with_default_config()
        .unwrap()
        .build();
    CoreCertNetFetcherFactory::create()
        .create(builder, Arc::new(client.clone()))
        .await
        .unwrap()
}

async fn wait(request: DynFetchRequest) -> FetchResult<bytes::Bytes> {
    tokio::task::spawn_blocking(move || request.wait_for_result())
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn default_caps_resolve_per_method() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route("http://a/aia.crt", MemRoute::hang());
    client.set_route("http://a/list.crl", MemRoute::hang());
    let fetcher = make_fetcher(&client).await;

    let _r1 = fetcher.fetch_ca_issuers(url("http://a/aia.crt"), None, None);
    let _r2 = fetcher.fetch_crl(url("http://a/list.crl"), None, None);

    iter_check!({
        let summary = fetcher.state_summary().await.unwrap();
        if summary.jobs.len() == 2 {
            for (key, attached) in summary.jobs {
                assert_eq!(1, attached);
                match key.method {
                    FetchMethod::CaIssuers => {
                        assert_eq!(64 * 1024, key.max_response_bytes)
                    }
                    FetchMethod::Crl => {
                        assert_eq!(5 * 1024 * 1024, key.max_response_bytes)
                    }
                    method => panic!("unexpected method {method:?}"),
                }
            }
            break;
        }
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn distinct_methods_do_not_coalesce() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route(
        "http://a/artifact",
        MemRoute::ok("-artifact-\n")
            .with_head_delay(Duration::from_millis(100)),
    );
    let fetcher = make_fetcher(&client).await;

    // same url and cap, different methods: two distinct fetch keys
    let r1 = fetcher.fetch_ca_issuers(url("http://a/artifact"), None, Some(64));
    let r2 = fetcher.fetch_ocsp(url("http://a/artifact"), None, Some(64));

    assert_eq!(b"-artifact-\n".to_vec(), wait(r1).await.unwrap());
    assert_eq!(b"-artifact-\n".to_vec(), wait(r2).await.unwrap());
    assert_eq!(2, client.request_count());
}

#[tokio::test(flavor = "multi_thread")]
async fn chunked_body_is_reassembled_in_order() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route(
        "http://a/big.crl",
        MemRoute::ok("abcdefghijklmnopqrstuvwxyz").with_chunk_size(3),
    );
    let fetcher = make_fetcher(&client).await;

    let request = fetcher.fetch_crl(url("http://a/big.crl"), None, None);
    assert_eq!(
        b"abcdefghijklmnopqrstuvwxyz".to_vec(),
        wait(request).await.unwrap(),
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn body_over_cap_fails_mid_stream() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route(
        "http://a/certs.p7c",
        MemRoute::ok("-certs.p7c-\n").with_chunk_size(5),
    );
    let fetcher = make_fetcher(&client).await;

    // 12 byte body against an 11 byte cap fails on the third chunk
    let request =
        fetcher.fetch_ca_issuers(url("http://a/certs.p7c"), None, Some(11));
    let err = wait(request).await.unwrap_err();
    assert_eq!(Some(FetchErrorKind::FileTooBig), err.kind());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_the_last_handle_cancels_the_job() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route("http://a/cert.crt", MemRoute::hang());
    let fetcher = make_fetcher(&client).await;

    let r1 = fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None);
    let r2 = fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None);
    let r3 = fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None);

    iter_check!({
        let summary = fetcher.state_summary().await.unwrap();
        if summary.jobs.values().copied().collect::<Vec<_>>() == [3]
            && client.request_count() == 1
        {
            break;
        }
    });

    drop(r1);
    drop(r2);
    drop(r3);

    iter_check!({
        let summary = fetcher.state_summary().await.unwrap();
        if summary.jobs.is_empty() {
            break;
        }
    });

    // one underlying request was started, and it is gone now
    assert_eq!(1, client.request_count());
    assert_eq!(0, client.active_response_count());
}

#[tokio::test(flavor = "multi_thread")]
async fn teardown_aborts_waiters() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route("http://a/cert.crt", MemRoute::hang());
    let fetcher = make_fetcher(&client).await;

    let request =
        fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None);
    let waiter =
        tokio::task::spawn_blocking(move || request.wait_for_result());

    // make sure the job is attached before tearing down
    iter_check!({
        if !fetcher.state_summary().await.unwrap().jobs.is_empty() {
            break;
        }
    });

    drop(fetcher);

    let err = waiter.await.unwrap().unwrap_err();
    assert_eq!(Some(FetchErrorKind::Aborted), err.kind());
}

#[tokio::test(flavor = "multi_thread")]
async fn completed_handle_drop_does_not_cancel_anything() {
    enable_tracing();
    let client = MemHttpClient::new();
    client.set_route("http://a/cert.crt", MemRoute::ok("-cert.crt-\n"));
    let fetcher = make_fetcher(&client).await;

    let request =
        fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None);

    // wait for completion through the registry rather than the handle
    iter_check!({
        if fetcher.state_summary().await.unwrap().jobs.is_empty()
            && client.request_count() == 1
        {
            break;
        }
    });

    // dropping the completed-but-unwaited handle is a plain release
    drop(request);

    let request =
        fetcher.fetch_ca_issuers(url("http://a/cert.crt"), None, None);
    assert_eq!(b"-cert.crt-\n".to_vec(), wait(request).await.unwrap());
}

#[test]
fn config_validation_rejects_zero_values() {
    let factory = CoreCertNetFetcherFactory::create();

    let check = |config: CertNetFetcherModConfig| {
        let mut full = certnet_api::config::Config::default();
        full.set_module_config(&config).unwrap();
        factory.validate_config(&full)
    };

    assert!(check(CertNetFetcherModConfig::default()).is_ok());

    let mut config = CertNetFetcherModConfig::default();
    config.cert_net_fetcher.timeout_ms = 0;
    assert!(check(config).is_err());

    let mut config = CertNetFetcherModConfig::default();
    config.cert_net_fetcher.max_crl_response_bytes = 0;
    assert!(check(config).is_err());
}
