use crate::common::{create_test_config, host_of, manual_clock, mount_open_robots, mount_robots};
use leadcrawl_fetch::{FetchClient, FetchError, FetchOptions, FetchReason};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_BODY: &str = "<html><body><h1>Our Team</h1></body></html>";

#[tokio::test]
async fn test_robots_disallowed_url_never_hits_network() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private").await;

    Mock::given(method("GET"))
        .and(path("/private/team"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let result = client
        .fetch(&format!("{}/private/team", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.status, 451);
    assert_eq!(result.reason, FetchReason::BlockedByRobots);
    assert!(result.body.is_none());
    assert!(!result.from_cache);
    assert_eq!(result.attempts, 0);

    // Neither the cache nor the throttle was touched
    assert_eq!(client.cache_len(), 0);
    assert!(client.throttle_state(&host_of(&server)).is_none());
}

#[tokio::test]
async fn test_fresh_cache_hit_avoids_second_request() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/team"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(PAGE_BODY, "text/html")
                .insert_header("cache-control", "max-age=60"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let url = format!("{}/team", server.uri());

    let first = client.fetch(&url).await.unwrap();
    assert_eq!(first.status, 200);
    assert_eq!(first.reason, FetchReason::Ok);
    assert!(!first.from_cache);

    let second = client.fetch(&url).await.unwrap();
    assert_eq!(second.status, 200);
    assert_eq!(second.reason, FetchReason::Ok);
    assert!(second.from_cache);
    assert_eq!(second.attempts, 0);
    assert_eq!(second.body, first.body);
    assert_eq!(second.body.as_deref(), Some(PAGE_BODY.as_bytes()));
}

#[tokio::test]
async fn test_stale_entry_is_revalidated_with_etag() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    // Only answers requests that carry the stored validator
    Mock::given(method("GET"))
        .and(path("/team"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304).insert_header("cache-control", "max-age=30"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/team"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(PAGE_BODY, "text/html")
                .insert_header("cache-control", "max-age=0")
                .insert_header("etag", "\"v1\""),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let url = format!("{}/team", server.uri());

    let first = client.fetch(&url).await.unwrap();
    assert_eq!(first.reason, FetchReason::Ok);

    let second = client.fetch(&url).await.unwrap();
    assert_eq!(second.status, 200);
    assert!(second.from_cache);
    assert_eq!(second.reason, FetchReason::ValidatedCache);
    assert_eq!(second.body.as_deref(), Some(PAGE_BODY.as_bytes()));

    // The 304's own max-age now governs freshness
    let third = client.fetch(&url).await.unwrap();
    assert!(third.from_cache);
    assert_eq!(third.reason, FetchReason::Ok);
}

#[tokio::test]
async fn test_server_errors_are_retried_with_exponential_sleeps() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE_BODY, "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let clock = manual_clock();
    let client = FetchClient::with_clock(create_test_config(), clock.clone()).unwrap();
    let result = client
        .fetch(&format!("{}/flaky", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.status, 200);
    assert_eq!(result.reason, FetchReason::Ok);
    assert_eq!(result.attempts, 3);
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(500), Duration::from_millis(1000)]
    );
    assert_eq!(clock.total_slept(), Duration::from_millis(1500));
}

#[tokio::test]
async fn test_exhausted_retries_report_server_error() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let result = client
        .fetch(&format!("{}/down", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.status, 503);
    assert_eq!(result.reason, FetchReason::ServerError);
    assert_eq!(result.attempts, 3);
    assert_eq!(client.cache_len(), 0);

    // Recorded once as a plain response: spacing applied, no strike
    let state = client.throttle_state(&host_of(&server)).unwrap();
    assert_eq!(state.strike_count, 0);
    assert!(state.next_allowed_at.is_some());
}

#[tokio::test]
async fn test_waf_response_is_not_retried_and_cools_off_host() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/people"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE_BODY, "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let clock = manual_clock();
    let client = FetchClient::with_clock(create_test_config(), clock.clone()).unwrap();

    let blocked = client
        .fetch(&format!("{}/people", server.uri()))
        .await
        .unwrap();
    assert_eq!(blocked.status, 429);
    assert_eq!(blocked.reason, FetchReason::WafThrottle);
    assert_eq!(blocked.attempts, 1);
    assert_eq!(
        client.throttle_state(&host_of(&server)).unwrap().strike_count,
        1
    );

    // The next request to the host waits out the base backoff
    let next = client
        .fetch(&format!("{}/about", server.uri()))
        .await
        .unwrap();
    assert_eq!(next.reason, FetchReason::Ok);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
    assert_eq!(
        client.throttle_state(&host_of(&server)).unwrap().strike_count,
        0
    );
}

#[tokio::test]
async fn test_other_statuses_are_returned_as_is() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404).insert_header("etag", "\"missing\""))
        .expect(2)
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let url = format!("{}/gone", server.uri());

    let result = client.fetch(&url).await.unwrap();
    assert_eq!(result.status, 404);
    assert_eq!(result.reason, FetchReason::HttpStatus);
    assert_eq!(result.attempts, 1);
    assert_eq!(client.cache_len(), 0);

    let options = FetchOptions {
        cache_other_statuses: true,
    };
    let result = client.fetch_with(&url, options).await.unwrap();
    assert_eq!(result.status, 404);
    let entry = client.cached_entry(&url).unwrap();
    assert_eq!(entry.status, 404);
    assert!(entry.body.is_none());
    assert_eq!(entry.etag.as_deref(), Some("\"missing\""));
}

#[tokio::test]
async fn test_redirects_are_not_followed() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .expect(1)
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let result = client
        .fetch(&format!("{}/old", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.status, 301);
    assert_eq!(result.reason, FetchReason::HttpStatus);
    assert_eq!(result.headers.get("location").unwrap(), "/new");
}

#[tokio::test]
async fn test_transport_timeouts_are_retried_then_reported() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let mut config = create_test_config();
    config.fetch.request_timeout_secs = 0.2;
    let clock = manual_clock();
    let client = FetchClient::with_clock(config, clock.clone()).unwrap();

    let result = client
        .fetch(&format!("{}/slow", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.status, 0);
    assert_eq!(result.reason, FetchReason::ServerError);
    assert_eq!(result.attempts, 3);
    assert!(result.body.is_none());
    assert_eq!(clock.total_slept(), Duration::from_millis(1500));
}

#[tokio::test]
async fn test_deadline_cancels_without_recording_state() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(PAGE_BODY, "text/html")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let url = format!("{}/slow", server.uri());

    let outcome = client
        .fetch_with_deadline(&url, Duration::from_millis(200))
        .await;

    assert!(matches!(outcome, Err(FetchError::DeadlineExceeded { .. })));
    assert!(client.cached_entry(&url).is_none());
    assert!(client.throttle_state(&host_of(&server)).is_none());
}

#[tokio::test]
async fn test_concurrent_fetches_to_one_host_keep_spacing() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nCrawl-delay: 1.5").await;

    for page in ["/a", "/b"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE_BODY, "text/html"))
            .expect(1)
            .mount(&server)
            .await;
    }

    let clock = manual_clock();
    let client = FetchClient::with_clock(create_test_config(), clock.clone()).unwrap();
    let url_a = format!("{}/a", server.uri());
    let url_b = format!("{}/b", server.uri());

    let (a, b) = tokio::join!(client.fetch(&url_a), client.fetch(&url_b));
    assert_eq!(a.unwrap().reason, FetchReason::Ok);
    assert_eq!(b.unwrap().reason, FetchReason::Ok);

    // Whichever went second waited the full crawl-delay
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(1500)]);
}

#[tokio::test]
async fn test_invalid_url_is_an_error() {
    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();

    assert!(matches!(
        client.fetch("not a url").await,
        Err(FetchError::UrlError(_))
    ));
    assert!(matches!(
        client.fetch("mailto:team@example.com").await,
        Err(FetchError::UrlError(_))
    ));
}

#[tokio::test]
async fn test_clear_state_forgets_everything() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/team"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(PAGE_BODY, "text/html")
                .insert_header("cache-control", "max-age=600"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let url = format!("{}/team", server.uri());
    let host = host_of(&server);

    client.fetch(&url).await.unwrap();
    assert!(client.robots_policy(&host).await.is_some());

    client.clear_state();
    assert_eq!(client.cache_len(), 0);
    assert!(client.throttle_state(&host).is_none());
    assert!(client.robots_policy(&host).await.is_none());

    let again = client.fetch(&url).await.unwrap();
    assert!(!again.from_cache);
}

#[tokio::test]
async fn test_non_ascii_disallow_rule_blocks_encoded_path() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /über").await;

    Mock::given(method("GET"))
        .and(path("/%C3%BCber/team"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE_BODY, "text/html"))
        .expect(0)
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let result = client
        .fetch(&format!("{}/über/team", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.status, 451);
    assert_eq!(result.reason, FetchReason::BlockedByRobots);
    assert_eq!(result.attempts, 0);
}

#[tokio::test]
async fn test_cached_other_status_replays_as_http_status() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let url = format!("{}/gone", server.uri());
    let options = FetchOptions {
        cache_other_statuses: true,
    };

    let first = client.fetch_with(&url, options).await.unwrap();
    assert_eq!(first.status, 404);
    assert_eq!(first.reason, FetchReason::HttpStatus);
    assert!(!first.from_cache);

    let second = client.fetch_with(&url, options).await.unwrap();
    assert_eq!(second.status, 404);
    assert_eq!(second.reason, FetchReason::HttpStatus);
    assert!(second.from_cache);
    assert!(!second.is_success());

    // A plain fetch replays the same entry the same way
    let third = client.fetch(&url).await.unwrap();
    assert_eq!(third.reason, FetchReason::HttpStatus);
    assert!(third.from_cache);
}

#[tokio::test]
async fn test_stale_entry_is_revalidated_with_last_modified() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    let last_modified = "Wed, 01 May 2024 10:00:00 GMT";

    Mock::given(method("GET"))
        .and(path("/team"))
        .and(header("if-modified-since", last_modified))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/team"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(PAGE_BODY, "text/html")
                .insert_header("cache-control", "max-age=0")
                .insert_header("last-modified", last_modified),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let url = format!("{}/team", server.uri());

    let first = client.fetch(&url).await.unwrap();
    assert_eq!(first.reason, FetchReason::Ok);
    assert!(client.cached_entry(&url).unwrap().etag.is_none());

    let second = client.fetch(&url).await.unwrap();
    assert_eq!(second.status, 200);
    assert_eq!(second.reason, FetchReason::ValidatedCache);
    assert_eq!(second.body.as_deref(), Some(PAGE_BODY.as_bytes()));
}

#[tokio::test]
async fn test_forbidden_response_is_waf_throttle_without_retry() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/directory"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let clock = manual_clock();
    let client = FetchClient::with_clock(create_test_config(), clock.clone()).unwrap();
    let result = client
        .fetch(&format!("{}/directory", server.uri()))
        .await
        .unwrap();

    assert_eq!(result.status, 403);
    assert_eq!(result.reason, FetchReason::WafThrottle);
    assert_eq!(result.attempts, 1);
    assert!(clock.sleeps().is_empty());
    assert_eq!(client.cache_len(), 0);
    assert_eq!(
        client.throttle_state(&host_of(&server)).unwrap().strike_count,
        1
    );
}

#[tokio::test]
async fn test_fresh_entry_without_body_is_served_from_cache() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/brochure.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("%PDF-1.7", "application/pdf")
                .insert_header("cache-control", "max-age=60"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let url = format!("{}/brochure.pdf", server.uri());

    let first = client.fetch(&url).await.unwrap();
    assert_eq!(first.reason, FetchReason::Ok);
    assert_eq!(first.body.as_deref(), Some("%PDF-1.7".as_bytes()));
    assert!(!client.cached_entry(&url).unwrap().has_body());

    let second = client.fetch(&url).await.unwrap();
    assert_eq!(second.status, 200);
    assert_eq!(second.reason, FetchReason::Ok);
    assert!(second.from_cache);
    assert!(second.body.is_none());
    assert_eq!(second.attempts, 0);
}

#[tokio::test]
async fn test_close_after_fetch_releases_client() {
    let server = MockServer::start().await;
    mount_open_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/team"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE_BODY, "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let client = FetchClient::with_clock(create_test_config(), manual_clock()).unwrap();
    let result = client
        .fetch(&format!("{}/team", server.uri()))
        .await
        .unwrap();
    assert_eq!(result.reason, FetchReason::Ok);

    client.close();
}
