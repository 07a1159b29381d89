use crate::common::{create_test_config, host_of, manual_clock, PRODUCT_TOKEN};
use leadcrawl_fetch::crawler::build_robots_client;
use leadcrawl_fetch::{ManualClock, RobotsEngine};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_engine(clock: Arc<ManualClock>) -> RobotsEngine {
    let config = create_test_config();
    let http = build_robots_client(&config.user_agent, &config.fetch).unwrap();
    RobotsEngine::new(config.robots, PRODUCT_TOKEN, http, clock)
}

async fn mount_robots_status(server: &MockServer, template: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(template)
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_agent_specific_group_wins_over_wildcard() {
    let server = MockServer::start().await;
    let body = "User-agent: LeadBot\nDisallow: /private\nCrawl-delay: 3\n\n\
                User-agent: *\nDisallow: /\nCrawl-delay: 10\n";
    mount_robots_status(&server, ResponseTemplate::new(200).set_body_string(body), 1).await;

    let engine = create_engine(manual_clock());
    let host = host_of(&server);

    assert!(!engine.is_allowed(&host, "/private").await);
    assert!(engine.is_allowed(&host, "/public").await);
    assert_eq!(engine.get_crawl_delay(&host).await, 3.0);
}

#[tokio::test]
async fn test_longer_allow_beats_shorter_disallow() {
    let server = MockServer::start().await;
    let body = "User-agent: *\nDisallow: /a\nAllow: /ab\n";
    mount_robots_status(&server, ResponseTemplate::new(200).set_body_string(body), 1).await;

    let engine = create_engine(manual_clock());
    let host = host_of(&server);

    assert!(engine.is_allowed(&host, "/ab").await);
    assert!(!engine.is_allowed(&host, "/a").await);
    assert!(!engine.is_allowed(&host, "/ac").await);
}

#[tokio::test]
async fn test_missing_robots_allows_everything() {
    let server = MockServer::start().await;
    mount_robots_status(&server, ResponseTemplate::new(404), 1).await;

    let engine = create_engine(manual_clock());
    let host = host_of(&server);

    assert!(engine.is_allowed(&host, "/anything").await);
    assert!(engine.is_allowed(&host, "/admin").await);
    assert_eq!(engine.get_crawl_delay(&host).await, 1.0);
}

#[tokio::test]
async fn test_server_error_denies_all_within_deny_ttl() {
    let server = MockServer::start().await;
    mount_robots_status(&server, ResponseTemplate::new(503), 1).await;

    let clock = manual_clock();
    let engine = create_engine(clock.clone());
    let host = host_of(&server);

    assert!(!engine.is_allowed(&host, "/").await);
    clock.advance(Duration::from_secs(30));
    assert!(!engine.is_allowed(&host, "/team").await);

    let policy = engine.policy(&host).await.unwrap();
    assert!(policy.deny_all);
    assert_eq!(policy.ttl, Duration::from_secs(60));
}

#[tokio::test]
async fn test_deny_all_is_rechecked_after_deny_ttl() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_robots_status(
        &server,
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin"),
        1,
    )
    .await;

    let clock = manual_clock();
    let engine = create_engine(clock.clone());
    let host = host_of(&server);

    assert!(!engine.is_allowed(&host, "/team").await);

    clock.advance(Duration::from_secs(60));
    assert!(engine.is_allowed(&host, "/team").await);
    assert!(!engine.is_allowed(&host, "/admin").await);
}

#[tokio::test]
async fn test_policy_is_reused_until_ttl_then_refetched() {
    let server = MockServer::start().await;
    mount_robots_status(
        &server,
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /tmp"),
        2,
    )
    .await;

    let clock = manual_clock();
    let engine = create_engine(clock.clone());
    let host = host_of(&server);

    assert!(!engine.is_allowed(&host, "/tmp").await);
    clock.advance(Duration::from_secs(3599));
    assert!(engine.is_allowed(&host, "/team").await);

    clock.advance(Duration::from_secs(1));
    assert!(!engine.is_allowed(&host, "/tmp/x").await);
}

#[tokio::test]
async fn test_clear_cache_forces_refetch() {
    let server = MockServer::start().await;
    mount_robots_status(
        &server,
        ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"),
        2,
    )
    .await;

    let engine = create_engine(manual_clock());
    let host = host_of(&server);

    assert!(engine.is_allowed(&host, "/").await);
    engine.clear_cache();
    assert!(engine.policy(&host).await.is_none());
    assert!(engine.is_allowed(&host, "/").await);
}

#[tokio::test]
async fn test_concurrent_queries_share_one_fetch() {
    let server = MockServer::start().await;
    mount_robots_status(
        &server,
        ResponseTemplate::new(200)
            .set_body_string("User-agent: *\nDisallow: /x")
            .set_delay(Duration::from_millis(100)),
        1,
    )
    .await;

    let engine = create_engine(manual_clock());
    let host = host_of(&server);

    let (a, b, c) = tokio::join!(
        engine.is_allowed(&host, "/x"),
        engine.is_allowed(&host, "/y"),
        engine.get_crawl_delay(&host),
    );
    assert!(!a);
    assert!(b);
    assert_eq!(c, 1.0);
}

#[tokio::test]
async fn test_sitemaps_are_exposed() {
    let server = MockServer::start().await;
    let body = "Sitemap: https://example.com/people.xml\nUser-agent: *\nDisallow:\n";
    mount_robots_status(&server, ResponseTemplate::new(200).set_body_string(body), 1).await;

    let engine = create_engine(manual_clock());
    let host = host_of(&server);

    assert!(engine.is_allowed(&host, "/").await);
    let policy = engine.policy(&host).await.unwrap();
    assert_eq!(policy.sitemaps(), ["https://example.com/people.xml".to_string()]);
}
