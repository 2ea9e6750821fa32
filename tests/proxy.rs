use std::time::Duration;

use lodging_scout::error::TierError;
use lodging_scout::models::DestinationQuery;
use lodging_scout::scrapers::proxy::{ProxyClient, ProxySettings, ProxyTier, RetryPolicy};
use lodging_scout::scrapers::types::SearchRequest;
use lodging_scout::scrapers::OfferTier;
use url::Url;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FIXTURE: &str = include_str!("fixtures/search_results.html");

fn settings(server: &MockServer) -> ProxySettings {
    ProxySettings {
        endpoint: format!("{}/", server.uri()),
        api_key: "test-key".into(),
        request_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        },
        ..ProxySettings::default()
    }
}

fn tokyo() -> SearchRequest {
    SearchRequest::new(DestinationQuery::parse("Tokyo, Japan").unwrap()).with_max_offers(Some(5))
}

fn target() -> Url {
    Url::parse("https://www.booking.com/searchresults.html?ss=Tokyo").unwrap()
}

#[tokio::test]
async fn proxy_tier_extracts_rendered_cards() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("api_key", "test-key"))
        .and(query_param("render", "true"))
        .and(query_param("country_code", "us"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .expect(1)
        .mount(&server)
        .await;

    let tier = ProxyTier::new(settings(&server)).unwrap();
    let offers = tier.fetch(&tokyo()).await.unwrap();

    assert_eq!(offers.len(), 3);
    assert_eq!(offers[0].name.as_deref(), Some("Hotel Gracery Shinjuku"));
    assert_eq!(offers[0].price, Some(162.0));
    assert_eq!(offers[1].price, Some(938.0));
    assert_eq!(
        offers[1].booking_url.as_deref(),
        Some("https://www.booking.com/hotel/jp/park-hyatt-tokyo.html")
    );
    assert!(offers[2].images.is_empty());
}

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ProxyClient::new(settings(&server)).unwrap();
    let body = client.fetch_page(&target()).await.unwrap();
    assert_eq!(body, "<html>ok</html>");
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let client = ProxyClient::new(settings(&server)).unwrap();
    assert!(matches!(
        client.fetch_page(&target()).await,
        Err(TierError::Transport(_))
    ));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let client = ProxyClient::new(settings(&server)).unwrap();
    let err = client.fetch_page(&target()).await.unwrap_err();
    assert!(err.to_string().contains("403"));
}
