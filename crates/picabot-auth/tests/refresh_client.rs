use axum::http::{HeaderMap, header::COOKIE};
use axum_extra::extract::CookieJar;
use picabot_auth::{
    AuthError, CookiePolicy, CookieReader, RefreshClient, RequestCookies, UpstreamConfig,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request_cookies(cookie_header: Option<&str>) -> RequestCookies {
    let mut headers = HeaderMap::new();
    if let Some(value) = cookie_header {
        headers.insert(COOKIE, value.parse().unwrap());
    }
    RequestCookies::new(CookieJar::from_headers(&headers), CookiePolicy::default())
}

fn client_for(server: &MockServer) -> RefreshClient {
    let upstream = UpstreamConfig {
        base_url: server.uri(),
        ..UpstreamConfig::default()
    };
    RefreshClient::from_config(&upstream, CookiePolicy::default()).expect("refresh client")
}

#[tokio::test]
async fn refresh_persists_new_access_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(header("cookie", "refresh-token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "expires_in": 900
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cookies = request_cookies(Some("access-token=old; refresh-token=r1"));
    let token = client_for(&server).refresh(&cookies).await.expect("refresh");

    assert_eq!(token.as_str(), "new-access");
    assert_eq!(token.cookie_name(), "access-token");
    assert_eq!(cookies.get("access-token").as_deref(), Some("new-access"));
    // Not rotated.
    assert_eq!(cookies.get("refresh-token").as_deref(), Some("r1"));

    let jar = cookies.into_jar();
    let cookie = jar.get("access-token").unwrap();
    assert_eq!(cookie.max_age(), Some(time::Duration::seconds(900)));
    assert_eq!(cookie.http_only(), Some(true));
}

#[tokio::test]
async fn refresh_stores_rotated_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "accessToken": "a2", "refreshToken": "r2" }
        })))
        .mount(&server)
        .await;

    let cookies = request_cookies(Some("refresh-token=r1"));
    client_for(&server).refresh(&cookies).await.expect("refresh");

    assert_eq!(cookies.get("access-token").as_deref(), Some("a2"));
    assert_eq!(cookies.get("refresh-token").as_deref(), Some("r2"));
}

#[tokio::test]
async fn refresh_accepts_string_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a3",
            "expires_in": "600",
            "data": "ok"
        })))
        .mount(&server)
        .await;

    let cookies = request_cookies(Some("refresh-token=r1"));
    let token = client_for(&server).refresh(&cookies).await.expect("refresh");
    assert_eq!(token.as_str(), "a3");

    let jar = cookies.into_jar();
    let cookie = jar.get("access-token").unwrap();
    assert_eq!(cookie.max_age(), Some(time::Duration::seconds(600)));
}

#[tokio::test]
async fn refresh_without_access_token_field_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let cookies = request_cookies(Some("refresh-token=r1"));
    let err = client_for(&server).refresh(&cookies).await.unwrap_err();

    assert!(matches!(err, AuthError::RefreshFailed { .. }));
    assert_eq!(cookies.get("access-token"), None);
}

#[tokio::test]
async fn refresh_rejected_by_upstream_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "refresh token revoked" }
        })))
        .mount(&server)
        .await;

    let cookies = request_cookies(Some("refresh-token=r1"));
    let err = client_for(&server).refresh(&cookies).await.unwrap_err();

    assert_eq!(err, AuthError::refresh_failed("refresh token revoked"));
}

#[tokio::test]
async fn refresh_without_refresh_cookie_skips_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cookies = request_cookies(None);
    let err = client_for(&server).refresh(&cookies).await.unwrap_err();

    assert_eq!(err, AuthError::refresh_failed("no refresh token"));
}

#[tokio::test]
async fn refresh_transport_failure_is_refresh_failed() {
    // Nothing listens on this port.
    let upstream = UpstreamConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        ..UpstreamConfig::default()
    };
    let client = RefreshClient::from_config(&upstream, CookiePolicy::default()).unwrap();

    let cookies = request_cookies(Some("refresh-token=r1"));
    let err = client.refresh(&cookies).await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshFailed { .. }));
}
