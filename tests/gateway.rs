//! Full-server integration tests: routing, access control, CORS.

mod common;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;

use api_gateway::GatewayConfig;

fn single_route_config(addr: SocketAddr, extra: &str) -> GatewayConfig {
    // extra goes first so top-level keys stay top-level
    toml::from_str(&format!(
        r#"
        {extra}

        [[backends]]
        name = "origin-1"
        origin = "http://{addr}"

        [[routes]]
        path_prefix = "/"
        backend = "origin-1"
        "#
    ))
    .unwrap()
}

#[tokio::test]
async fn proxies_to_routed_backend() {
    let addr = common::spawn_ok_backend("hello from upstream").await;
    let gateway = common::start_gateway(single_route_config(addr, "")).await;

    let resp = reqwest::get(format!("http://{gateway}/anything"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "hello from upstream");
}

#[tokio::test]
async fn health_endpoint_answers_without_backend() {
    let addr = common::spawn_ok_backend("unused").await;
    let gateway = common::start_gateway(single_route_config(addr, "")).await;

    let resp = reqwest::get(format!("http://{gateway}/healthz"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn unmatched_path_is_not_found() {
    let addr = common::spawn_ok_backend("api").await;
    let config: GatewayConfig = toml::from_str(&format!(
        r#"
        [[backends]]
        name = "origin-1"
        origin = "http://{addr}"

        [[routes]]
        path_prefix = "/api"
        backend = "origin-1"
        "#
    ))
    .unwrap();
    let gateway = common::start_gateway(config).await;

    let resp = reqwest::get(format!("http://{gateway}/other"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn longest_route_prefix_wins() {
    let v1 = common::spawn_ok_backend("v1").await;
    let v2 = common::spawn_ok_backend("v2").await;
    let config: GatewayConfig = toml::from_str(&format!(
        r#"
        [[backends]]
        name = "v1"
        origin = "http://{v1}"

        [[backends]]
        name = "v2"
        origin = "http://{v2}"

        [[routes]]
        path_prefix = "/api"
        backend = "v1"

        [[routes]]
        path_prefix = "/api/v2"
        backend = "v2"
        "#
    ))
    .unwrap();
    let gateway = common::start_gateway(config).await;

    let resp = reqwest::get(format!("http://{gateway}/api/v2/users"))
        .await
        .unwrap();
    assert_eq!(resp.text().await.unwrap(), "v2");

    let resp = reqwest::get(format!("http://{gateway}/api/users"))
        .await
        .unwrap();
    assert_eq!(resp.text().await.unwrap(), "v1");
}

#[tokio::test]
async fn basic_auth_gates_the_route() {
    let addr = common::spawn_ok_backend("secret content").await;
    let config = single_route_config(
        addr,
        r#"
        access_control = ["ba"]

        [[access_controls]]
        name = "ba"
        type = "basic_auth"
        user = "alice"
        password = "secret"
        "#,
    );
    let gateway = common::start_gateway(config).await;
    let client = reqwest::Client::new();
    let url = format!("http://{gateway}/protected");

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(&url)
        .basic_auth("alice", Some("wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .get(&url)
        .basic_auth("alice", Some("secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "secret content");
}

#[tokio::test]
async fn denied_request_never_reaches_backend() {
    let (addr, calls) = common::spawn_counting_backend(200).await;
    let config = single_route_config(
        addr,
        r#"
        access_control = ["ba"]

        [[access_controls]]
        name = "ba"
        type = "basic_auth"
        user = "alice"
        password = "secret"
        "#,
    );
    let gateway = common::start_gateway(config).await;

    let resp = reqwest::get(format!("http://{gateway}/protected"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn route_can_disable_inherited_control() {
    let addr = common::spawn_ok_backend("open").await;
    let config: GatewayConfig = toml::from_str(&format!(
        r#"
        access_control = ["ba"]

        [[access_controls]]
        name = "ba"
        type = "basic_auth"
        user = "alice"
        password = "secret"

        [[backends]]
        name = "origin-1"
        origin = "http://{addr}"

        [[routes]]
        path_prefix = "/"
        backend = "origin-1"
        disable_access_control = ["ba"]
        "#
    ))
    .unwrap();
    let gateway = common::start_gateway(config).await;

    let resp = reqwest::get(format!("http://{gateway}/open"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn preflight_is_answered_without_backend() {
    let (addr, calls) = common::spawn_counting_backend(200).await;
    let config = single_route_config(
        addr,
        r#"
        [cors]
        allowed_origins = ["http://app.test"]
        max_age_secs = 300
        "#,
    );
    let gateway = common::start_gateway(config).await;

    let resp = reqwest::Client::new()
        .request(
            reqwest::Method::OPTIONS,
            format!("http://{gateway}/resource"),
        )
        .header("Origin", "http://app.test")
        .header("Access-Control-Request-Method", "PUT")
        .header("Access-Control-Request-Headers", "X-Custom")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 204);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "http://app.test"
    );
    assert_eq!(
        resp.headers().get("access-control-allow-methods").unwrap(),
        "PUT"
    );
    assert_eq!(
        resp.headers().get("access-control-allow-headers").unwrap(),
        "X-Custom"
    );
    assert_eq!(resp.headers().get("access-control-max-age").unwrap(), "300");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wildcard_origin_with_credentials_echoes_origin() {
    let addr = common::spawn_ok_backend("cors body").await;
    let config = single_route_config(
        addr,
        r#"
        [cors]
        allowed_origins = ["*"]
        "#,
    );
    let gateway = common::start_gateway(config).await;
    let client = reqwest::Client::new();
    let url = format!("http://{gateway}/resource");

    let resp = client
        .get(&url)
        .header("Origin", "http://app.test")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    let resp = client
        .get(&url)
        .header("Origin", "http://app.test")
        .header("Cookie", "session=1")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "http://app.test"
    );
}

#[tokio::test]
async fn disallowed_origin_gets_no_cors_headers() {
    let addr = common::spawn_ok_backend("body").await;
    let config = single_route_config(
        addr,
        r#"
        [cors]
        allowed_origins = ["http://allowed.test"]
        "#,
    );
    let gateway = common::start_gateway(config).await;

    let resp = reqwest::Client::new()
        .get(format!("http://{gateway}/resource"))
        .header("Origin", "http://denied.test")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn gzip_upstream_body_is_served_decoded() {
    let addr = common::spawn_gzip_backend("compressed upstream payload").await;
    let gateway = common::start_gateway(single_route_config(addr, "")).await;

    let resp = reqwest::get(format!("http://{gateway}/resource"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("content-encoding").is_none());
    assert_eq!(resp.text().await.unwrap(), "compressed upstream payload");
}

#[tokio::test]
async fn upstream_failure_maps_to_bad_gateway() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = common::start_gateway(single_route_config(addr, "")).await;
    let resp = reqwest::get(format!("http://{gateway}/resource"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
}
