//! End-to-end tests: gateway in front of live mock backends.

use std::net::SocketAddr;
use std::time::Duration;
use axum::http::StatusCode;
use lease_gateway::config::{parse_config, GatewayConfig};

mod common;

fn config(kind: &str, backends: &[SocketAddr]) -> GatewayConfig {
    let endpoints = backends
        .iter()
        .map(|a| format!("{{ host = \"{}\", port = {} }}", a.ip(), a.port()))
        .collect::<Vec<_>>()
        .join(", ");
    parse_config(&format!(
        r#"
        [[routes]]
        name = "web"
        path_prefix = "/web"
        load_balancer = {{ kind = "{kind}" }}
        endpoints = [{endpoints}]
        "#
    ))
    .unwrap()
}

async fn body_of(client: &reqwest::Client, url: &str) -> (StatusCode, String) {
    let res = client.get(url).send().await.expect("Gateway unreachable");
    let status = StatusCode::from_u16(res.status().as_u16()).unwrap();
    (status, res.text().await.unwrap())
}

#[tokio::test]
async fn test_round_robin_alternates_backends() {
    let b1 = common::start_mock_backend("b1").await;
    let b2 = common::start_mock_backend("b2").await;
    let gw = common::start_gateway(config("round_robin", &[b1, b2])).await;
    let client = common::client();
    let url = format!("http://{}/web/page", gw.addr);

    let mut bodies = Vec::new();
    for _ in 0..4 {
        let (status, body) = body_of(&client, &url).await;
        assert_eq!(status, StatusCode::OK);
        bodies.push(body);
    }
    assert_eq!(bodies, ["b1", "b2", "b1", "b2"]);

    // every lease went back
    let router = gw.gateway.router();
    let route = router.match_request(None, "/web").unwrap();
    let balancer = gw
        .gateway
        .house()
        .get(route.key(), &route.downstream().endpoints)
        .unwrap();
    assert_eq!(balancer.total_outstanding(), 0);

    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_empty_endpoint_set_is_service_unavailable() {
    let b1 = common::start_mock_backend("b1").await;
    let gw = common::start_gateway(config("least_outstanding", &[b1])).await;
    let client = common::client();
    let url = format!("http://{}/web", gw.addr);

    assert_eq!(body_of(&client, &url).await.0, StatusCode::OK);

    gw.gateway.directory().get("web").unwrap().replace(Vec::new());
    assert_eq!(body_of(&client, &url).await.0, StatusCode::SERVICE_UNAVAILABLE);

    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_unmatched_path_is_not_found() {
    let b1 = common::start_mock_backend("b1").await;
    let gw = common::start_gateway(config("round_robin", &[b1])).await;
    let client = common::client();

    let (status, _) = body_of(&client, &format!("http://{}/other", gw.addr)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_reload_switches_endpoints() {
    let b1 = common::start_mock_backend("b1").await;
    let b2 = common::start_mock_backend("b2").await;
    let gw = common::start_gateway(config("round_robin", &[b1])).await;
    let client = common::client();
    let url = format!("http://{}/web", gw.addr);

    assert_eq!(body_of(&client, &url).await.1, "b1");

    gw.updates.send(config("least_outstanding", &[b2])).unwrap();

    let mut body = String::new();
    for _ in 0..40 {
        body = body_of(&client, &url).await.1;
        if body == "b2" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(body, "b2");
    tokio::time::sleep(Duration::from_millis(25)).await;
    assert_eq!(gw.gateway.house().len(), 1);

    gw.shutdown.trigger();
}
