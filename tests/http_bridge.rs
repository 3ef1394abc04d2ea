//! End-to-end tests for the HTTP side of the bridge.

use axum::http::StatusCode;
use nextjs_bridge::config::NextJsSettings;
use serde_json::Value;

mod common;

#[tokio::test]
async fn bridged_response_streams_with_filtered_headers() {
    let upstream = common::start_mock_upstream().await;
    let host = common::start_bridge(common::dev_settings(&upstream.url()), None).await;

    let res = common::client()
        .get(host.url("/_next/static/chunk.js"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "application/javascript"
    );
    let cookies: Vec<_> = res
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_owned())
        .collect();
    assert_eq!(cookies, vec!["a=1; Path=/", "b=2; Path=/"]);
    assert!(res.headers().get("x-powered-by").is_none());
    assert_eq!(res.text().await.unwrap(), "console.log('hmr');");

    host.stop().await.unwrap();
}

#[tokio::test]
async fn method_query_body_and_headers_are_forwarded() {
    let upstream = common::start_mock_upstream().await;
    let host = common::start_bridge(common::dev_settings(&upstream.url()), None).await;

    let echoed: Value = common::client()
        .post(host.url("/_next/echo?a=1&b=2"))
        .header("x-custom", "kept")
        .body("hello bridge")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["uri"], "/_next/echo?a=1&b=2");
    assert_eq!(echoed["body"], "hello bridge");
    assert_eq!(echoed["x-custom"], "kept");

    host.stop().await.unwrap();
}

#[tokio::test]
async fn empty_query_adds_no_separator() {
    let upstream = common::start_mock_upstream().await;
    let host = common::start_bridge(common::dev_settings(&upstream.url()), None).await;

    let echoed: Value = common::client()
        .get(host.url("/_next/echo"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echoed["uri"], "/_next/echo");

    host.stop().await.unwrap();
}

#[tokio::test]
async fn unreachable_frontend_is_a_bad_gateway() {
    let host = common::start_bridge(common::dev_settings(&common::closed_port_url().await), None).await;

    let res = common::client()
        .get(host.url("/_next/static/chunk.js"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    host.stop().await.unwrap();
}

#[tokio::test]
async fn other_paths_reach_the_application() {
    let frontend = common::start_mock_upstream().await;
    let application = common::start_mock_upstream().await;
    let host = common::start_bridge(
        common::dev_settings(&frontend.url()),
        Some(&application.url()),
    )
    .await;

    let res = common::client().get(host.url("/api/hello")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get("x-app").unwrap(), "primary");
    assert_eq!(res.text().await.unwrap(), "from application");

    assert_eq!(frontend.hits(), 0);
    assert_eq!(application.hits(), 1);

    host.stop().await.unwrap();
}

#[tokio::test]
async fn without_application_other_paths_are_not_found() {
    let frontend = common::start_mock_upstream().await;
    let host = common::start_bridge(common::dev_settings(&frontend.url()), None).await;

    let res = common::client().get(host.url("/api/hello")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(frontend.hits(), 0);

    host.stop().await.unwrap();
}

#[tokio::test]
async fn production_mode_never_bridges() {
    let frontend = common::start_mock_upstream().await;
    let application = common::start_mock_upstream().await;
    let settings = NextJsSettings {
        server_url: frontend.url(),
        ..NextJsSettings::default()
    };
    let host = common::start_bridge(settings, Some(&application.url())).await;

    // Served by the application, with its headers untouched.
    let res = common::client()
        .get(host.url("/_next/static/chunk.js"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get("x-powered-by").unwrap(), "Next.js");

    assert_eq!(frontend.hits(), 0);
    assert_eq!(application.hits(), 1);

    host.stop().await.unwrap();
}
