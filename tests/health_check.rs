use actix_web::{test, App, web};
use eliza_server::{AppState, ElizaClient, Settings};
use chrono::DateTime;
use std::time::Duration;

#[actix_web::test]
async fn test_health_check() {
    let config = Settings::from_defaults().expect("Failed to load test config");
    let state = web::Data::new(AppState::new(config).expect("Failed to build state"));

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(eliza_server::health_check))
    ).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body = test::read_body(resp).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "healthy");
    assert_eq!(json["active_sessions"], 0);
    assert!(DateTime::parse_from_rfc3339(
        json["timestamp"].as_str().unwrap()
    ).is_ok());
}

#[actix_web::test]
async fn test_health_check_counts_sessions() {
    let config = Settings::from_defaults().expect("Failed to load test config");
    let state = web::Data::new(AppState::new(config).expect("Failed to build state"));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}{}", listener.local_addr().unwrap(), state.ws_server.path());
    tokio::spawn(state.ws_server.clone().run(listener));

    let mut client = ElizaClient::connect(&url).await.unwrap();
    client.expect_utterances(2, Duration::from_secs(2)).await.unwrap();

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(eliza_server::health_check))
    ).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(json["active_sessions"], 1);
}
