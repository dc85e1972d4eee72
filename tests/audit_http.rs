mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use tokio::sync::mpsc;
use url_shortener::domain::audit_event::{AuditAction, AuditEvent};
use url_shortener::infrastructure::audit::{
    AuditError, AuditPublisher, AuditSubscriber, HttpSubscriber,
};
use url_shortener::infrastructure::persistence::MemoryStorage;

async fn spawn_receiver(status: StatusCode) -> (String, mpsc::UnboundedReceiver<AuditEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let app = Router::new()
        .route(
            "/audit",
            post(
                move |State(tx): State<mpsc::UnboundedSender<AuditEvent>>,
                 Json(event): Json<AuditEvent>| async move {
                    let _ = tx.send(event);
                    status
                },
            ),
        )
        .with_state(tx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/audit"), rx)
}

#[tokio::test]
async fn test_webhook_receives_event() {
    let (url, mut rx) = spawn_receiver(StatusCode::OK).await;
    let subscriber = HttpSubscriber::new(url);

    subscriber
        .update(&AuditEvent::new(AuditAction::Shorten, "u1", "https://a.example/"))
        .await
        .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.action, AuditAction::Shorten);
    assert_eq!(event.user_id.as_deref(), Some("u1"));
    assert_eq!(event.url, "https://a.example/");
}

#[tokio::test]
async fn test_webhook_error_status_is_delivery_error() {
    let (url, _rx) = spawn_receiver(StatusCode::INTERNAL_SERVER_ERROR).await;
    let subscriber = HttpSubscriber::new(url);

    let result = subscriber
        .update(&AuditEvent::new(AuditAction::Follow, "u1", "https://a.example/"))
        .await;

    assert!(matches!(result, Err(AuditError::Delivery(_))));
}

#[tokio::test]
async fn test_service_redirect_reaches_webhook() {
    let (url, mut rx) = spawn_receiver(StatusCode::OK).await;
    let audit = Arc::new(AuditPublisher::new());
    audit.subscribe(Arc::new(HttpSubscriber::new(url)));
    // a dead endpoint must not stop delivery to the live one
    audit.subscribe(Arc::new(HttpSubscriber::with_timeout(
        "http://127.0.0.1:9/audit",
        Duration::from_millis(200),
    )));

    let service = common::service_with(Arc::new(MemoryStorage::new()), audit);
    let token = service
        .save("", "https://a.example/", "u1")
        .await
        .unwrap()
        .into_token();
    service.follow(&token, "u2").await.unwrap();

    let mut actions = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        actions.push(event.action);
    }

    assert!(actions.contains(&AuditAction::Shorten));
    assert!(actions.contains(&AuditAction::Follow));
}
