use std::sync::Arc;
use std::time::Duration;

use bookchat_core::{
    ChatConfig, ChatWidget, ExchangeState, HttpTransport, PayloadFormat, Role, SubmitOutcome,
    CONNECTION_ERROR_MESSAGE,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SESSION: &str = "test-session";

fn config_for(server: &MockServer, streaming: bool) -> ChatConfig {
    ChatConfig {
        api_base_url: Some(format!("{}/api/v1", server.uri())),
        streaming: Some(streaming),
        session_id: Some(SESSION.to_string()),
        timeout_secs: Some(5),
        payload_format: Some(PayloadFormat::Auto),
        log_level: None,
    }
}

fn widget_for(config: &ChatConfig) -> ChatWidget {
    let transport = HttpTransport::new(config.clone()).unwrap();
    ChatWidget::new(Arc::new(transport), config)
}

#[tokio::test]
async fn test_single_response_roundtrip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .and(body_json(json!({
            "session_id": SESSION,
            "message": "What is a digital twin?",
            "mode": "full-book"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": SESSION,
            "response": "A virtual replica of a robot.",
            "sources": [],
            "timestamp": "2024-05-01T10:00:00"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let widget = widget_for(&config_for(&server, false));
    let outcome = widget.submit("What is a digital twin?").await;

    assert_eq!(outcome, SubmitOutcome::Completed(ExchangeState::Done));
    let messages = widget.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "A virtual replica of a robot.");
    assert!(messages[1].sources.is_empty());
}

#[tokio::test]
async fn test_single_response_with_sources() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "See module 1.",
            "sources": [
                {"chunk_id": "c1", "content_snippet": "ROS 2 nodes...", "document_id": "d1", "metadata": {}},
                {"content_snippet": "Topics carry..."}
            ]
        })))
        .mount(&server)
        .await;

    let widget = widget_for(&config_for(&server, false));
    widget.submit("nodes?").await;

    let answer = widget.messages().pop().unwrap();
    assert_eq!(answer.sources.len(), 2);
    assert_eq!(answer.sources[0].content_snippet, "ROS 2 nodes...");
    assert_eq!(answer.sources[1].chunk_id, None);
}

#[tokio::test]
async fn test_single_response_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let widget = widget_for(&config_for(&server, false));
    let outcome = widget.submit("hello").await;

    assert_eq!(outcome, SubmitOutcome::Completed(ExchangeState::Error));
    let last = widget.messages().pop().unwrap();
    assert_eq!(last.role, Role::Error);
    assert_eq!(last.content, "Error: Server error: 503");
}

#[tokio::test]
async fn test_single_response_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let widget = widget_for(&config_for(&server, false));
    widget.submit("hello").await;

    let last = widget.messages().pop().unwrap();
    assert_eq!(last.role, Role::Error);
    assert!(last.content.starts_with("Error: Parsing Error"));
}

#[tokio::test]
async fn test_streamed_answer() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"type\": \"assistant.response\", \"content\": \"Gazebo\"}\n",
        "\n",
        "data: {oops}\n",
        "data: {\"type\": \"assistant.response\", \"content\": \"Gazebo is a simulator.\"}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .and(body_json(json!({
            "thread_id": SESSION,
            "session_id": SESSION,
            "input": "What is Gazebo?",
            "message": "What is Gazebo?"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let widget = widget_for(&config_for(&server, true));
    let outcome = widget.submit("What is Gazebo?").await;

    assert_eq!(outcome, SubmitOutcome::Completed(ExchangeState::Done));
    let messages = widget.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "Gazebo is a simulator.");
}

#[tokio::test]
async fn test_streamed_status_error_is_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let widget = widget_for(&config_for(&server, true));
    let outcome = widget.submit("hello").await;

    assert_eq!(outcome, SubmitOutcome::Completed(ExchangeState::Error));
    let messages = widget.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, CONNECTION_ERROR_MESSAGE);
}

#[tokio::test]
async fn test_streamed_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("data: {\"type\": \"assistant.response\", \"content\": \"late\"}\n", "text/event-stream")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = ChatConfig {
        timeout_secs: Some(1),
        ..config_for(&server, true)
    };
    let widget = widget_for(&config);
    let outcome = widget.submit("hello").await;

    assert_eq!(outcome, SubmitOutcome::Completed(ExchangeState::Error));
    let messages = widget.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Error);
    assert!(!messages.iter().any(|m| m.role == Role::Assistant));
}

#[tokio::test]
async fn test_unreachable_server() {
    let config = ChatConfig {
        api_base_url: Some("http://127.0.0.1:1/api/v1".to_string()),
        streaming: Some(true),
        timeout_secs: Some(5),
        ..ChatConfig::default()
    };
    let widget = widget_for(&config);
    let outcome = widget.submit("anyone there?").await;

    assert_eq!(outcome, SubmitOutcome::Completed(ExchangeState::Error));
    assert_eq!(widget.messages()[1].content, CONNECTION_ERROR_MESSAGE);
}

#[tokio::test]
async fn test_history_and_delete_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/history/{}", SESSION)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": SESSION,
            "messages": [
                {"message_id": "m1", "session_id": SESSION, "role": "user",
                 "content": "hi", "timestamp": "2024-05-01T10:00:00"},
                {"message_id": "m2", "session_id": SESSION, "role": "assistant",
                 "content": "hello", "timestamp": "2024-05-01T10:00:02",
                 "sources": [{"content_snippet": "intro"}]}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/api/v1/session/{}", SESSION)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Session deactivated successfully"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let widget = widget_for(&config_for(&server, true));
    let history = widget.history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].sources[0].content_snippet, "intro");

    assert_eq!(
        widget.end_session().await.unwrap(),
        "Session deactivated successfully"
    );
}

#[tokio::test]
async fn test_history_missing_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/history/{}", SESSION)))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "boom"})))
        .mount(&server)
        .await;

    let widget = widget_for(&config_for(&server, true));
    let err = widget.history().await.unwrap_err();
    assert_eq!(err.display_for_chat(), "Server error: 500");
}

#[tokio::test]
async fn test_history_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/history/{}", SESSION)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"session_id": SESSION, "messages": []}))
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&server)
        .await;

    let config = ChatConfig {
        timeout_secs: Some(1),
        ..config_for(&server, true)
    };
    let widget = widget_for(&config);
    let started = std::time::Instant::now();
    let err = widget.history().await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.display_for_chat(), "Request timed out");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_end_session_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/api/v1/session/{}", SESSION)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "success", "message": "done"}))
                .set_delay(Duration::from_secs(4)),
        )
        .mount(&server)
        .await;

    let config = ChatConfig {
        timeout_secs: Some(1),
        ..config_for(&server, true)
    };
    let widget = widget_for(&config);
    let started = std::time::Instant::now();
    let err = widget.end_session().await.unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(2));
}
