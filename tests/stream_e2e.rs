use axum::{ body::Body, http::{ header, StatusCode }, response::{ IntoResponse, Response }, routing::post, Router };
use bytes::Bytes;
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tutor_stream::chat::{ ChatConfig, ChatState, ChatWidget, NoopObserver };
use tutor_stream::error::ChatError;
use tutor_stream::models::chat::{ ConversationTurn, MessageContent, Role };
use tutor_stream::stream::{ HttpTransport, TransportConfig };

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn sse(chunks: Vec<&'static str>) -> Response {
    let body = futures::stream::iter(chunks).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, Infallible>(Bytes::from_static(chunk.as_bytes()))
    });
    ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(body)).into_response()
}

fn widget_for(base: &str, idle_ms: Option<u64>) -> ChatWidget {
    let transport = HttpTransport::new(&TransportConfig {
        endpoint: format!("{}/chat", base),
        api_key: Some("anon-key".into()),
    }).unwrap();
    ChatWidget::new(Arc::new(transport), ChatConfig {
        subject: "maths".into(),
        idle_timeout: idle_ms.map(Duration::from_millis),
        total_timeout: Some(Duration::from_secs(10)),
    })
}

#[tokio::test]
async fn reply_split_mid_frame_is_reassembled() {
    let app = Router::new().route(
        "/chat",
        post(|| async {
            sse(vec!["data: {\"choices\":[{\"delta\":{\"content\":\"4", "\"}}]}\ndata: [DONE]\n"])
        })
    );
    let base = spawn(app).await;
    let mut chat = widget_for(&base, Some(2000));

    let reply = chat.send("2+2?", &mut NoopObserver, &CancellationToken::new()).await.unwrap();

    assert_eq!(reply, "4");
    assert_eq!(chat.state(), ChatState::Completed);
    assert_eq!(chat.conversation()[0], ConversationTurn::user(MessageContent::Text("2+2?".into())));
    assert_eq!(chat.conversation()[1], ConversationTurn::assistant("4"));
}

#[tokio::test]
async fn request_body_and_headers_reach_endpoint() {
    let app = Router::new().route(
        "/chat",
        post(|headers: axum::http::HeaderMap, body: String| async move {
            let value: serde_json::Value = serde_json::from_str(&body).unwrap();
            let ok =
                value["subject"] == "maths" &&
                value["messages"][0]["role"] == "user" &&
                value["messages"][0]["content"] == "Bonjour" &&
                headers.get("authorization").map(|v| v == "Bearer anon-key").unwrap_or(false) &&
                headers.get("apikey").map(|v| v == "anon-key").unwrap_or(false);
            let reply = if ok {
                "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n"
            } else {
                "data: {\"choices\":[{\"delta\":{\"content\":\"mismatch\"}}]}\n"
            };
            sse(vec![reply])
        })
    );
    let base = spawn(app).await;
    let mut chat = widget_for(&base, None);

    let reply = chat.send("Bonjour", &mut NoopObserver, &CancellationToken::new()).await.unwrap();
    assert_eq!(reply, "ok");
}

#[tokio::test]
async fn error_statuses_fail_without_assistant_turn() {
    let app = Router::new()
        .route(
            "/chat",
            post(|| async {
                (StatusCode::BAD_REQUEST, axum::Json(serde_json::json!({ "error": "Sujet inconnu" })))
            })
        );
    let base = spawn(app).await;
    let mut chat = widget_for(&base, None);

    let err = chat.send("?", &mut NoopObserver, &CancellationToken::new()).await.unwrap_err();

    match err {
        ChatError::Transport { status, message } => {
            assert_eq!(status, Some(400));
            assert_eq!(message, "Sujet inconnu");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(chat.conversation().len(), 1);
    assert_eq!(chat.conversation()[0].role, Role::User);
    assert_eq!(chat.state(), ChatState::Failed);
}

#[tokio::test]
async fn payment_required_maps_to_credit_message() {
    let app = Router::new().route("/chat", post(|| async { (StatusCode::PAYMENT_REQUIRED, "<html>") }));
    let base = spawn(app).await;
    let mut chat = widget_for(&base, None);

    let err = chat.send("?", &mut NoopObserver, &CancellationToken::new()).await.unwrap_err();
    assert!(err.user_message().contains("crédits"));
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let mut chat = widget_for(&base, None);

    let err = chat.send("?", &mut NoopObserver, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ChatError::Transport { status: None, .. }));
    assert_eq!(chat.conversation().len(), 1);
}

#[tokio::test]
async fn stalled_stream_hits_idle_timeout_and_rolls_back() {
    let app = Router::new().route(
        "/chat",
        post(|| async {
            let first = futures::stream::once(async {
                Ok::<_, Infallible>(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n"))
            });
            let body = first.chain(futures::stream::pending());
            ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(body)).into_response()
        })
    );
    let base = spawn(app).await;
    let mut chat = widget_for(&base, Some(200));

    let err = chat.send("?", &mut NoopObserver, &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, ChatError::IdleTimeout(_)));
    assert_eq!(chat.conversation().len(), 1);
}

#[tokio::test]
async fn broken_body_is_stream_read_error() {
    let app = Router::new().route(
        "/chat",
        post(|| async {
            let body = futures::stream::iter(
                vec![
                    Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"moi\"}}]}\n")),
                    Err(std::io::Error::new(std::io::ErrorKind::Other, "upstream died"))
                ]
            ).then(|item| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                item
            });
            ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(body)).into_response()
        })
    );
    let base = spawn(app).await;
    let mut chat = widget_for(&base, Some(2000));

    let err = chat.send("?", &mut NoopObserver, &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, ChatError::StreamRead(_)), "got {:?}", err);
    assert_eq!(chat.conversation().len(), 1);
}
