use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use chat_api::{ChatApiClient, ChatApiConfig};
use chat_backend::{
    AuthToken, BackendError, ChatBackend, LoginRequest, PageRequest, ProfileUpdate,
    RegisterRequest,
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

#[derive(Clone)]
struct ScriptedResponse {
    status: u16,
    body: String,
    delay_ms: u64,
}

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: String,
    target: String,
    authorization: Option<String>,
    body: String,
}

struct ScriptedServer {
    base_url: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);
            let requests = Arc::clone(&requests);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count, requests).await;
                    });
                }
            }
        });

        Self {
            base_url,
            request_count,
            requests,
            handle,
        }
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn client(&self) -> ChatApiClient {
        ChatApiClient::new(ChatApiConfig::new(&self.base_url)).expect("client")
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

fn response_json(status: u16, body: Value) -> ScriptedResponse {
    ScriptedResponse {
        status,
        body: body.to_string(),
        delay_ms: 0,
    }
}

fn response_raw(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse {
        status,
        body: body.to_owned(),
        delay_ms: 0,
    }
}

fn token() -> AuthToken {
    AuthToken::parse("4f1c0ffee").expect("token")
}

#[tokio::test]
async fn login_posts_credentials_and_parses_token() {
    let server = ScriptedServer::new(vec![response_json(
        200,
        json!({"token": "abc", "user": {"id": 7, "username": "ann", "email": "ann@example.com"}}),
    )])
    .await;

    let response = server
        .client()
        .login(&LoginRequest::new("ann", "secret1"))
        .await
        .expect("login should succeed");

    assert_eq!(response.auth_token(), AuthToken::parse("abc"));
    assert_eq!(response.account().map(|account| account.id), Some(7));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].target, "/api/auth/login/");
    assert!(requests[0].authorization.is_none());
    let body: Value = serde_json::from_str(&requests[0].body).expect("json body");
    assert_eq!(body, json!({"username": "ann", "password": "secret1"}));

    server.shutdown();
}

#[tokio::test]
async fn register_validation_errors_surface_field_messages() {
    let server = ScriptedServer::new(vec![response_json(
        400,
        json!({"username": ["A user with that username already exists."]}),
    )])
    .await;

    let error = server
        .client()
        .register(&RegisterRequest::new("ann", "ann@example.com", "secret1"))
        .await
        .expect_err("register should fail");

    let errors = error.field_errors().expect("validation failure");
    assert_eq!(
        errors.field("username"),
        ["A user with that username already exists.".to_owned()]
    );

    server.shutdown();
}

#[tokio::test]
async fn list_messages_sends_window_and_token_header() {
    let server = ScriptedServer::new(vec![response_json(
        200,
        json!({
            "count": 1,
            "results": [{
                "id": 5,
                "text": "hi",
                "author": {"id": 7, "username": "ann"},
                "created_at": "2026-02-14T10:00:00.000001Z",
            }],
        }),
    )])
    .await;

    let page = server
        .client()
        .list_messages(&token(), PageRequest::default())
        .await
        .expect("list should succeed");

    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].id, 5);

    let requests = server.requests();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].target, "/api/messages/?limit=100&offset=0");
    assert_eq!(requests[0].authorization.as_deref(), Some("Token 4f1c0ffee"));

    server.shutdown();
}

#[tokio::test]
async fn create_message_posts_raw_text() {
    let server = ScriptedServer::new(vec![response_json(
        201,
        json!({
            "id": 42,
            "text": "  hello  ",
            "author": {"id": 7, "username": "ann"},
            "created_at": "2026-02-14T10:00:00Z",
        }),
    )])
    .await;

    let message = server
        .client()
        .create_message(&token(), "  hello  ")
        .await
        .expect("create should succeed");

    assert_eq!(message.id, 42);
    let body: Value = serde_json::from_str(&server.requests()[0].body).expect("json body");
    assert_eq!(body, json!({"text": "  hello  "}));

    server.shutdown();
}

#[tokio::test]
async fn unauthorized_response_is_classified() {
    let server = ScriptedServer::new(vec![response_json(
        401,
        json!({"detail": "Invalid token."}),
    )])
    .await;

    let error = server
        .client()
        .get_profile(&token())
        .await
        .expect_err("profile should fail");

    assert_eq!(error, BackendError::unauthorized("Invalid token."));
    server.shutdown();
}

#[tokio::test]
async fn server_error_is_transient_and_not_retried() {
    let server = ScriptedServer::new(vec![
        response_raw(503, "upstream unavailable"),
        response_json(200, json!({"results": []})),
    ])
    .await;

    let error = server
        .client()
        .list_messages(&token(), PageRequest::default())
        .await
        .expect_err("first request fails");

    assert!(matches!(
        error,
        BackendError::Network {
            status: Some(503),
            ..
        }
    ));
    assert_eq!(server.request_count(), 1);
    server.shutdown();
}

#[tokio::test]
async fn logout_sends_token_and_accepts_ack() {
    let server = ScriptedServer::new(vec![response_json(
        200,
        json!({"message": "Successfully logged out"}),
    )])
    .await;

    server
        .client()
        .logout(&token())
        .await
        .expect("logout should succeed");

    let requests = server.requests();
    assert_eq!(requests[0].target, "/api/auth/logout/");
    assert_eq!(requests[0].authorization.as_deref(), Some("Token 4f1c0ffee"));
    server.shutdown();
}

#[tokio::test]
async fn update_profile_puts_only_changed_fields() {
    let server = ScriptedServer::new(vec![response_json(
        200,
        json!({
            "id": 7,
            "username": "ann",
            "email": "new@example.com",
            "created_at": "2026-01-01T00:00:00Z",
        }),
    )])
    .await;

    let profile = server
        .client()
        .update_profile(&token(), &ProfileUpdate::default().with_email("new@example.com"))
        .await
        .expect("update should succeed");

    assert_eq!(profile.email.as_deref(), Some("new@example.com"));
    let request = &server.requests()[0];
    assert_eq!(request.method, "PUT");
    let body: Value = serde_json::from_str(&request.body).expect("json body");
    assert_eq!(body, json!({"email": "new@example.com"}));
    server.shutdown();
}

#[tokio::test]
async fn malformed_success_body_is_transient() {
    let server = ScriptedServer::new(vec![response_raw(200, "not json")]).await;

    let error = server
        .client()
        .get_profile(&token())
        .await
        .expect_err("decode should fail");

    assert!(matches!(error, BackendError::Network { status: None, .. }));
    server.shutdown();
}

#[tokio::test]
async fn configured_timeout_bounds_slow_responses() {
    let server = ScriptedServer::new(vec![ScriptedResponse {
        status: 200,
        body: json!({"results": []}).to_string(),
        delay_ms: 2_000,
    }])
    .await;
    let client = ChatApiClient::new(
        ChatApiConfig::new(&server.base_url).with_timeout(Duration::from_millis(100)),
    )
    .expect("client");

    let result = timeout(
        Duration::from_secs(5),
        client.list_messages(&token(), PageRequest::default()),
    )
    .await
    .expect("timeout should fire before the guard");

    assert!(matches!(result, Err(BackendError::Network { .. })));
    server.shutdown();
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    let Ok(recorded) = read_request(&mut socket).await else {
        return;
    };
    requests.lock().expect("requests lock").push(recorded);

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_json(500, json!({"error": "unexpected request"})));

    if response.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(response.delay_ms)).await;
    }

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        status_reason(response.status),
        response.body.len(),
    );
    if socket.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    let _ = socket.write_all(response.body.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<RecordedRequest> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 2048];

    let header_end = loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        request.extend_from_slice(&buffer[..n]);
        if let Some(position) = request.windows(4).position(|window| window == b"\r\n\r\n") {
            break position + 4;
        }
    };

    let head = String::from_utf8_lossy(&request[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_owned();
    let target = request_line.next().unwrap_or_default().to_owned();

    let mut content_length = 0usize;
    let mut authorization = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        if name == "content-length" {
            content_length = value.trim().parse().unwrap_or(0);
        } else if name == "authorization" {
            authorization = Some(value.trim().to_owned());
        }
    }

    let mut body = request[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buffer[..n]);
    }

    Ok(RecordedRequest {
        method,
        target,
        authorization,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
