use chat_api::{normalize_base_url, ChatApiClient, ChatApiConfig, ChatApiError, Endpoint};

#[test]
fn blank_base_url_falls_back_to_default() {
    let url = normalize_base_url("   ").expect("default parses");
    assert_eq!(url.as_str(), "http://127.0.0.1:8000/");
}

#[test]
fn trailing_slash_is_added_once() {
    assert_eq!(
        normalize_base_url("https://chat.example.com/prefix")
            .expect("parses")
            .as_str(),
        "https://chat.example.com/prefix/"
    );
    assert_eq!(
        normalize_base_url("https://chat.example.com/prefix/")
            .expect("parses")
            .as_str(),
        "https://chat.example.com/prefix/"
    );
}

#[test]
fn query_and_fragment_are_dropped() {
    assert_eq!(
        normalize_base_url("http://localhost:8000/?debug=1#top")
            .expect("parses")
            .as_str(),
        "http://localhost:8000/"
    );
}

#[test]
fn non_http_schemes_are_rejected() {
    assert!(matches!(
        normalize_base_url("ftp://chat.example.com"),
        Err(ChatApiError::InvalidBaseUrl(_))
    ));
    assert!(matches!(
        normalize_base_url("not a url"),
        Err(ChatApiError::InvalidBaseUrl(_))
    ));
}

#[test]
fn client_rejects_invalid_base_url() {
    assert!(ChatApiClient::new(ChatApiConfig::new("mailto:someone")).is_err());
}

#[test]
fn endpoint_paths_match_backend_routes() {
    let client = ChatApiClient::new(ChatApiConfig::new("http://localhost:8000")).expect("client");
    let urls: Vec<String> = [
        Endpoint::Register,
        Endpoint::Login,
        Endpoint::Logout,
        Endpoint::Messages,
        Endpoint::Profile,
    ]
    .into_iter()
    .map(|endpoint| client.endpoint(endpoint).expect("joins").to_string())
    .collect();

    assert_eq!(
        urls,
        vec![
            "http://localhost:8000/api/auth/register/",
            "http://localhost:8000/api/auth/login/",
            "http://localhost:8000/api/auth/logout/",
            "http://localhost:8000/api/messages/",
            "http://localhost:8000/api/profile/",
        ]
    );
}
