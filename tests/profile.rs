mod fixture;

use chat_backend::BackendError;
use chat_backend_mock::Operation;
use chat_sync::{ProfileService, Route};
use fixture::{Harness, ANN};

#[tokio::test]
async fn fetch_returns_the_signed_in_account() {
    let harness = Harness::signed_in().await;
    let service = ProfileService::new(harness.navigator.clone());

    let profile = service.fetch().await.expect("profile");

    assert_eq!(profile.username, ANN);
    assert_eq!(profile.email.as_deref(), Some("ann@example.com"));
}

#[tokio::test]
async fn update_sends_only_given_fields() {
    let harness = Harness::signed_in().await;
    let service = ProfileService::new(harness.navigator.clone());

    let profile = service
        .update(None, Some("ann@new.example.com"))
        .await
        .expect("update");

    assert_eq!(profile.username, ANN);
    assert_eq!(profile.email.as_deref(), Some("ann@new.example.com"));
}

#[tokio::test]
async fn taken_fields_surface_as_validation() {
    let harness = Harness::signed_in().await;
    harness.backend.add_account("bob", "bob@example.com", "hunter22");
    let service = ProfileService::new(harness.navigator.clone());

    let error = service
        .update(Some("bob"), Some("bob@example.com"))
        .await
        .expect_err("both fields are taken");

    let errors = error.field_errors().expect("validation failure");
    assert_eq!(
        errors.summary(),
        "A user with that username already exists. A user with that email already exists."
    );
    assert!(harness.session.is_authenticated());
}

#[tokio::test]
async fn rejected_credential_forces_logout() {
    let harness = Harness::signed_in().await;
    harness.backend.revoke_all_tokens();
    let service = ProfileService::new(harness.navigator.clone());

    let error = service.fetch().await.expect_err("token revoked");

    assert!(error.is_unauthorized());
    assert!(!harness.session.is_authenticated());
    assert_eq!(harness.navigator.pending_redirect(), Some(Route::Login));
}

#[tokio::test]
async fn missing_token_skips_the_request() {
    let harness = Harness::signed_out();
    let service = ProfileService::new(harness.navigator.clone());

    let error = service.fetch().await.expect_err("no session");

    assert!(error.is_unauthorized());
    assert_eq!(harness.navigator.pending_redirect(), Some(Route::Login));
    assert_eq!(harness.backend.calls(Operation::GetProfile), 0);
}

#[tokio::test]
async fn transient_failures_keep_the_session() {
    let harness = Harness::signed_in().await;
    harness.backend.set_offline(true);
    let service = ProfileService::new(harness.navigator.clone());

    let error = service.fetch().await.expect_err("offline");

    assert!(matches!(error, BackendError::Network { .. }));
    assert!(harness.session.is_authenticated());
    assert_eq!(harness.navigator.pending_redirect(), None);
}
