mod fixture;

use std::sync::Arc;

use chat_backend::{Author, BackendError};
use chat_backend_mock::{MockBackend, Operation};
use chat_sync::{SendOutcome, SkipReason, SyncEvent, SyncPhase};
use fixture::{advance_polls, ids, settle, Harness, ANN, ANN_PASSWORD};
use pretty_assertions::assert_eq;

#[tokio::test(start_paused = true)]
async fn initial_fetch_loads_view_and_infers_actor() {
    let harness = Harness::signed_in().await;
    harness.backend.add_account("bob", "bob@example.com", "hunter22");
    harness.backend.seed_message(None, "system notice");
    harness.backend.seed_message(Some("bob"), "hi all");
    harness.backend.seed_message(Some(ANN), "hey bob");

    let handle = harness.engine().activate().expect("signed in");
    assert_eq!(handle.phase(), SyncPhase::Loading);
    assert!(handle.snapshot().is_loading);

    settle().await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, SyncPhase::Ready);
    assert!(!snapshot.is_loading);
    assert_eq!(ids(snapshot.view.messages()), vec![1, 2, 3]);
    // The first author in the batch is adopted, whoever it is.
    assert_eq!(
        snapshot.view.actor().map(|actor| actor.username.as_str()),
        Some("bob")
    );
}

#[tokio::test(start_paused = true)]
async fn every_poll_requests_the_same_window() {
    let harness = Harness::signed_in().await;
    for n in 0..5 {
        harness.backend.seed_message(Some(ANN), &format!("message {n}"));
    }

    let handle = harness.engine().activate().expect("signed in");
    settle().await;
    advance_polls(3).await;

    assert_eq!(harness.backend.calls(Operation::ListMessages), 4);
    let view = handle.view();
    assert_eq!(
        view.messages().iter().filter(|message| message.id == 5).count(),
        1
    );
    assert_eq!(ids(view.messages()), vec![1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn empty_poll_empties_view_and_keeps_actor() {
    let harness = Harness::signed_in().await;
    harness.backend.seed_message(Some(ANN), "one");
    harness.backend.seed_message(Some(ANN), "two");

    let handle = harness.engine().activate().expect("signed in");
    settle().await;
    let actor = handle.view().actor().cloned();
    assert!(actor.is_some());

    harness.backend.set_window_lag(2);
    advance_polls(1).await;

    let view = handle.view();
    assert!(view.is_empty());
    assert_eq!(view.actor().cloned(), actor);
}

#[tokio::test(start_paused = true)]
async fn sent_message_is_appended_and_identifies_actor() {
    let backend = Arc::new(MockBackend::new());
    for n in 1..=6 {
        backend.add_account(&format!("user{n}"), &format!("user{n}@example.com"), "password");
    }
    backend.add_account(ANN, "ann@example.com", ANN_PASSWORD);
    for n in 1..=41 {
        backend.seed_message(None, &format!("anonymous {n}"));
    }
    let harness = Harness::with_backend(backend);
    harness.login().await;

    let handle = harness.engine().activate().expect("signed in");
    settle().await;
    assert_eq!(handle.view().len(), 41);
    assert_eq!(handle.view().actor(), None);

    let outcome = handle.send_message("hello").await.expect("send succeeds");

    let SendOutcome::Sent(message) = outcome else {
        panic!("expected the message to be sent, got {outcome:?}");
    };
    assert_eq!(message.id, 42);
    let view = handle.view();
    assert_eq!(view.last(), Some(&message));
    assert_eq!(view.actor(), Some(&Author::new(7, ANN)));
    assert!(view.is_own(&message));
}

#[tokio::test(start_paused = true)]
async fn overlapping_sends_issue_one_request() {
    let harness = Harness::signed_in().await;
    let handle = harness.engine().activate().expect("signed in");
    settle().await;
    harness.backend.pause(Operation::CreateMessage);

    let (first, second) = tokio::join!(handle.send_message("first"), async {
        tokio::task::yield_now().await;
        assert!(handle.snapshot().sending);
        let outcome = handle.send_message("second").await;
        harness.backend.resume(Operation::CreateMessage);
        outcome
    });

    assert!(matches!(first, Ok(SendOutcome::Sent(_))));
    assert_eq!(second, Ok(SendOutcome::Skipped(SkipReason::InFlight)));
    assert_eq!(harness.backend.calls(Operation::CreateMessage), 1);
    assert!(!handle.snapshot().sending);
    assert_eq!(handle.view().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_send_appends_nothing_and_releases_the_slot() {
    let harness = Harness::signed_in().await;
    let handle = harness.engine().activate().expect("signed in");
    settle().await;

    harness.backend.fail_next(
        Operation::CreateMessage,
        BackendError::network("connection reset"),
    );
    let error = handle
        .send_message("hello")
        .await
        .expect_err("send should fail");
    assert!(matches!(error, BackendError::Network { .. }));
    assert!(handle.view().is_empty());
    assert_eq!(handle.phase(), SyncPhase::Ready);

    let outcome = handle.send_message("hello").await.expect("retry succeeds");
    assert!(matches!(outcome, SendOutcome::Sent(_)));
    assert_eq!(handle.view().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn blank_and_oversized_text_never_reach_the_backend() {
    let harness = Harness::signed_in().await;
    let handle = harness.engine().activate().expect("signed in");
    settle().await;

    assert_eq!(
        handle.send_message("   \n\t").await,
        Ok(SendOutcome::Skipped(SkipReason::Empty))
    );

    let error = handle
        .send_message(&"x".repeat(5001))
        .await
        .expect_err("too long");
    let errors = error.field_errors().expect("validation failure");
    assert_eq!(errors.field("text").len(), 1);

    assert_eq!(harness.backend.calls(Operation::CreateMessage), 0);
}

#[tokio::test(start_paused = true)]
async fn text_is_sent_untrimmed() {
    let harness = Harness::signed_in().await;
    let handle = harness.engine().activate().expect("signed in");
    settle().await;

    handle.send_message("  padded  ").await.expect("send succeeds");

    assert_eq!(harness.backend.messages()[0].text, "  padded  ");
}

#[tokio::test(start_paused = true)]
async fn transient_poll_failure_keeps_phase_and_retries_next_tick() {
    let harness = Harness::signed_in().await;
    harness.backend.seed_message(Some(ANN), "hello");
    harness.backend.set_offline(true);

    let handle = harness.engine().activate().expect("signed in");
    settle().await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, SyncPhase::Loading);
    assert!(!snapshot.is_loading);
    assert!(snapshot.view.is_empty());
    assert!(harness.session.is_authenticated());

    harness.backend.set_offline(false);
    advance_polls(1).await;

    assert_eq!(handle.phase(), SyncPhase::Ready);
    assert_eq!(handle.view().len(), 1);
    assert_eq!(harness.backend.calls(Operation::ListMessages), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_the_loaded_view() {
    let harness = Harness::signed_in().await;
    harness.backend.seed_message(Some(ANN), "hello");

    let handle = harness.engine().activate().expect("signed in");
    settle().await;

    harness.backend.fail_next(
        Operation::ListMessages,
        BackendError::Network {
            status: Some(503),
            message: "upstream unavailable".to_owned(),
        },
    );
    advance_polls(1).await;

    assert_eq!(handle.phase(), SyncPhase::Ready);
    assert_eq!(handle.view().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn refreshing_is_visible_while_a_poll_is_in_flight() {
    let harness = Harness::signed_in().await;
    let handle = harness.engine().activate().expect("signed in");
    settle().await;
    assert_eq!(handle.phase(), SyncPhase::Ready);

    harness.backend.pause(Operation::ListMessages);
    advance_polls(1).await;
    assert_eq!(handle.phase(), SyncPhase::Refreshing);

    harness.backend.seed_message(Some(ANN), "late arrival");
    harness.backend.resume(Operation::ListMessages);
    settle().await;

    assert_eq!(handle.phase(), SyncPhase::Ready);
    assert_eq!(handle.view().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_polls_skip_missed_ticks() {
    let harness = Harness::signed_in().await;
    let handle = harness.engine().activate().expect("signed in");
    settle().await;

    harness.backend.pause(Operation::ListMessages);
    advance_polls(4).await;
    assert_eq!(harness.backend.calls(Operation::ListMessages), 2);

    // One catch-up fetch for all the missed ticks, not one per tick.
    harness.backend.resume(Operation::ListMessages);
    settle().await;
    assert_eq!(harness.backend.calls(Operation::ListMessages), 3);
    assert_eq!(handle.phase(), SyncPhase::Ready);
}

#[tokio::test(start_paused = true)]
async fn events_follow_the_fetch_cycle() {
    let harness = Harness::signed_in().await;
    harness.backend.seed_message(Some(ANN), "hello");

    let handle = harness.engine().activate().expect("signed in");
    let mut events = handle.subscribe();
    settle().await;

    assert_eq!(
        events.try_recv().expect("phase event"),
        SyncEvent::PhaseChanged(SyncPhase::Ready)
    );
    assert_eq!(
        events.try_recv().expect("view event"),
        SyncEvent::ViewReplaced { len: 1 }
    );
    assert_eq!(
        events.try_recv().expect("actor event"),
        SyncEvent::ActorIdentified(Author::new(1, ANN))
    );

    let SendOutcome::Sent(message) = handle.send_message("again").await.expect("send") else {
        panic!("expected a sent message");
    };
    assert_eq!(
        events.try_recv().expect("append event"),
        SyncEvent::MessageAppended(message)
    );
}
