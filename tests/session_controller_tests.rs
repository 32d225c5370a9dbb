// Integration tests for the session lifecycle controller
//
// These drive a controller against the in-process fake transport and
// verify transitions, transcript capture and the end-of-call pipeline.

mod common;

use anyhow::Result;
use common::{companion, lesson, wait_for_state, FakeTransport, FlakyStore};
use companion_sessions::conversation::ConversationMessage;
use companion_sessions::evaluation::{EvaluationSource, Evaluator};
use companion_sessions::persistence::{FixedIdentity, SessionQuery, SessionStore, SessionWriter};
use companion_sessions::session::{
    CallStatus, ControllerConfig, ControllerDeps, EndOutcome, SessionController, SessionError,
    Transition,
};
use companion_sessions::voice::TransportEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

struct Harness {
    controller: Arc<SessionController>,
    transport: Arc<FakeTransport>,
    store: Arc<FlakyStore>,
}

fn harness_with(transport: FakeTransport, store: FlakyStore, user: Option<&str>) -> Harness {
    let transport = Arc::new(transport);
    let store = Arc::new(store);

    let mut config = ControllerConfig::for_companion(&companion("c1", "Photosynthesis"));
    config.evaluation_notice = Duration::from_millis(100);

    let identity = Arc::new(FixedIdentity::from_option(user.map(str::to_string)));
    let deps = ControllerDeps {
        transport: transport.clone(),
        evaluator: Evaluator::local_only(),
        writer: SessionWriter::new(store.clone(), identity),
    };

    Harness {
        controller: Arc::new(SessionController::spawn(config, deps)),
        transport,
        store,
    }
}

fn harness() -> Harness {
    harness_with(FakeTransport::new(), FlakyStore::new(), Some("user-1"))
}

#[tokio::test]
async fn test_start_call_becomes_active() -> Result<()> {
    let h = harness();
    assert_eq!(h.controller.status(), CallStatus::Idle);

    let transition = h.controller.start_call().await?;

    assert_eq!(
        transition,
        Transition::Started {
            call_id: "conv-1".to_string()
        }
    );
    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.status, CallStatus::Active);
    assert_eq!(snapshot.call_id.as_deref(), Some("conv-1"));
    assert!(!snapshot.is_muted);

    let configs = h.transport.configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].companion_id, "c1");

    Ok(())
}

#[tokio::test]
async fn test_start_call_while_active_is_ignored() -> Result<()> {
    let h = harness();
    h.controller.start_call().await?;

    let transition = h.controller.start_call().await?;

    assert_eq!(transition, Transition::Ignored(CallStatus::Active));
    assert_eq!(h.transport.session_count(), 1);
    assert_eq!(h.controller.status(), CallStatus::Active);

    Ok(())
}

#[tokio::test]
async fn test_start_and_end_ignored_while_connecting() -> Result<()> {
    let gate = Arc::new(Notify::new());
    let h = harness_with(
        FakeTransport::gated(gate.clone()),
        FlakyStore::new(),
        Some("user-1"),
    );
    let mut state = h.controller.subscribe();

    let controller = h.controller.clone();
    let pending = tokio::spawn(async move { controller.start_call().await });

    wait_for_state(&mut state, |s| s.status == CallStatus::Connecting).await?;

    assert_eq!(
        h.controller.start_call().await?,
        Transition::Ignored(CallStatus::Connecting)
    );
    assert_eq!(
        h.controller.end_call().await?,
        EndOutcome::Ignored(CallStatus::Connecting)
    );

    gate.notify_one();
    let transition = pending.await??;

    assert!(matches!(transition, Transition::Started { .. }));
    assert_eq!(h.controller.status(), CallStatus::Active);
    assert!(h.store.attempts().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_connection_failure_returns_to_idle() -> Result<()> {
    let h = harness();
    h.transport.reject_next("agent unavailable");

    let result = h.controller.start_call().await;

    assert!(matches!(result, Err(SessionError::Connection(_))));
    assert_eq!(h.controller.status(), CallStatus::Idle);
    assert_eq!(h.controller.snapshot().call_id, None);

    // A later attempt may still succeed
    let transition = h.controller.start_call().await?;
    assert!(matches!(transition, Transition::Started { .. }));

    Ok(())
}

#[tokio::test]
async fn test_end_call_when_idle_is_noop() -> Result<()> {
    let h = harness();

    let outcome = h.controller.end_call().await?;

    assert_eq!(outcome, EndOutcome::Ignored(CallStatus::Idle));
    assert!(h.store.attempts().is_empty());
    assert!(!h.controller.snapshot().evaluation_complete);

    Ok(())
}

#[tokio::test]
async fn test_toggle_mute_only_while_active() -> Result<()> {
    let h = harness();
    assert_eq!(h.controller.toggle_mute().await?, None);

    h.controller.start_call().await?;
    let probe = h.transport.last_probe();

    assert_eq!(h.controller.toggle_mute().await?, Some(true));
    assert!(h.controller.snapshot().is_muted);
    assert_eq!(h.controller.toggle_mute().await?, Some(false));
    assert_eq!(probe.mute_calls(), vec![true, false]);

    Ok(())
}

#[tokio::test]
async fn test_transcript_accumulates_in_arrival_order() -> Result<()> {
    let h = harness();
    let mut state = h.controller.subscribe();
    h.controller.start_call().await?;
    let probe = h.transport.last_probe();

    for message in lesson() {
        probe.say(message).await?;
    }

    let snapshot = wait_for_state(&mut state, |s| s.transcript.len() == 4).await?;
    assert_eq!(snapshot.transcript, lesson());
    assert_eq!(h.controller.transcript(), lesson());

    Ok(())
}

#[tokio::test]
async fn test_transport_errors_do_not_end_the_call() -> Result<()> {
    let h = harness();
    let mut state = h.controller.subscribe();
    h.controller.start_call().await?;
    let probe = h.transport.last_probe();

    probe
        .events
        .send(TransportEvent::Error("jitter".to_string()))
        .await?;
    probe.say(ConversationMessage::user("still here?")).await?;

    wait_for_state(&mut state, |s| s.transcript.len() == 1).await?;
    assert_eq!(h.controller.status(), CallStatus::Active);

    Ok(())
}

#[tokio::test]
async fn test_end_call_evaluates_and_saves() -> Result<()> {
    let h = harness();
    h.controller.start_call().await?;
    let probe = h.transport.last_probe();
    for message in lesson() {
        probe.say(message).await?;
    }

    let outcome = h.controller.end_call().await?;

    let EndOutcome::Ended {
        call_id,
        evaluation,
        record,
    } = outcome
    else {
        panic!("expected the call to end");
    };
    assert_eq!(call_id.as_deref(), Some("conv-1"));
    assert!(probe.is_ended());

    let evaluation = evaluation.expect("transcript should be evaluated");
    assert_eq!(evaluation.source, EvaluationSource::Analysis);
    assert_eq!(evaluation.score, 69);
    assert_eq!(evaluation.metrics.engagement, 73);
    assert_eq!(evaluation.metrics.comprehension, 75);
    assert_eq!(evaluation.metrics.participation, 56);
    assert_eq!(evaluation.metrics.duration_secs, 180);
    assert!(evaluation
        .summary
        .starts_with("Completed Photosynthesis discussion with developing performance."));

    let record = record.expect("signed-in user gets a record");
    assert_eq!(record.companion_id, "c1");
    assert_eq!(record.user_id, "user-1");
    assert_eq!(record.vapi_call_id.as_deref(), Some("conv-1"));
    assert_eq!(record.score, Some(69));
    assert_eq!(record.insights.as_ref().map(Vec::len), Some(2));

    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.status, CallStatus::Finished);
    assert!(!snapshot.is_evaluating);
    assert!(snapshot.evaluation_complete);
    assert_eq!(snapshot.call_id, None);
    assert_eq!(snapshot.last_evaluation, Some(evaluation));

    let saved = h.store.select_sessions(&SessionQuery::for_user("user-1")).await?;
    assert_eq!(saved.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_end_call_with_empty_transcript_saves_minimal_record() -> Result<()> {
    let h = harness();
    h.controller.start_call().await?;

    let outcome = h.controller.end_call().await?;

    let EndOutcome::Ended {
        evaluation, record, ..
    } = outcome
    else {
        panic!("expected the call to end");
    };
    assert_eq!(evaluation, None);

    let record = record.expect("minimal record is still saved");
    assert!(!record.has_evaluation());
    assert_eq!(record.summary, None);
    assert_eq!(record.vapi_call_id.as_deref(), Some("conv-1"));
    assert!(h.controller.snapshot().evaluation_complete);

    Ok(())
}

#[tokio::test]
async fn test_end_call_without_user_skips_save() -> Result<()> {
    let h = harness_with(FakeTransport::new(), FlakyStore::new(), None);
    h.controller.start_call().await?;
    let probe = h.transport.last_probe();
    probe.say(ConversationMessage::user("What is light?")).await?;

    let outcome = h.controller.end_call().await?;

    let EndOutcome::Ended {
        evaluation, record, ..
    } = outcome
    else {
        panic!("expected the call to end");
    };
    assert!(evaluation.is_some());
    assert_eq!(record, None);
    assert!(h.store.attempts().is_empty());
    assert!(h.controller.snapshot().evaluation_complete);

    Ok(())
}

#[tokio::test]
async fn test_end_call_falls_back_to_minimal_insert() -> Result<()> {
    let h = harness_with(
        FakeTransport::new(),
        FlakyStore::rejecting_evaluations(),
        Some("user-1"),
    );
    h.controller.start_call().await?;
    let probe = h.transport.last_probe();
    for message in lesson() {
        probe.say(message).await?;
    }

    let outcome = h.controller.end_call().await?;

    let EndOutcome::Ended { record, .. } = outcome else {
        panic!("expected the call to end");
    };
    let record = record.expect("fallback insert succeeds");
    assert!(!record.has_evaluation());
    assert_eq!(record.vapi_call_id, None);

    let attempts = h.store.attempts();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[0].has_evaluation());
    assert!(!attempts[1].has_evaluation());

    Ok(())
}

#[tokio::test]
async fn test_end_call_reports_double_insert_failure() -> Result<()> {
    let h = harness_with(
        FakeTransport::new(),
        FlakyStore::rejecting_everything(),
        Some("user-1"),
    );
    h.controller.start_call().await?;

    let result = h.controller.end_call().await;

    assert!(matches!(result, Err(SessionError::Persistence(_))));
    assert_eq!(h.store.attempts().len(), 2);

    // The call still finished and the pipeline completed
    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.status, CallStatus::Finished);
    assert!(!snapshot.is_evaluating);
    assert!(snapshot.evaluation_complete);

    Ok(())
}

#[tokio::test]
async fn test_evaluation_notice_clears_after_window() -> Result<()> {
    let h = harness();
    let mut state = h.controller.subscribe();
    h.controller.start_call().await?;
    h.controller.end_call().await?;
    assert!(h.controller.snapshot().evaluation_complete);

    let snapshot = wait_for_state(&mut state, |s| !s.evaluation_complete).await?;

    assert_eq!(snapshot.status, CallStatus::Finished);

    Ok(())
}

#[tokio::test]
async fn test_restart_after_finish_resets_state() -> Result<()> {
    let h = harness();
    h.controller.start_call().await?;
    let probe = h.transport.last_probe();
    probe.say(ConversationMessage::user("Why is the sky blue?")).await?;
    h.controller.toggle_mute().await?;
    h.controller.end_call().await?;

    let transition = h.controller.start_call().await?;

    assert_eq!(
        transition,
        Transition::Started {
            call_id: "conv-2".to_string()
        }
    );
    let snapshot = h.controller.snapshot();
    assert_eq!(snapshot.status, CallStatus::Active);
    assert!(snapshot.transcript.is_empty());
    assert!(!snapshot.is_muted);
    assert!(!snapshot.evaluation_complete);
    assert_eq!(snapshot.last_evaluation, None);

    Ok(())
}

#[tokio::test]
async fn test_remote_disconnect_keeps_call_active() -> Result<()> {
    let h = harness();
    let mut state = h.controller.subscribe();
    h.controller.start_call().await?;
    let probe = h.transport.last_probe();

    probe.say(ConversationMessage::user("Bye for now")).await?;
    probe.events.send(TransportEvent::Disconnected).await?;
    wait_for_state(&mut state, |s| s.transcript.len() == 1).await?;

    assert_eq!(h.controller.status(), CallStatus::Active);

    let outcome = h.controller.end_call().await?;
    assert!(matches!(outcome, EndOutcome::Ended { .. }));

    Ok(())
}

#[tokio::test]
async fn test_dropping_controller_ends_live_call() -> Result<()> {
    let h = harness();
    h.controller.start_call().await?;
    let probe = h.transport.last_probe();

    drop(h.controller);

    tokio::time::timeout(Duration::from_secs(2), async {
        while !probe.is_ended() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    Ok(())
}
