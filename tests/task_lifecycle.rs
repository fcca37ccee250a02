//! End-to-end task lifecycle: submit, background generation, poll

mod common;

use chrono::TimeDelta;
use common::{FakeProvider, Harness, RecordingLedger, Script};
use creez_tasks::billing::QUOTA_EXCEEDED_MESSAGE;
use creez_tasks::provider::{ImageRequest, ModelKey, VideoRequest};
use creez_tasks::worker::GENERATION_FAILED_MESSAGE;
use creez_tasks::{
    GenerationRequest, TaskError, TaskKind, TaskOutcome, TaskStatus, TaskStore, OVERTIME_MESSAGE,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const TEN_MINUTES: Duration = Duration::from_secs(600);

fn image(prompt: &str) -> GenerationRequest {
    GenerationRequest::Image(ImageRequest::new(prompt))
}

#[tokio::test]
async fn test_immediate_poll_after_submit_is_pending() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(FakeProvider::gated(Script::Artifacts(1), gate.clone()));

    let id = h.launcher.submit(image("a red kite")).await.unwrap();
    let views = h
        .poller
        .poll(TaskKind::Image, &[id.clone()], TEN_MINUTES)
        .await
        .unwrap();
    assert_eq!(views[&id].status, TaskStatus::Pending);
    assert!(views[&id].result_urls.is_empty());

    gate.notify_one();
    h.drain().await;

    let views = h
        .poller
        .poll(TaskKind::Image, &[id.clone()], TEN_MINUTES)
        .await
        .unwrap();
    assert_eq!(views[&id].status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_two_artifacts_complete_with_two_urls() {
    let h = Harness::new(FakeProvider::new(Script::Artifacts(2)));

    let id = h.launcher.submit(image("two cats")).await.unwrap();
    h.drain().await;

    let views = h
        .poller
        .poll(TaskKind::Image, &[id.clone()], TEN_MINUTES)
        .await
        .unwrap();
    let view = &views[&id];
    assert_eq!(view.status, TaskStatus::Completed);
    assert_eq!(view.result_urls.len(), 2);
    assert!(view.result_urls.iter().all(|url| !url.is_empty()));
    assert_ne!(view.result_urls[0], view.result_urls[1]);
    assert_eq!(h.artifacts.len(), 2);
    assert_eq!(h.provider.calls(), vec![ModelKey::Seedream40]);

    let json = serde_json::to_value(view).unwrap();
    assert_eq!(json["image_urls"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_provider_error_records_failed() {
    let h = Harness::new(FakeProvider::new(Script::Fail("upstream 500".to_string())));

    let id = h.launcher.submit(image("x")).await.unwrap();
    h.drain().await;

    let task = h.store.get(TaskKind::Image, &id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.result_urls.is_empty());
    assert!(task.message.unwrap().contains("upstream 500"));
    assert!(h.ledger.usages().is_empty());
}

#[tokio::test]
async fn test_provider_panic_records_failed() {
    let h = Harness::new(FakeProvider::new(Script::Panic));

    let id = h.launcher.submit(image("x")).await.unwrap();
    h.drain().await;

    let task = h.store.get(TaskKind::Image, &id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.result_urls.is_empty());
    assert_eq!(task.message.as_deref(), Some(GENERATION_FAILED_MESSAGE));
}

#[tokio::test]
async fn test_quota_failure_has_distinct_message() {
    let h = Harness::with_ledger(
        FakeProvider::new(Script::Artifacts(1)),
        RecordingLedger::denying("broke-user"),
    );

    let mut request = ImageRequest::new("x");
    request.context.user_id = Some("broke-user".to_string());
    let id = h
        .launcher
        .submit(GenerationRequest::Image(request))
        .await
        .unwrap();
    h.drain().await;

    let task = h.store.get(TaskKind::Image, &id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.message.as_deref(), Some(QUOTA_EXCEEDED_MESSAGE));
    assert!(h.provider.calls().is_empty());
}

#[tokio::test]
async fn test_unsupported_model_records_failed() {
    let h = Harness::new(FakeProvider::new(Script::Artifacts(1)));

    let mut request = VideoRequest::new("x");
    request.model = "doubao-seedream-4-0".to_string();
    let id = h
        .launcher
        .submit(GenerationRequest::Video(request))
        .await
        .unwrap();
    h.drain().await;

    let task = h.store.get(TaskKind::Video, &id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(h.provider.calls().is_empty());
}

#[tokio::test]
async fn test_broken_artifact_is_skipped() {
    let h = Harness::new(FakeProvider::new(Script::WithBrokenArtifact(2)));

    let id = h.launcher.submit(image("x")).await.unwrap();
    h.drain().await;

    let task = h.store.get(TaskKind::Image, &id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result_urls.len(), 2);
}

#[tokio::test]
async fn test_no_uploaded_artifacts_records_failed() {
    let h = Harness::new(FakeProvider::new(Script::WithBrokenArtifact(0)));

    let id = h.launcher.submit(image("x")).await.unwrap();
    h.drain().await;

    let task = h.store.get(TaskKind::Image, &id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.result_urls.is_empty());
}

#[tokio::test]
async fn test_usage_recorded_after_success() {
    let h = Harness::new(FakeProvider::new(Script::Artifacts(2)));

    let mut request = ImageRequest::new("x");
    request.context.user_id = Some("u1".to_string());
    h.launcher
        .submit(GenerationRequest::Image(request))
        .await
        .unwrap();
    h.drain().await;

    let usages = h.ledger.usages();
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].user_id.as_deref(), Some("u1"));
    assert_eq!(usages[0].points, 2);
    assert_eq!(usages[0].images_count, Some(2));
    assert_eq!(usages[0].video_count, None);
    assert_eq!(usages[0].response.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_stale_task_scenario() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(FakeProvider::gated(Script::Artifacts(1), gate));

    let id = h.launcher.submit(image("slow")).await.unwrap();
    let created = h.store.get(TaskKind::Image, &id).unwrap().created_at;
    let ids = vec![id.clone()];

    let at_5 = h
        .poller
        .poll_at(TaskKind::Image, &ids, TEN_MINUTES, created + TimeDelta::minutes(5))
        .await
        .unwrap();
    assert_eq!(at_5[&id].status, TaskStatus::Pending);

    let at_10 = h
        .poller
        .poll_at(TaskKind::Image, &ids, TEN_MINUTES, created + TimeDelta::minutes(10))
        .await
        .unwrap();
    assert_eq!(at_10[&id].status, TaskStatus::Pending);

    let at_15 = h
        .poller
        .poll_at(TaskKind::Image, &ids, TEN_MINUTES, created + TimeDelta::minutes(15))
        .await
        .unwrap();
    assert_eq!(at_15[&id].status, TaskStatus::Overtime);
    assert_eq!(at_15[&id].message.as_deref(), Some(OVERTIME_MESSAGE));

    // Stable on the next poll, and the second bulk write has nothing to do
    let again = h
        .poller
        .poll_at(TaskKind::Image, &ids, TEN_MINUTES, created + TimeDelta::minutes(16))
        .await
        .unwrap();
    assert_eq!(again[&id].status, TaskStatus::Overtime);
    assert_eq!(
        h.store.get(TaskKind::Image, &id).unwrap().status,
        TaskStatus::Overtime
    );
}

#[tokio::test]
async fn test_late_success_replaces_overtime() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(FakeProvider::gated(Script::Artifacts(1), gate.clone()));

    let id = h.launcher.submit(image("late")).await.unwrap();
    let created = h.store.get(TaskKind::Image, &id).unwrap().created_at;
    h.poller
        .poll_at(
            TaskKind::Image,
            &[id.clone()],
            TEN_MINUTES,
            created + TimeDelta::minutes(11),
        )
        .await
        .unwrap();
    assert_eq!(
        h.store.get(TaskKind::Image, &id).unwrap().status,
        TaskStatus::Overtime
    );

    gate.notify_one();
    h.drain().await;

    let task = h.store.get(TaskKind::Image, &id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result_urls.len(), 1);
}

#[tokio::test]
async fn test_bulk_write_ignores_ineligible_ids() {
    let h = Harness::new(FakeProvider::new(Script::Artifacts(1)));
    let store: &dyn TaskStore = h.store.as_ref();

    store.insert_pending(TaskKind::Video, "done").await.unwrap();
    store
        .write_outcome(
            TaskKind::Video,
            "done",
            &TaskOutcome::Failed {
                message: "boom".to_string(),
            },
        )
        .await
        .unwrap();

    let updated = store
        .mark_overtime(
            TaskKind::Video,
            &["done".to_string(), "unknown".to_string()],
            OVERTIME_MESSAGE,
        )
        .await
        .unwrap();
    assert_eq!(updated, 0);
    assert_eq!(
        h.store.get(TaskKind::Video, "done").unwrap().status,
        TaskStatus::Failed
    );
}

#[tokio::test]
async fn test_submit_after_shutdown_is_refused() {
    let h = Harness::new(FakeProvider::new(Script::Artifacts(1)));
    h.drain().await;

    let err = h.launcher.submit(image("too late")).await.unwrap_err();
    assert!(matches!(err, TaskError::SchedulerClosed));
    assert!(h.provider.calls().is_empty());
}

#[tokio::test]
async fn test_worker_run_returns_written_outcome() {
    let h = Harness::new(FakeProvider::new(Script::Artifacts(1)));
    h.store.insert_pending(TaskKind::Image, "direct").await.unwrap();

    let outcome = h.worker.run("direct", &image("x")).await;

    assert_eq!(outcome.status(), TaskStatus::Completed);
    assert_eq!(h.store.get(TaskKind::Image, "direct").unwrap().status, TaskStatus::Completed);
}
