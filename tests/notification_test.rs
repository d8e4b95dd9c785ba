//! Notification stage behaviour on the notification queue.

mod helpers;

use std::sync::atomic::Ordering;

use bytes::Bytes;

use audiopipe_core::traits::broker::MessageBroker;
use audiopipe_entity::job::JobStatus;
use audiopipe_entity::notification::DeliveryStatus;

use helpers::TestPipeline;

#[tokio::test]
async fn test_malformed_messages_are_dropped_without_side_effects() {
    let pipeline = TestPipeline::new();
    let job_id = pipeline.submit("movie.mp4", b"movie").await;
    let before = pipeline.job(&job_id).await;

    let queue = pipeline.notification_queue().to_string();
    for payload in [
        "not json at all".to_string(),
        format!(r#"{{"job_id":"{job_id}","status":"completed"}}"#),
        format!(r#"{{"user_id":"user@example.com","job_id":"{job_id}"}}"#),
        format!(r#"{{"user_id":"no-at-sign","job_id":"{job_id}","status":"completed"}}"#),
    ] {
        pipeline.broker.publish(&queue, Bytes::from(payload)).await.unwrap();
    }
    // A well-formed message queued behind them proves the queue kept moving.
    pipeline
        .broker
        .publish(
            &queue,
            Bytes::from(r#"{"user_id":"other@example.com","job_id":"J9","status":"completed","error":null}"#),
        )
        .await
        .unwrap();

    let notifications = audiopipe_worker::WorkerRunner::new(
        pipeline.manager.clone(),
        std::sync::Arc::new(audiopipe_worker::jobs::NotificationHandler::new(
            pipeline.notification.clone(),
        )),
        pipeline.config.worker.clone(),
        queue.clone(),
        "notification-test",
    );
    let cancel = tokio_util::sync::CancellationToken::new();
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { notifications.run(cancel).await }
    });
    pipeline.wait_for_log_entries(1).await;
    cancel.cancel();
    task.await.unwrap().unwrap();

    let mails = pipeline.relay.calls();
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].to, "other@example.com");

    let after = pipeline.job(&job_id).await;
    assert_eq!(after.status, JobStatus::Processing);
    assert_eq!(after.updated_at, before.updated_at);
    assert!(after.notified_at.is_none());

    assert!(pipeline.broker.pending(&queue).is_empty());
    assert_eq!(pipeline.broker.in_flight(&queue), 0);
}

#[tokio::test]
async fn test_relay_outage_is_logged_and_does_not_block() {
    let pipeline = TestPipeline::new();
    pipeline.relay.failing.store(true, Ordering::SeqCst);
    let first = pipeline.submit("one.mp4", b"movie").await;
    let second = pipeline.submit("two.mp4", b"movie").await;

    let workers = pipeline.start_workers();
    pipeline.wait_for_log_entries(2).await;
    workers.stop().await;

    for job_id in [&first, &second] {
        let job = pipeline.job(job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        let log = pipeline.log_for(job_id).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, DeliveryStatus::Failed);
        assert!(log[0].error.as_deref().unwrap().contains("421"));
    }
    assert_eq!(pipeline.relay.calls().len(), 2);
}

#[tokio::test]
async fn test_default_template_for_unknown_status() {
    let pipeline = TestPipeline::new();
    let outcome = pipeline
        .notification
        .handle(br#"{"user_id":"user@example.com","job_id":"J7","status":"queued"}"#)
        .await;
    assert_eq!(outcome, audiopipe_service::notification::NotificationOutcome::Sent);

    let mails = pipeline.relay.calls();
    assert_eq!(mails[0].subject, "Video Conversion Update");
    assert_eq!(mails[0].body, "Update on your video conversion. Job ID: J7");
}
