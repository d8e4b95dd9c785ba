//! Conversion service.
//!
//! Drives one job from `processing` to a terminal state:
//!
//! 1. upsert the record to `processing` (never regresses a terminal record)
//! 2. short-circuit redeliveries of terminal jobs
//! 3. verify the staged input, probe it, transcode it into a file private to
//!    this delivery, then move that file to the job's output path
//! 4. write the terminal state, remove the input
//! 5. publish the notification and stamp `notified_at`
//!
//! Concurrent deliveries of one job never delete the job's output path: a
//! failed transcode only removes its own private file.
//!
//! Tool failures end the job as `failed`. Store and broker failures are
//! returned as [`ConversionError`] so the delivery is left for redelivery
//! with the input still in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use audiopipe_broker::BrokerManager;
use audiopipe_core::config::ConverterConfig;
use audiopipe_core::error::AppError;
use audiopipe_core::types::JobId;
use audiopipe_database::store::{JobStore, StatusUpdate, TransitionOutcome};
use audiopipe_entity::job::{ConversionJob, JobStatus};
use audiopipe_entity::message::{NotificationMessage, WorkMessage};
use audiopipe_transcoder::executor::truncate_diagnostic;
use audiopipe_transcoder::{MediaTool, ToolError};

use super::retry::RetryPolicy;
use crate::fs::remove_quietly;

/// Error text for an unreadable input.
pub const INVALID_MEDIA: &str = "Invalid media file format";
/// Error text when the tool exits cleanly without producing output.
pub const OUTPUT_MISSING: &str = "Output file was not created";

/// Failures that leave the delivery unacknowledged.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The job record store could not be read or written.
    #[error("Job store failure: {0}")]
    Store(AppError),

    /// The notification could not be published.
    #[error("Notification publish failure: {0}")]
    Publish(AppError),

    /// The converted file could not be moved to the output path.
    #[error("Output placement failure: {0}")]
    Output(AppError),
}

impl From<ConversionError> for AppError {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::Store(e) | ConversionError::Publish(e) | ConversionError::Output(e) => e,
        }
    }
}

/// How a work message was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// The job completed.
    Completed {
        /// Converted audio file.
        output_path: String,
    },
    /// The job failed terminally.
    Failed {
        /// Recorded failure detail.
        error: String,
    },
    /// The job was already terminal; the tool was not run.
    AlreadyTerminal {
        /// Whether the pending notification was published by this delivery.
        republished: bool,
    },
    /// Another writer moved the job to a terminal state first.
    Superseded,
}

/// Terminal result of the tool stages.
enum Verdict {
    Completed { staged: PathBuf, attempts: i32 },
    Failed { error: String, attempts: i32 },
}

/// Converts staged uploads into audio files.
#[derive(Debug, Clone)]
pub struct ConversionService {
    jobs: Arc<dyn JobStore>,
    broker: BrokerManager,
    tool: Arc<dyn MediaTool>,
    config: ConverterConfig,
    retry: RetryPolicy,
    output_dir: PathBuf,
    notification_queue: String,
}

impl ConversionService {
    /// Create a new conversion service.
    pub fn new(
        jobs: Arc<dyn JobStore>,
        broker: BrokerManager,
        tool: Arc<dyn MediaTool>,
        config: ConverterConfig,
        output_dir: impl Into<PathBuf>,
        notification_queue: impl Into<String>,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        Self {
            jobs,
            broker,
            tool,
            config,
            retry,
            output_dir: output_dir.into(),
            notification_queue: notification_queue.into(),
        }
    }

    /// Where the converted file of `job_id` ends up. Job identifiers are
    /// valid file stems, so distinct jobs never share a path.
    pub fn output_path_for(&self, job_id: &JobId) -> PathBuf {
        self.output_dir
            .join(format!("{job_id}.{}", self.config.output_extension))
    }

    /// A fresh hidden file next to the output path for one transcode run.
    /// The extension is kept so the tool picks the same container.
    fn staged_output_for(&self, job_id: &JobId) -> PathBuf {
        self.output_dir.join(format!(
            ".{job_id}.{}.{}",
            Uuid::new_v4().simple(),
            self.config.output_extension
        ))
    }

    /// Handle one work message.
    pub async fn process(&self, message: &WorkMessage) -> Result<ConversionOutcome, ConversionError> {
        let job_id = &message.job_id;
        let input = PathBuf::from(&message.file_path);

        let upsert = StatusUpdate::Processing {
            user_id: message.user_id.clone(),
            input_path: Some(message.file_path.clone()),
        };
        let outcome = self
            .jobs
            .transition(job_id, upsert)
            .await
            .map_err(ConversionError::Store)?;

        if outcome == TransitionOutcome::Noop {
            let existing = self
                .jobs
                .find(job_id)
                .await
                .map_err(ConversionError::Store)?;
            match existing {
                Some(job) if job.is_terminal() => return self.settle_redelivery(job, &input).await,
                Some(_) => {}
                None => {
                    return Err(ConversionError::Store(AppError::internal(format!(
                        "Job {job_id} vanished during upsert"
                    ))));
                }
            }
        }

        info!(job_id = %job_id, input = %input.display(), "Processing conversion");

        let verdict = self.convert(job_id, &input).await;
        let (update, outcome) = match verdict {
            Verdict::Completed { staged, attempts } => {
                let output = self.place_output(&staged, job_id).await?;
                let output_path = output.to_string_lossy().into_owned();
                (
                    StatusUpdate::Completed {
                        output_path: output_path.clone(),
                        attempts,
                    },
                    ConversionOutcome::Completed { output_path },
                )
            }
            Verdict::Failed { error, attempts } => (
                StatusUpdate::Failed {
                    error: error.clone(),
                    attempts,
                },
                ConversionOutcome::Failed { error },
            ),
        };
        let status = update.target();
        let error_text = match &outcome {
            ConversionOutcome::Failed { error } => Some(error.clone()),
            _ => None,
        };

        let written = self
            .jobs
            .transition(job_id, update)
            .await
            .map_err(ConversionError::Store)?;
        if written == TransitionOutcome::Noop {
            warn!(job_id = %job_id, "Job reached a terminal state concurrently, result discarded");
            if matches!(outcome, ConversionOutcome::Completed { .. }) {
                self.discard_unclaimed_output(job_id).await?;
            }
            return Ok(ConversionOutcome::Superseded);
        }

        remove_quietly(&input).await;
        self.notify(job_id, &message.user_id, status, error_text).await?;

        match &outcome {
            ConversionOutcome::Completed { output_path } => {
                info!(job_id = %job_id, output = %output_path, "Conversion completed");
            }
            ConversionOutcome::Failed { error } => {
                warn!(job_id = %job_id, error = %error, "Conversion failed");
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// Move a finished transcode to the job's output path.
    async fn place_output(&self, staged: &Path, job_id: &JobId) -> Result<PathBuf, ConversionError> {
        let output = self.output_path_for(job_id);
        if let Err(e) = tokio::fs::rename(staged, &output).await {
            remove_quietly(staged).await;
            return Err(ConversionError::Output(AppError::storage(format!(
                "Failed to move {} to {}: {e}",
                staged.display(),
                output.display()
            ))));
        }
        Ok(output)
    }

    /// After losing the terminal write, remove the output this delivery placed
    /// unless the winning record is `completed` and owns that path.
    async fn discard_unclaimed_output(&self, job_id: &JobId) -> Result<(), ConversionError> {
        let current = self
            .jobs
            .find(job_id)
            .await
            .map_err(ConversionError::Store)?;
        let claimed = current.is_some_and(|job| job.status == JobStatus::Completed);
        if !claimed {
            remove_quietly(&self.output_path_for(job_id)).await;
        }
        Ok(())
    }

    /// Finish a redelivered job that is already terminal.
    async fn settle_redelivery(
        &self,
        job: ConversionJob,
        input: &Path,
    ) -> Result<ConversionOutcome, ConversionError> {
        info!(
            job_id = %job.job_id,
            status = %job.status,
            "Job already terminal, skipping conversion"
        );
        remove_quietly(input).await;

        if !job.needs_notification() {
            return Ok(ConversionOutcome::AlreadyTerminal { republished: false });
        }
        self.notify(&job.job_id, &job.user_id, job.status, job.error.clone())
            .await?;
        Ok(ConversionOutcome::AlreadyTerminal { republished: true })
    }

    /// Run the tool stages. Every tool problem becomes a terminal verdict.
    async fn convert(&self, job_id: &JobId, input: &Path) -> Verdict {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Verdict::Failed {
                error: format!("Input file not found: {}", input.display()),
                attempts: 0,
            };
        }

        let tool = &self.tool;
        let (probed, _) = self.retry.run("probe", move || tool.probe(input)).await;
        match probed {
            Ok(report) if report.valid => {
                debug!(
                    job_id = %job_id,
                    has_audio = report.has_audio,
                    duration_seconds = ?report.duration_seconds,
                    "Probe succeeded"
                );
            }
            Ok(report) => {
                warn!(job_id = %job_id, diagnostic = %report.diagnostic, "Probe rejected input");
                return Verdict::Failed {
                    error: INVALID_MEDIA.to_string(),
                    attempts: 0,
                };
            }
            Err(e) => {
                return Verdict::Failed {
                    error: self.describe(e),
                    attempts: 0,
                };
            }
        }

        let staged = self.staged_output_for(job_id);
        let target = staged.as_path();
        let (transcoded, attempts) = self
            .retry
            .run("transcode", move || tool.transcode(input, target))
            .await;
        let attempts = i32::try_from(attempts).unwrap_or(i32::MAX);

        match transcoded {
            Ok(report) => Verdict::Completed {
                staged: report.output_path,
                attempts,
            },
            Err(e) => {
                error!(job_id = %job_id, error = %e, attempts, "Transcode failed");
                remove_quietly(&staged).await;
                Verdict::Failed {
                    error: self.describe(e),
                    attempts,
                }
            }
        }
    }

    /// The text recorded on the job for a tool failure.
    fn describe(&self, err: ToolError) -> String {
        match err {
            ToolError::ProcessFailed { stderr, .. } => {
                truncate_diagnostic(&stderr, self.config.max_diagnostic_bytes)
            }
            ToolError::OutputMissing(_) => OUTPUT_MISSING.to_string(),
            other => other.to_string(),
        }
    }

    async fn notify(
        &self,
        job_id: &JobId,
        user_id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), ConversionError> {
        let message = NotificationMessage::new(user_id, job_id.clone(), status, error);
        self.broker
            .publish_json(&self.notification_queue, &message)
            .await
            .map_err(|e| {
                error!(job_id = %job_id, error = %e, "Failed to publish notification");
                ConversionError::Publish(e)
            })?;

        if let Err(e) = self.jobs.mark_notified(job_id).await {
            warn!(job_id = %job_id, error = %e, "Failed to stamp notification time");
        }
        debug!(job_id = %job_id, status = %status, "Notification published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Barrier;

    use audiopipe_broker::memory::MemoryBroker;
    use audiopipe_database::memory::MemoryJobStore;
    use audiopipe_transcoder::{ProbeReport, TranscodeReport};

    use super::*;

    #[derive(Debug, Default)]
    struct CountingTool {
        transcodes: AtomicUsize,
    }

    #[async_trait]
    impl MediaTool for CountingTool {
        async fn probe(&self, _input: &Path) -> Result<ProbeReport, ToolError> {
            Ok(ProbeReport {
                valid: true,
                diagnostic: String::new(),
                has_audio: true,
                duration_seconds: Some(1.0),
            })
        }

        async fn transcode(&self, _input: &Path, output: &Path) -> Result<TranscodeReport, ToolError> {
            self.transcodes.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(output, b"ID3").await?;
            Ok(TranscodeReport {
                output_path: output.to_path_buf(),
                diagnostic: String::new(),
                output_size: 3,
                duration_ms: 1,
            })
        }
    }

    struct Fixture {
        service: ConversionService,
        jobs: MemoryJobStore,
        broker: Arc<MemoryBroker>,
        tool: Arc<CountingTool>,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let jobs = MemoryJobStore::new();
        let broker = Arc::new(MemoryBroker::new());
        let tool = Arc::new(CountingTool::default());
        let service = ConversionService::new(
            Arc::new(jobs.clone()),
            BrokerManager::from_provider(broker.clone()),
            tool.clone(),
            ConverterConfig::default(),
            dir.path().join("out"),
            "notifications",
        );
        Fixture {
            service,
            jobs,
            broker,
            tool,
            dir,
        }
    }

    #[tokio::test]
    async fn test_output_path_uses_job_id_and_extension() {
        let f = fixture();
        let job: JobId = "J1".parse().unwrap();
        assert_eq!(f.service.output_path_for(&job), f.dir.path().join("out/J1.mp3"));

        let other: JobId = "J1-b".parse().unwrap();
        assert_ne!(f.service.output_path_for(&job), f.service.output_path_for(&other));
        let staged = f.service.staged_output_for(&job);
        assert_ne!(staged, f.service.staged_output_for(&job));
        assert_eq!(staged.extension().unwrap(), "mp3");
        assert_eq!(staged.parent(), f.service.output_path_for(&job).parent());
    }

    /// Holds both deliveries inside the transcode until each has arrived.
    /// The second caller can be told to fail once the job is terminal.
    #[derive(Debug)]
    struct RacingTool {
        gate: Barrier,
        transcodes: AtomicUsize,
        jobs: MemoryJobStore,
        fail_late_caller: bool,
    }

    #[async_trait]
    impl MediaTool for RacingTool {
        async fn probe(&self, _input: &Path) -> Result<ProbeReport, ToolError> {
            Ok(ProbeReport {
                valid: true,
                diagnostic: String::new(),
                has_audio: true,
                duration_seconds: Some(1.0),
            })
        }

        async fn transcode(&self, _input: &Path, output: &Path) -> Result<TranscodeReport, ToolError> {
            self.gate.wait().await;
            let caller = self.transcodes.fetch_add(1, Ordering::SeqCst);
            if caller == 1 && self.fail_late_caller {
                let job: JobId = "J1".parse().unwrap();
                while !self.jobs.find(&job).await.unwrap().unwrap().is_terminal() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                return Err(ToolError::ProcessFailed {
                    code: 1,
                    stderr: "J1_movie.mp4: No such file or directory".to_string(),
                });
            }
            tokio::fs::write(output, b"ID3").await?;
            Ok(TranscodeReport {
                output_path: output.to_path_buf(),
                diagnostic: String::new(),
                output_size: 3,
                duration_ms: 1,
            })
        }
    }

    async fn race_two_deliveries(fail_late_caller: bool) -> (Vec<ConversionOutcome>, Fixture) {
        let mut f = fixture();
        f.service.tool = Arc::new(RacingTool {
            gate: Barrier::new(2),
            transcodes: AtomicUsize::new(0),
            jobs: f.jobs.clone(),
            fail_late_caller,
        }) as Arc<dyn MediaTool>;
        tokio::fs::create_dir_all(f.dir.path().join("out")).await.unwrap();
        let input = f.dir.path().join("J1_movie.mp4");
        tokio::fs::write(&input, b"video").await.unwrap();
        let message = WorkMessage::new("J1".parse().unwrap(), input.to_string_lossy(), "u@x.io");

        let (a, b) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(f.service.process(&message), f.service.process(&message))
        })
        .await
        .unwrap();
        (vec![a.unwrap(), b.unwrap()], f)
    }

    fn assert_one_winner(outcomes: &[ConversionOutcome]) {
        let completed = outcomes
            .iter()
            .filter(|o| matches!(o, ConversionOutcome::Completed { .. }))
            .count();
        let superseded = outcomes
            .iter()
            .filter(|o| **o == ConversionOutcome::Superseded)
            .count();
        assert_eq!((completed, superseded), (1, 1), "{outcomes:?}");
    }

    fn output_dir_entries(f: &Fixture) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(f.dir.path().join("out"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_keep_completed_output() {
        let (outcomes, f) = race_two_deliveries(false).await;
        assert_one_winner(&outcomes);

        let job = f.jobs.find(&"J1".parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let output = PathBuf::from(job.output_path.unwrap());
        assert!(output.exists());
        assert_eq!(output_dir_entries(&f), vec!["J1.mp3".to_string()]);
        assert_eq!(f.broker.pending("notifications").len(), 1);
    }

    #[tokio::test]
    async fn test_losing_delivery_failure_does_not_remove_output() {
        let (outcomes, f) = race_two_deliveries(true).await;
        assert_one_winner(&outcomes);

        let job = f.jobs.find(&"J1".parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(PathBuf::from(job.output_path.unwrap()).exists());
        assert_eq!(output_dir_entries(&f), vec!["J1.mp3".to_string()]);
        assert_eq!(f.broker.pending("notifications").len(), 1);
    }

    #[tokio::test]
    async fn test_redelivery_after_completion_skips_tool() {
        let f = fixture();
        tokio::fs::create_dir_all(f.dir.path().join("out")).await.unwrap();
        let input = f.dir.path().join("J1_movie.mp4");
        tokio::fs::write(&input, b"video").await.unwrap();
        let message = WorkMessage::new("J1".parse().unwrap(), input.to_string_lossy(), "u@x.io");

        let first = f.service.process(&message).await.unwrap();
        assert!(matches!(first, ConversionOutcome::Completed { .. }));
        let second = f.service.process(&message).await.unwrap();
        assert_eq!(second, ConversionOutcome::AlreadyTerminal { republished: false });

        assert_eq!(f.tool.transcodes.load(Ordering::SeqCst), 1);
        assert_eq!(f.broker.pending("notifications").len(), 1);
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn test_unnotified_terminal_job_is_republished() {
        let f = fixture();
        let job: JobId = "J2".parse().unwrap();
        f.jobs
            .transition(
                &job,
                StatusUpdate::Processing {
                    user_id: "u@x.io".to_string(),
                    input_path: None,
                },
            )
            .await
            .unwrap();
        f.jobs
            .transition(
                &job,
                StatusUpdate::Failed {
                    error: INVALID_MEDIA.to_string(),
                    attempts: 0,
                },
            )
            .await
            .unwrap();

        let message = WorkMessage::new(job.clone(), "/nonexistent/J2_x.mp4", "u@x.io");
        let outcome = f.service.process(&message).await.unwrap();
        assert_eq!(outcome, ConversionOutcome::AlreadyTerminal { republished: true });

        let pending = f.broker.pending("notifications");
        assert_eq!(pending.len(), 1);
        let sent: NotificationMessage = serde_json::from_slice(&pending[0]).unwrap();
        assert_eq!(sent.status, "failed");
        assert_eq!(sent.error.as_deref(), Some(INVALID_MEDIA));
        assert!(f.jobs.find(&job).await.unwrap().unwrap().notified_at.is_some());
    }

    #[tokio::test]
    async fn test_describe_keeps_stderr_verbatim() {
        let f = fixture();
        let text = f.service.describe(ToolError::ProcessFailed {
            code: 1,
            stderr: "moov atom not found\n".to_string(),
        });
        assert_eq!(text, "moov atom not found\n");
        assert_eq!(
            f.service.describe(ToolError::OutputMissing("/out/J1.mp3".to_string())),
            OUTPUT_MISSING
        );
    }
}
