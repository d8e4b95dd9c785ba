//! Shared test helpers for pipeline integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Barrier;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use audiopipe_broker::BrokerManager;
use audiopipe_broker::memory::MemoryBroker;
use audiopipe_core::config::{AppConfig, WorkerConfig};
use audiopipe_core::result::AppResult;
use audiopipe_core::types::JobId;
use audiopipe_database::memory::{MemoryJobStore, MemoryNotificationLog};
use audiopipe_database::store::{JobStore, NotificationLogStore, StatusUpdate, TransitionOutcome};
use audiopipe_entity::job::ConversionJob;
use audiopipe_entity::notification::NotificationLogEntry;
use audiopipe_service::notification::{MailError, MailRelay};
use audiopipe_service::{ConversionService, IntakeService, NotificationService, StatusService};
use audiopipe_transcoder::{MediaTool, ProbeReport, ToolError, TranscodeReport};
use audiopipe_worker::WorkerRunner;
use audiopipe_worker::jobs::{ConversionHandler, NotificationHandler};

/// Payload prefix that makes the probe reject the file.
pub const CORRUPT: &[u8] = b"corrupt";
/// Payload prefix that makes the transcode exit non-zero.
pub const BROKEN: &[u8] = b"broken";
/// Stderr reported for [`BROKEN`] payloads.
pub const BROKEN_STDERR: &str = "[mov,mp4] moov atom not found\nError opening input: Invalid data\n";

/// Media tool whose behaviour is chosen by the input file's contents.
#[derive(Debug, Default)]
pub struct ScriptedTool {
    pub probes: AtomicUsize,
    pub transcodes: AtomicUsize,
    /// When set, every transcode waits here before touching its input.
    pub rendezvous: Mutex<Option<Arc<Barrier>>>,
}

#[async_trait]
impl MediaTool for ScriptedTool {
    async fn probe(&self, input: &Path) -> Result<ProbeReport, ToolError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let contents = tokio::fs::read(input).await?;
        if contents.starts_with(CORRUPT) {
            return Ok(ProbeReport::invalid("Invalid data found when processing input"));
        }
        Ok(ProbeReport {
            valid: true,
            diagnostic: String::new(),
            has_audio: true,
            duration_seconds: Some(3.0),
        })
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<TranscodeReport, ToolError> {
        self.transcodes.fetch_add(1, Ordering::SeqCst);
        let gate = self.rendezvous.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.wait().await;
        }
        let contents = tokio::fs::read(input).await?;
        if contents.starts_with(BROKEN) {
            return Err(ToolError::ProcessFailed {
                code: 1,
                stderr: BROKEN_STDERR.to_string(),
            });
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, b"ID3 converted").await?;
        Ok(TranscodeReport {
            output_path: output.to_path_buf(),
            diagnostic: String::new(),
            output_size: 13,
            duration_ms: 1,
        })
    }
}

/// A sent or attempted mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Relay that records every call and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingRelay {
    pub calls: Mutex<Vec<SentMail>>,
    pub failing: AtomicBool,
}

impl RecordingRelay {
    pub fn calls(&self) -> Vec<SentMail> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailRelay for RecordingRelay {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        self.calls.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Transport("421 service not available".to_string()));
        }
        Ok(())
    }
}

/// Job store that fails a number of terminal writes before delegating.
#[derive(Debug, Clone)]
pub struct FlakyJobStore {
    inner: MemoryJobStore,
    terminal_failures: Arc<AtomicUsize>,
}

impl FlakyJobStore {
    pub fn new(inner: MemoryJobStore, terminal_failures: usize) -> Self {
        Self {
            inner,
            terminal_failures: Arc::new(AtomicUsize::new(terminal_failures)),
        }
    }
}

#[async_trait]
impl JobStore for FlakyJobStore {
    async fn insert_initial(&self, job: &ConversionJob) -> AppResult<()> {
        self.inner.insert_initial(job).await
    }

    async fn transition(&self, job_id: &JobId, update: StatusUpdate) -> AppResult<TransitionOutcome> {
        if update.target().is_terminal()
            && self
                .terminal_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(audiopipe_core::error::AppError::database("connection reset by peer"));
        }
        self.inner.transition(job_id, update).await
    }

    async fn find(&self, job_id: &JobId) -> AppResult<Option<ConversionJob>> {
        self.inner.find(job_id).await
    }

    async fn mark_notified(&self, job_id: &JobId) -> AppResult<()> {
        self.inner.mark_notified(job_id).await
    }
}

/// Test pipeline context wired on in-memory infrastructure.
pub struct TestPipeline {
    pub dir: tempfile::TempDir,
    pub config: AppConfig,
    pub jobs: MemoryJobStore,
    pub log: MemoryNotificationLog,
    pub broker: Arc<MemoryBroker>,
    pub manager: BrokerManager,
    pub tool: Arc<ScriptedTool>,
    pub relay: Arc<RecordingRelay>,
    pub intake: IntakeService,
    pub status: StatusService,
    pub conversion: ConversionService,
    pub notification: NotificationService,
}

impl TestPipeline {
    /// Create a new pipeline
    pub fn new() -> Self {
        Self::with_store(|jobs| Arc::new(jobs) as Arc<dyn JobStore>)
    }

    /// Create a pipeline whose conversion stage writes through a wrapped store
    pub fn with_store(wrap: impl FnOnce(MemoryJobStore) -> Arc<dyn JobStore>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.upload_dir = dir.path().join("uploads").to_string_lossy().into_owned();
        config.storage.output_dir = dir.path().join("out").to_string_lossy().into_owned();
        config.worker = WorkerConfig {
            concurrency: 2,
            retry_delay_ms: 0,
            shutdown_timeout_seconds: 5,
            ..WorkerConfig::default()
        };

        let jobs = MemoryJobStore::new();
        let log = MemoryNotificationLog::new();
        let broker = Arc::new(MemoryBroker::new());
        let manager = BrokerManager::from_provider(broker.clone());
        let tool = Arc::new(ScriptedTool::default());
        let relay = Arc::new(RecordingRelay::default());

        let intake = IntakeService::new(
            Arc::new(jobs.clone()),
            manager.clone(),
            config.storage.clone(),
            config.broker.work_queue.clone(),
            config.broker.notification_queue.clone(),
        );
        let status = StatusService::new(Arc::new(jobs.clone()));
        let conversion = ConversionService::new(
            wrap(jobs.clone()),
            manager.clone(),
            tool.clone(),
            config.converter.clone(),
            config.storage.output_dir.clone(),
            config.broker.notification_queue.clone(),
        );
        let notification = NotificationService::new(
            relay.clone(),
            Arc::new(log.clone()),
            config.mail.templates.clone(),
        );

        Self {
            dir,
            config,
            jobs,
            log,
            broker,
            manager,
            tool,
            relay,
            intake,
            status,
            conversion,
            notification,
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.storage.upload_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.storage.output_dir)
    }

    pub fn work_queue(&self) -> &str {
        &self.config.broker.work_queue
    }

    pub fn notification_queue(&self) -> &str {
        &self.config.broker.notification_queue
    }

    /// Submit an upload
    pub async fn submit(&self, name: &str, contents: &[u8]) -> JobId {
        self.intake
            .submit(name, Bytes::copy_from_slice(contents), "user@example.com")
            .await
            .unwrap()
    }

    /// Fetch a job record
    pub async fn job(&self, job_id: &JobId) -> ConversionJob {
        self.jobs.find(job_id).await.unwrap().unwrap()
    }

    /// Delivery log entries for a job
    pub async fn log_for(&self, job_id: &JobId) -> Vec<NotificationLogEntry> {
        self.log.list_for_job(job_id).await.unwrap()
    }

    /// Files currently in the staging directory
    pub fn staged_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.upload_dir()) {
            Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Start both consumers on the in-memory broker
    pub fn start_workers(&self) -> Workers {
        let cancel = CancellationToken::new();
        let conversion = WorkerRunner::new(
            self.manager.clone(),
            Arc::new(ConversionHandler::new(self.conversion.clone())),
            self.config.worker.clone(),
            self.work_queue(),
            "conversion-test",
        );
        let notification = WorkerRunner::new(
            self.manager.clone(),
            Arc::new(NotificationHandler::new(self.notification.clone())),
            self.config.worker.clone(),
            self.notification_queue(),
            "notification-test",
        );

        let handles = vec![
            tokio::spawn({
                let cancel = cancel.clone();
                async move { conversion.run(cancel).await }
            }),
            tokio::spawn({
                let cancel = cancel.clone();
                async move { notification.run(cancel).await }
            }),
        ];
        Workers { cancel, handles }
    }

    /// Wait until the delivery log holds `count` entries
    pub async fn wait_for_log_entries(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if self.log.entries().await.len() >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for notifications");
    }
}

/// Running consumer tasks
pub struct Workers {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<AppResult<()>>>,
}

impl Workers {
    /// Stop the consumers and wait for in-flight messages
    pub async fn stop(self) {
        self.cancel.cancel();
        for handle in self.handles {
            handle.await.unwrap().unwrap();
        }
    }
}
