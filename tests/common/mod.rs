//! Shared fakes for lifecycle tests: scripted provider, in-memory artifact
//! store and a recording ledger.

#![allow(dead_code)]

use async_trait::async_trait;
use creez_tasks::billing::Ledger;
use creez_tasks::db::models::NewUsage;
use creez_tasks::error::{Result, TaskError};
use creez_tasks::provider::{Artifact, ArtifactPayload, GenerationOutput, ModelKey, Usage};
use creez_tasks::storage::{ArtifactStore, ArtifactUploader};
use creez_tasks::{
    GenerationProvider, GenerationRequest, GenerationWorker, MemoryTaskStore, Poller, Scheduler,
    TaskLauncher, TaskStore,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// "hello" in base64
pub const PAYLOAD: &str = "aGVsbG8=";

/// What the fake provider does when called
#[derive(Clone)]
pub enum Script {
    /// Return this many inline artifacts
    Artifacts(usize),
    /// Return one artifact whose base64 cannot be decoded, plus `n` good ones
    WithBrokenArtifact(usize),
    Fail(String),
    Panic,
}

pub struct FakeProvider {
    script: Script,
    gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<ModelKey>>,
}

impl FakeProvider {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Block every call until `gate` is notified
    pub fn gated(script: Script, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(script)
        }
    }

    pub fn calls(&self) -> Vec<ModelKey> {
        self.calls.lock().unwrap().clone()
    }
}

fn inline(n: usize) -> Vec<Artifact> {
    (0..n)
        .map(|_| Artifact {
            payload: ArtifactPayload::Base64(PAYLOAD.to_string()),
            mime: Some("image/png".to_string()),
        })
        .collect()
}

#[async_trait]
impl GenerationProvider for FakeProvider {
    async fn generate(
        &self,
        model: ModelKey,
        _request: &GenerationRequest,
    ) -> Result<GenerationOutput> {
        self.calls.lock().unwrap().push(model);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let usage = Usage {
            total_tokens: Some(108_900),
            ..Default::default()
        };
        match &self.script {
            Script::Artifacts(n) => Ok(GenerationOutput {
                artifacts: inline(*n),
                usage,
            }),
            Script::WithBrokenArtifact(n) => {
                let mut artifacts = vec![Artifact {
                    payload: ArtifactPayload::Base64("not base64!".to_string()),
                    mime: None,
                }];
                artifacts.extend(inline(*n));
                Ok(GenerationOutput { artifacts, usage })
            }
            Script::Fail(message) => Err(TaskError::Provider(message.clone())),
            Script::Panic => panic!("provider blew up"),
        }
    }
}

/// Keeps uploaded objects in memory
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<Vec<(String, Vec<u8>, String)>>,
}

impl MemoryArtifactStore {
    pub fn names(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _, _)| name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put_object(
        &self,
        object_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        self.objects.lock().unwrap().push((
            object_name.to_string(),
            bytes,
            content_type.to_string(),
        ));
        Ok(format!("https://cdn.test/{}", object_name))
    }
}

/// Denies credit to listed users and records every usage row
#[derive(Default)]
pub struct RecordingLedger {
    broke: HashSet<String>,
    usages: Mutex<Vec<NewUsage>>,
}

impl RecordingLedger {
    pub fn denying(user_id: &str) -> Self {
        Self {
            broke: HashSet::from([user_id.to_string()]),
            ..Default::default()
        }
    }

    pub fn usages(&self) -> Vec<NewUsage> {
        self.usages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ledger for RecordingLedger {
    async fn has_credit(&self, user_id: &str) -> bool {
        !self.broke.contains(user_id)
    }

    async fn record_usage(&self, usage: NewUsage) {
        self.usages.lock().unwrap().push(usage);
    }
}

/// Launcher, poller and fakes wired over one in-memory task store
pub struct Harness {
    pub store: Arc<MemoryTaskStore>,
    pub provider: Arc<FakeProvider>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub ledger: Arc<RecordingLedger>,
    pub scheduler: Scheduler,
    pub launcher: TaskLauncher,
    pub poller: Poller,
    pub worker: Arc<GenerationWorker>,
}

impl Harness {
    pub fn new(provider: FakeProvider) -> Self {
        Self::with_ledger(provider, RecordingLedger::default())
    }

    pub fn with_ledger(provider: FakeProvider, ledger: RecordingLedger) -> Self {
        let store = Arc::new(MemoryTaskStore::new());
        let provider = Arc::new(provider);
        let artifacts = Arc::new(MemoryArtifactStore::default());
        let ledger = Arc::new(ledger);

        let task_store: Arc<dyn TaskStore> = store.clone();
        let worker = Arc::new(GenerationWorker::new(
            Arc::clone(&task_store),
            provider.clone(),
            ArtifactUploader::new(artifacts.clone(), reqwest::Client::new()),
            ledger.clone(),
        ));
        let scheduler = Scheduler::new(4);
        let launcher = TaskLauncher::new(
            Arc::clone(&task_store),
            Arc::clone(&worker),
            scheduler.clone(),
        );
        let poller = Poller::new(task_store);

        Self {
            store,
            provider,
            artifacts,
            ledger,
            scheduler,
            launcher,
            poller,
            worker,
        }
    }

    /// Wait for every scheduled run to finish
    pub async fn drain(&self) {
        let report = self
            .scheduler
            .shutdown(std::time::Duration::from_secs(10))
            .await;
        assert_eq!(report, creez_tasks::worker::DrainReport::Drained);
    }
}
