use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{OpsError, OpsResult};
use crate::services::pipeline::{PipelineReport, PipelineRunner};
use crate::services::record_store::{NewRecord, RecordStore};
use crate::services::types::{
    MiniProgramType, RecordStatus, StatusItem, UploadMode, UploadStatus, UploadTask,
};

/// How a requested upload was admitted.
#[derive(Debug)]
pub enum Admission {
    /// A pipeline run began for this request; the handle resolves to the
    /// opaque publish result or an error message.
    Started(JoinHandle<Result<String, String>>),
    /// Every build slot is taken; the name waits in the FIFO queue.
    Queued,
    /// A non-failed task for this name is already resident; nothing to do.
    AlreadyActive,
}

#[derive(Debug, Clone)]
struct QueuedUpload {
    name: String,
    mode: UploadMode,
}

#[derive(Debug, Default)]
struct TypeState {
    /// Resident tasks, in admission order. At most one entry per name.
    active: Vec<UploadTask>,
    /// Names awaiting a free build slot, strictly FIFO, no duplicates.
    queue: VecDeque<QueuedUpload>,
}

impl TypeState {
    fn building_count(&self) -> usize {
        self.active
            .iter()
            .filter(|t| t.status == UploadStatus::Building)
            .count()
    }

    fn items(&self) -> Vec<StatusItem> {
        self.active
            .iter()
            .map(|t| StatusItem {
                name: t.name.clone(),
                status: t.status,
            })
            .collect()
    }
}

struct Inner {
    cap: usize,
    pipeline_timeout: Duration,
    runner: Arc<dyn PipelineRunner>,
    records: Arc<RecordStore>,
    state: HashMap<MiniProgramType, Mutex<TypeState>>,
    events: HashMap<MiniProgramType, broadcast::Sender<Vec<StatusItem>>>,
}

/// Owns all upload state: per-type active sets, wait queues, the concurrency
/// cap, and pipeline sequencing. Constructed once at process start and shared
/// by cloning.
///
/// Each type's state sits behind its own mutex; admission is a single
/// critical section, so the check-then-admit path is an atomic
/// insert-if-absent and a double-submitted request cannot start two
/// pipelines.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        cap: usize,
        pipeline_timeout: Duration,
        runner: Arc<dyn PipelineRunner>,
        records: Arc<RecordStore>,
    ) -> Self {
        let mut state = HashMap::new();
        let mut events = HashMap::new();
        for mp_type in MiniProgramType::ALL {
            state.insert(mp_type, Mutex::new(TypeState::default()));
            let (tx, _) = broadcast::channel(32);
            events.insert(mp_type, tx);
        }
        Self {
            inner: Arc::new(Inner {
                cap,
                pipeline_timeout,
                runner,
                records,
                state,
                events,
            }),
        }
    }

    /// Admit, queue, retry or ignore an upload request for (type, name).
    pub fn request_upload(
        &self,
        mp_type: MiniProgramType,
        name: &str,
        mode: UploadMode,
    ) -> OpsResult<Admission> {
        if name.trim().is_empty() {
            return Err(OpsError::InvalidParam("name must not be empty".to_string()));
        }

        enum Decision {
            Start,
            Retry,
            Queue,
            AlreadyQueued,
            AlreadyActive,
        }

        let decision = {
            let mut state = self.inner.state[&mp_type].lock().expect("type state poisoned");
            if let Some(task) = state.active.iter_mut().find(|t| t.name == name) {
                if task.status == UploadStatus::Fail {
                    // Retry in place: same task, status overwritten. A Fail
                    // task already holds its slot, so the retry starts
                    // immediately and may briefly push the building count
                    // past the cap instead of queueing behind newer names.
                    task.status = UploadStatus::Building;
                    task.mode = mode;
                    Decision::Retry
                } else {
                    Decision::AlreadyActive
                }
            } else if state.building_count() < self.inner.cap {
                // A name is never both active and queued: a re-request of a
                // queued name that lands in a free slot takes its queue
                // entry with it.
                state.queue.retain(|q| q.name != name);
                state.active.push(UploadTask {
                    name: name.to_string(),
                    mode,
                    status: UploadStatus::Building,
                });
                Decision::Start
            } else if state.queue.iter().any(|q| q.name == name) {
                Decision::AlreadyQueued
            } else {
                state.queue.push_back(QueuedUpload {
                    name: name.to_string(),
                    mode,
                });
                Decision::Queue
            }
        };

        match decision {
            Decision::Start => {
                info!("admitted upload {} ({})", name, mp_type);
                self.inner.notify(mp_type);
                Ok(Admission::Started(self.spawn_pipeline(mp_type, name, mode)))
            }
            Decision::Retry => {
                info!("retrying failed upload {} ({})", name, mp_type);
                self.inner.notify(mp_type);
                Ok(Admission::Started(self.spawn_pipeline(mp_type, name, mode)))
            }
            Decision::Queue => {
                info!("all build slots busy, queued {} ({})", name, mp_type);
                Ok(Admission::Queued)
            }
            Decision::AlreadyQueued => Ok(Admission::Queued),
            Decision::AlreadyActive => {
                warn!("duplicate upload request for {} ({}) ignored", name, mp_type);
                Ok(Admission::AlreadyActive)
            }
        }
    }

    /// Current statuses for a type. Before serving, queued names are drained
    /// into free build slots (FIFO); after serving, `Success` entries are
    /// purged, so each terminal success is visible to exactly one poll.
    pub fn poll_statuses(&self, mp_type: MiniProgramType) -> Vec<StatusItem> {
        let mut to_spawn = Vec::new();
        let mut changed = false;

        let snapshot = {
            let mut state = self.inner.state[&mp_type].lock().expect("type state poisoned");

            while state.building_count() < self.inner.cap {
                let Some(queued) = state.queue.pop_front() else {
                    break;
                };
                // Stale entry for a name that was admitted some other way.
                if state.active.iter().any(|t| t.name == queued.name) {
                    continue;
                }
                state.active.push(UploadTask {
                    name: queued.name.clone(),
                    mode: queued.mode,
                    status: UploadStatus::Building,
                });
                to_spawn.push(queued);
                changed = true;
            }

            let snapshot = state.items();

            let before = state.active.len();
            state.active.retain(|t| t.status != UploadStatus::Success);
            changed |= state.active.len() != before;

            snapshot
        };

        for queued in to_spawn {
            info!("drained {} ({}) into a free build slot", queued.name, mp_type);
            let _handle = self.spawn_pipeline(mp_type, &queued.name, queued.mode);
        }
        if changed {
            self.inner.notify(mp_type);
        }

        snapshot
    }

    /// Snapshot plus a live event stream for push clients. The stream serves
    /// the full set on every change; unlike polling it never purges.
    pub fn subscribe(
        &self,
        mp_type: MiniProgramType,
    ) -> (Vec<StatusItem>, broadcast::Receiver<Vec<StatusItem>>) {
        let receiver = self.inner.events[&mp_type].subscribe();
        let snapshot = self.inner.state[&mp_type]
            .lock()
            .expect("type state poisoned")
            .items();
        (snapshot, receiver)
    }

    fn spawn_pipeline(
        &self,
        mp_type: MiniProgramType,
        name: &str,
        mode: UploadMode,
    ) -> JoinHandle<Result<String, String>> {
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        tokio::spawn(async move {
            let run = inner.runner.run(mp_type, &name, mode);
            let report = match tokio::time::timeout(inner.pipeline_timeout, run).await {
                Ok(report) => report,
                // The raced pipeline future is dropped here; child processes
                // are killed on drop, but their death is not confirmed.
                Err(_) => PipelineReport::failed(format!(
                    "upload pipeline timed out after {}s",
                    inner.pipeline_timeout.as_secs()
                )),
            };
            inner.finish(mp_type, &name, mode, report).await
        })
    }
}

impl Inner {
    fn notify(&self, mp_type: MiniProgramType) {
        let snapshot = self.state[&mp_type]
            .lock()
            .expect("type state poisoned")
            .items();
        // No receivers is fine; polling clients see the same state.
        let _ = self.events[&mp_type].send(snapshot);
    }

    async fn finish(
        &self,
        mp_type: MiniProgramType,
        name: &str,
        mode: UploadMode,
        report: PipelineReport,
    ) -> Result<String, String> {
        let (status, record_status) = match report.outcome {
            Ok(_) => (UploadStatus::Success, RecordStatus::Success),
            Err(_) => (UploadStatus::Fail, RecordStatus::Fail),
        };

        {
            let mut state = self.state[&mp_type].lock().expect("type state poisoned");
            if let Some(task) = state.active.iter_mut().find(|t| t.name == name) {
                task.status = status;
            }
        }
        self.notify(mp_type);

        self.records
            .append(
                mp_type,
                NewRecord {
                    name: name.to_string(),
                    org_name: report.org_name,
                    last_commit_user: report.commit.last_commit_user,
                    commit: report.commit.commit,
                    mode,
                    status: record_status,
                    version: report.version,
                    error: report.outcome.as_ref().err().cloned(),
                },
            )
            .await;

        report.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::git::CommitInfo;
    use async_trait::async_trait;
    use std::collections::VecDeque as Script;
    use tokio::sync::watch;

    fn success_report(name: &str) -> PipelineReport {
        PipelineReport {
            outcome: Ok(format!("uploaded {}", name)),
            org_name: "Clinic A".to_string(),
            version: "1.0.0".to_string(),
            commit: CommitInfo {
                last_commit_user: "dev".to_string(),
                commit: "fix: things".to_string(),
            },
        }
    }

    /// Runner that blocks every pipeline until the gate opens.
    struct GatedRunner {
        gate: watch::Receiver<bool>,
        fail: bool,
    }

    #[async_trait]
    impl PipelineRunner for GatedRunner {
        async fn run(
            &self,
            _mp_type: MiniProgramType,
            name: &str,
            _mode: UploadMode,
        ) -> PipelineReport {
            let mut gate = self.gate.clone();
            gate.wait_for(|open| *open).await.ok();
            if self.fail {
                PipelineReport::failed(format!("build exploded: {}", name))
            } else {
                success_report(name)
            }
        }
    }

    /// Runner that replays a scripted fail/succeed sequence.
    struct ScriptedRunner {
        fail_script: Mutex<Script<bool>>,
    }

    #[async_trait]
    impl PipelineRunner for ScriptedRunner {
        async fn run(
            &self,
            _mp_type: MiniProgramType,
            name: &str,
            _mode: UploadMode,
        ) -> PipelineReport {
            let fail = self
                .fail_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(false);
            if fail {
                PipelineReport::failed(format!("build exploded: {}", name))
            } else {
                success_report(name)
            }
        }
    }

    /// Runner whose first pipeline fails fast and whose later ones block
    /// forever, so a Fail task can sit next to permanently Building ones.
    struct FailFirstThenStuck {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl PipelineRunner for FailFirstThenStuck {
        async fn run(
            &self,
            _mp_type: MiniProgramType,
            name: &str,
            _mode: UploadMode,
        ) -> PipelineReport {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls == 1
            };
            if first {
                PipelineReport::failed(format!("build exploded: {}", name))
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            }
        }
    }

    /// Runner that never finishes within any reasonable test timeout.
    struct StuckRunner;

    #[async_trait]
    impl PipelineRunner for StuckRunner {
        async fn run(
            &self,
            _mp_type: MiniProgramType,
            _name: &str,
            _mode: UploadMode,
        ) -> PipelineReport {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn orchestrator(
        cap: usize,
        runner: Arc<dyn PipelineRunner>,
    ) -> (tempfile::TempDir, Orchestrator, Arc<RecordStore>) {
        orchestrator_with_timeout(cap, Duration::from_secs(30), runner)
    }

    fn orchestrator_with_timeout(
        cap: usize,
        timeout: Duration,
        runner: Arc<dyn PipelineRunner>,
    ) -> (tempfile::TempDir, Orchestrator, Arc<RecordStore>) {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(RecordStore::load(dir.path().to_path_buf()).unwrap());
        let orch = Orchestrator::new(cap, timeout, runner, Arc::clone(&records));
        (dir, orch, records)
    }

    fn names(items: &[StatusItem]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    const T: MiniProgramType = MiniProgramType::CloudOutpatientMp;

    #[tokio::test]
    async fn cap_admits_three_and_queues_the_fourth() {
        let (gate_tx, gate_rx) = watch::channel(false);
        let runner = Arc::new(GatedRunner {
            gate: gate_rx,
            fail: false,
        });
        let (_dir, orch, _records) = orchestrator(3, runner);

        let mut handles = Vec::new();
        for name in ["a", "b", "c"] {
            match orch.request_upload(T, name, UploadMode::Test).unwrap() {
                Admission::Started(handle) => handles.push(handle),
                _ => panic!("expected {} to start", name),
            }
        }
        assert!(matches!(
            orch.request_upload(T, "d", UploadMode::Test).unwrap(),
            Admission::Queued
        ));
        // Re-requesting a queued name stays a single queue entry.
        assert!(matches!(
            orch.request_upload(T, "d", UploadMode::Test).unwrap(),
            Admission::Queued
        ));

        let statuses = orch.poll_statuses(T);
        assert_eq!(names(&statuses), vec!["a", "b", "c"]);
        assert!(statuses.iter().all(|s| s.status == UploadStatus::Building));

        gate_tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Drain-then-serve: the freed slots admit "d" exactly once, and the
        // finished builds are served as Success on this poll only.
        let statuses = orch.poll_statuses(T);
        assert_eq!(names(&statuses), vec!["a", "b", "c", "d"]);
        assert!(statuses[..3].iter().all(|s| s.status == UploadStatus::Success));
        assert_eq!(statuses[3].status, UploadStatus::Building);

        let statuses = orch.poll_statuses(T);
        assert_eq!(names(&statuses), vec!["d"]);
    }

    #[tokio::test]
    async fn duplicate_request_for_building_task_is_a_noop() {
        let (_gate_tx, gate_rx) = watch::channel(false);
        let runner = Arc::new(GatedRunner {
            gate: gate_rx,
            fail: false,
        });
        let (_dir, orch, _records) = orchestrator(3, runner);

        let Admission::Started(_handle) = orch.request_upload(T, "a", UploadMode::Test).unwrap()
        else {
            panic!("expected start");
        };
        assert!(matches!(
            orch.request_upload(T, "a", UploadMode::Test).unwrap(),
            Admission::AlreadyActive
        ));
        assert_eq!(orch.poll_statuses(T).len(), 1);
    }

    #[tokio::test]
    async fn failed_task_is_retried_in_place_and_recorded() {
        let runner = Arc::new(ScriptedRunner {
            fail_script: Mutex::new(Script::from([true, false])),
        });
        let (_dir, orch, records) = orchestrator(3, runner);

        let Admission::Started(handle) = orch.request_upload(T, "x", UploadMode::Pro).unwrap()
        else {
            panic!("expected start");
        };
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.contains("build exploded"));

        // Fail stays resident across polls until retried.
        for _ in 0..2 {
            let statuses = orch.poll_statuses(T);
            assert_eq!(names(&statuses), vec!["x"]);
            assert_eq!(statuses[0].status, UploadStatus::Fail);
        }
        let (page, total) = records.query(T, 1, 10).await;
        assert_eq!(total, 1);
        assert_eq!(page[0].status, RecordStatus::Fail);
        assert_eq!(page[0].error.as_deref(), Some("build exploded: x"));

        let Admission::Started(handle) = orch.request_upload(T, "x", UploadMode::Pro).unwrap()
        else {
            panic!("expected retry to start");
        };
        handle.await.unwrap().unwrap();

        // Exactly one task object throughout; Success served once, then gone.
        let statuses = orch.poll_statuses(T);
        assert_eq!(names(&statuses), vec!["x"]);
        assert_eq!(statuses[0].status, UploadStatus::Success);
        assert!(orch.poll_statuses(T).is_empty());

        let (page, total) = records.query(T, 1, 10).await;
        assert_eq!(total, 2);
        assert_eq!(page[0].status, RecordStatus::Success);
        assert_eq!(page[0].error, None);
        assert_eq!(page[0].org_name, "Clinic A");
    }

    #[tokio::test]
    async fn pipeline_timeout_fails_the_task_and_writes_a_record() {
        let (_dir, orch, records) =
            orchestrator_with_timeout(3, Duration::from_millis(50), Arc::new(StuckRunner));

        let Admission::Started(handle) = orch.request_upload(T, "slow", UploadMode::Test).unwrap()
        else {
            panic!("expected start");
        };
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.contains("timed out"), "unexpected error: {}", err);

        let statuses = orch.poll_statuses(T);
        assert_eq!(statuses[0].status, UploadStatus::Fail);

        let (page, total) = records.query(T, 1, 10).await;
        assert_eq!(total, 1);
        assert_eq!(page[0].status, RecordStatus::Fail);
        assert!(page[0].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(page[0].version, "unknown");
    }

    #[tokio::test]
    async fn queue_drains_in_fifo_order_up_to_free_slots() {
        let (gate_tx, gate_rx) = watch::channel(false);
        let runner = Arc::new(GatedRunner {
            gate: gate_rx,
            fail: false,
        });
        let (_dir, orch, _records) = orchestrator(1, runner);

        let Admission::Started(handle) = orch.request_upload(T, "a", UploadMode::Test).unwrap()
        else {
            panic!("expected start");
        };
        assert!(matches!(
            orch.request_upload(T, "b", UploadMode::Test).unwrap(),
            Admission::Queued
        ));
        assert!(matches!(
            orch.request_upload(T, "c", UploadMode::Test).unwrap(),
            Admission::Queued
        ));

        gate_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        // One free slot: "b" is admitted, "c" keeps waiting.
        let statuses = orch.poll_statuses(T);
        assert_eq!(names(&statuses), vec!["a", "b"]);
        assert_eq!(statuses[1].status, UploadStatus::Building);

        let statuses = orch.poll_statuses(T);
        assert!(names(&statuses).contains(&"b"));
        assert!(!names(&statuses).contains(&"a"));
    }

    #[tokio::test]
    async fn rerequested_queued_name_is_not_drained_a_second_time() {
        let (gate_tx, gate_rx) = watch::channel(false);
        let runner = Arc::new(GatedRunner {
            gate: gate_rx,
            fail: false,
        });
        let (_dir, orch, records) = orchestrator(1, runner);

        let Admission::Started(handle) = orch.request_upload(T, "a", UploadMode::Test).unwrap()
        else {
            panic!("expected start");
        };
        assert!(matches!(
            orch.request_upload(T, "b", UploadMode::Test).unwrap(),
            Admission::Queued
        ));

        gate_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        // The freed slot admits the re-request directly; its stale queue
        // entry goes with it, so no later drain runs "b" again.
        let Admission::Started(handle) = orch.request_upload(T, "b", UploadMode::Test).unwrap()
        else {
            panic!("expected direct admission");
        };
        handle.await.unwrap().unwrap();

        let statuses = orch.poll_statuses(T);
        assert_eq!(names(&statuses), vec!["a", "b"]);
        assert!(statuses.iter().all(|s| s.status == UploadStatus::Success));
        assert!(orch.poll_statuses(T).is_empty());

        // Two requests for "b", exactly one pipeline run each for "a"/"b".
        let (_, total) = records.query(T, 1, 10).await;
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn retry_of_failed_task_starts_even_at_the_cap() {
        let runner = Arc::new(FailFirstThenStuck {
            calls: Mutex::new(0),
        });
        let (_dir, orch, _records) = orchestrator(1, runner);

        let Admission::Started(handle) = orch.request_upload(T, "x", UploadMode::Test).unwrap()
        else {
            panic!("expected start");
        };
        handle.await.unwrap().unwrap_err();

        let Admission::Started(_y) = orch.request_upload(T, "y", UploadMode::Test).unwrap()
        else {
            panic!("expected start");
        };

        // "x" holds a Fail slot; its retry starts immediately rather than
        // queueing behind "y".
        let Admission::Started(_x) = orch.request_upload(T, "x", UploadMode::Test).unwrap()
        else {
            panic!("expected retry to start");
        };

        let statuses = orch.poll_statuses(T);
        assert_eq!(names(&statuses), vec!["x", "y"]);
        assert!(statuses.iter().all(|s| s.status == UploadStatus::Building));
    }

    #[tokio::test]
    async fn types_are_fully_independent() {
        let (_gate_tx, gate_rx) = watch::channel(false);
        let runner = Arc::new(GatedRunner {
            gate: gate_rx,
            fail: false,
        });
        let (_dir, orch, _records) = orchestrator(1, runner);

        let Admission::Started(_a) = orch
            .request_upload(MiniProgramType::CloudOutpatientMp, "same-name", UploadMode::Test)
            .unwrap()
        else {
            panic!("expected start");
        };
        // Same name, other type: its own cap accounting, so it starts too.
        let Admission::Started(_b) = orch
            .request_upload(MiniProgramType::CloudMallMp, "same-name", UploadMode::Test)
            .unwrap()
        else {
            panic!("expected start");
        };

        assert_eq!(orch.poll_statuses(MiniProgramType::CloudOutpatientMp).len(), 1);
        assert_eq!(orch.poll_statuses(MiniProgramType::CloudMallMp).len(), 1);
    }

    #[tokio::test]
    async fn empty_name_is_rejected_without_state_change() {
        let (_gate_tx, gate_rx) = watch::channel(false);
        let runner = Arc::new(GatedRunner {
            gate: gate_rx,
            fail: false,
        });
        let (_dir, orch, _records) = orchestrator(3, runner);

        let err = orch.request_upload(T, "  ", UploadMode::Test).unwrap_err();
        assert!(matches!(err, OpsError::InvalidParam(_)));
        assert!(orch.poll_statuses(T).is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_every_transition() {
        let runner = Arc::new(ScriptedRunner {
            fail_script: Mutex::new(Script::from([false])),
        });
        let (_dir, orch, _records) = orchestrator(3, runner);

        let (snapshot, mut rx) = orch.subscribe(T);
        assert!(snapshot.is_empty());

        let Admission::Started(handle) = orch.request_upload(T, "a", UploadMode::Test).unwrap()
        else {
            panic!("expected start");
        };

        let update = rx.recv().await.unwrap();
        assert_eq!(update[0].status, UploadStatus::Building);

        handle.await.unwrap().unwrap();
        let update = rx.recv().await.unwrap();
        assert_eq!(update[0].status, UploadStatus::Success);
    }
}
