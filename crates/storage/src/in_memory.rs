//! In-memory storage backend for tests/dev.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;

use jobflow_core::{Job, JobId, StateValue};

use crate::connection::{JobData, StateHistoryEntry, StorageConnection, WriteTransaction};
use crate::error::StorageError;
use crate::lock::DistributedLockHandle;

#[derive(Debug, Clone)]
struct StoredJob {
    invocation_data: serde_json::Value,
    created_at: DateTime<Utc>,
    state: Option<StateValue>,
    history: Vec<StateHistoryEntry>,
    parameters: HashMap<String, String>,
    expire_at: Option<DateTime<Utc>>,
}

impl StoredJob {
    fn new(invocation_data: serde_json::Value) -> Self {
        Self {
            invocation_data,
            created_at: Utc::now(),
            state: None,
            history: Vec::new(),
            parameters: HashMap::new(),
            expire_at: None,
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expire_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, StoredJob>,
    sets: HashMap<String, HashMap<String, f64>>,
    counters: HashMap<String, i64>,
    queues: HashMap<String, VecDeque<JobId>>,
}

impl Inner {
    fn live_job(&self, job_id: &JobId) -> Option<&StoredJob> {
        let now = Utc::now();
        self.jobs.get(job_id).filter(|j| j.is_live(now))
    }

    fn live_job_mut(&mut self, job_id: &JobId) -> Option<&mut StoredJob> {
        let now = Utc::now();
        self.jobs.get_mut(job_id).filter(|j| j.is_live(now))
    }
}

/// In-memory job storage.
///
/// - All data lives behind one `RwLock`; a commit applies its whole batch
///   under a single write guard, so readers never see half a transaction
/// - Locks are process-local (`Mutex` + `Condvar`), which is enough to
///   model cross-worker exclusion inside one test process
/// - Expired jobs are treated as absent by every read
///
/// Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    inner: RwLock<Inner>,
    held_locks: Mutex<HashSet<String>>,
    lock_released: Condvar,
    fail_next_commit: AtomicBool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StorageError> {
        self.inner
            .read()
            .map_err(|_| StorageError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StorageError> {
        self.inner
            .write()
            .map_err(|_| StorageError::Unavailable("lock poisoned".to_string()))
    }

    /// Store a new job with a generated id. The job has no state yet.
    pub fn create_job(&self, job: &Job) -> Result<JobId, StorageError> {
        let id = JobId::generate();
        self.create_job_with_id(id.clone(), job)?;
        Ok(id)
    }

    /// Store a new job under a caller-chosen id.
    pub fn create_job_with_id(&self, id: JobId, job: &Job) -> Result<(), StorageError> {
        self.create_job_with_invocation_data(id, job.to_invocation_data())
    }

    /// Store raw invocation data, valid or not.
    pub fn create_job_with_invocation_data(
        &self,
        id: JobId,
        invocation_data: serde_json::Value,
    ) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        if inner.jobs.contains_key(&id) {
            return Err(StorageError::JobAlreadyExists(id));
        }
        inner.jobs.insert(id, StoredJob::new(invocation_data));
        Ok(())
    }

    /// Make the next commit fail without applying anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Members of a set, lowest score first.
    pub fn set_members(&self, key: &str) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut members: Vec<(&String, f64)> = inner
            .sets
            .get(key)
            .map(|s| s.iter().map(|(v, score)| (v, *score)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        members.into_iter().map(|(v, _)| v.clone()).collect()
    }

    pub fn set_score(&self, key: &str, value: &str) -> Option<f64> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.sets.get(key).and_then(|s| s.get(value)).copied()
    }

    pub fn counter(&self, key: &str) -> i64 {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.counters.get(key).copied().unwrap_or(0)
    }

    pub fn queue_contents(&self, queue: &str) -> Vec<JobId> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn job_expire_at(&self, job_id: &JobId) -> Option<DateTime<Utc>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.jobs.get(job_id).and_then(|j| j.expire_at)
    }

    fn release_lock(&self, resource: &str) {
        let mut held = self
            .held_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(resource);
        self.lock_released.notify_all();
    }
}

impl StorageConnection for InMemoryStorage {
    fn load_job_data(&self, job_id: &JobId) -> Result<Option<JobData>, StorageError> {
        let inner = self.read()?;
        Ok(inner.live_job(job_id).map(|j| JobData {
            invocation_data: j.invocation_data.clone(),
            created_at: j.created_at,
            state: j.state.as_ref().map(|s| s.name().to_string()),
        }))
    }

    fn get_job_state(&self, job_id: &JobId) -> Result<Option<String>, StorageError> {
        let inner = self.read()?;
        Ok(inner
            .live_job(job_id)
            .and_then(|j| j.state.as_ref())
            .map(|s| s.name().to_string()))
    }

    fn get_state_history(&self, job_id: &JobId) -> Result<Vec<StateHistoryEntry>, StorageError> {
        let inner = self.read()?;
        Ok(inner
            .live_job(job_id)
            .map(|j| j.history.clone())
            .unwrap_or_default())
    }

    fn set_job_parameter(
        &self,
        job_id: &JobId,
        name: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        let job = inner
            .live_job_mut(job_id)
            .ok_or_else(|| StorageError::JobNotFound(job_id.clone()))?;
        job.parameters.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn get_job_parameter(&self, job_id: &JobId, name: &str) -> Result<Option<String>, StorageError> {
        let inner = self.read()?;
        Ok(inner
            .live_job(job_id)
            .and_then(|j| j.parameters.get(name))
            .cloned())
    }

    fn fetch_next_job(&self, queues: &[String]) -> Result<Option<JobId>, StorageError> {
        let mut inner = self.write()?;
        Ok(queues
            .iter()
            .find_map(|q| inner.queues.get_mut(q).and_then(VecDeque::pop_front)))
    }

    fn create_write_transaction(&self) -> Box<dyn WriteTransaction + '_> {
        Box::new(InMemoryTransaction {
            storage: self,
            commands: Vec::new(),
        })
    }

    fn acquire_distributed_lock(
        &self,
        resource: &str,
        timeout: Duration,
    ) -> Result<DistributedLockHandle<'_>, StorageError> {
        let deadline = Instant::now() + timeout;
        let mut held = self
            .held_locks
            .lock()
            .map_err(|_| StorageError::Unavailable("lock table poisoned".to_string()))?;

        while held.contains(resource) {
            let now = Instant::now();
            if now >= deadline {
                debug!(resource, ?timeout, "distributed lock wait timed out");
                return Err(StorageError::LockTimeout {
                    resource: resource.to_string(),
                    timeout,
                });
            }
            let (guard, _) = self
                .lock_released
                .wait_timeout(held, deadline - now)
                .map_err(|_| StorageError::Unavailable("lock table poisoned".to_string()))?;
            held = guard;
        }

        held.insert(resource.to_string());
        drop(held);

        let owned = resource.to_string();
        Ok(DistributedLockHandle::new(resource, move || {
            self.release_lock(&owned)
        }))
    }
}

#[derive(Debug, Clone)]
enum Command {
    SetState(JobId, StateValue),
    AddHistory(JobId, StateValue),
    ExpireHistory(JobId, usize),
    ExpireJob(JobId, Duration),
    PersistJob(JobId),
    AddToSet { key: String, value: String, score: f64 },
    RemoveFromSet { key: String, value: String },
    IncrementCounter(String),
    AddToQueue(String, JobId),
}

impl Command {
    fn job_id(&self) -> Option<&JobId> {
        match self {
            Command::SetState(id, _)
            | Command::AddHistory(id, _)
            | Command::ExpireHistory(id, _)
            | Command::ExpireJob(id, _)
            | Command::PersistJob(id) => Some(id),
            _ => None,
        }
    }
}

struct InMemoryTransaction<'a> {
    storage: &'a InMemoryStorage,
    commands: Vec<Command>,
}

impl WriteTransaction for InMemoryTransaction<'_> {
    fn set_job_state(&mut self, job_id: &JobId, state: &StateValue) {
        self.commands
            .push(Command::SetState(job_id.clone(), state.clone()));
    }

    fn add_job_history_entry(&mut self, job_id: &JobId, state: &StateValue) {
        self.commands
            .push(Command::AddHistory(job_id.clone(), state.clone()));
    }

    fn expire_history(&mut self, job_id: &JobId, max_entries: usize) {
        self.commands
            .push(Command::ExpireHistory(job_id.clone(), max_entries));
    }

    fn expire_job(&mut self, job_id: &JobId, expire_in: Duration) {
        self.commands
            .push(Command::ExpireJob(job_id.clone(), expire_in));
    }

    fn persist_job(&mut self, job_id: &JobId) {
        self.commands.push(Command::PersistJob(job_id.clone()));
    }

    fn add_to_set(&mut self, key: &str, value: &str, score: f64) {
        self.commands.push(Command::AddToSet {
            key: key.to_string(),
            value: value.to_string(),
            score,
        });
    }

    fn remove_from_set(&mut self, key: &str, value: &str) {
        self.commands.push(Command::RemoveFromSet {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    fn increment_counter(&mut self, key: &str) {
        self.commands
            .push(Command::IncrementCounter(key.to_string()));
    }

    fn add_to_queue(&mut self, queue: &str, job_id: &JobId) {
        self.commands
            .push(Command::AddToQueue(queue.to_string(), job_id.clone()));
    }

    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let InMemoryTransaction { storage, commands } = *self;

        if storage.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Transaction(
                "commit rejected by backend".to_string(),
            ));
        }

        let mut inner = storage.write()?;

        // Validate everything before touching anything (all or nothing).
        for command in &commands {
            if let Some(id) = command.job_id() {
                if inner.live_job(id).is_none() {
                    return Err(StorageError::JobNotFound(id.clone()));
                }
            }
        }

        debug!(commands = commands.len(), "committing in-memory transaction");
        let now = Utc::now();
        for command in commands {
            apply(&mut inner, command, now);
        }

        Ok(())
    }
}

fn apply(inner: &mut Inner, command: Command, now: DateTime<Utc>) {
    match command {
        Command::SetState(id, state) => {
            if let Some(job) = inner.jobs.get_mut(&id) {
                job.state = Some(state);
            }
        }
        Command::AddHistory(id, state) => {
            if let Some(job) = inner.jobs.get_mut(&id) {
                job.history.push(StateHistoryEntry {
                    state,
                    recorded_at: now,
                });
            }
        }
        Command::ExpireHistory(id, max_entries) => {
            if let Some(job) = inner.jobs.get_mut(&id) {
                let excess = job.history.len().saturating_sub(max_entries);
                job.history.drain(..excess);
            }
        }
        Command::ExpireJob(id, expire_in) => {
            if let Some(job) = inner.jobs.get_mut(&id) {
                job.expire_at = chrono::Duration::from_std(expire_in)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d));
            }
        }
        Command::PersistJob(id) => {
            if let Some(job) = inner.jobs.get_mut(&id) {
                job.expire_at = None;
            }
        }
        Command::AddToSet { key, value, score } => {
            inner.sets.entry(key).or_default().insert(value, score);
        }
        Command::RemoveFromSet { key, value } => {
            if let Some(set) = inner.sets.get_mut(&key) {
                set.remove(&value);
                if set.is_empty() {
                    inner.sets.remove(&key);
                }
            }
        }
        Command::IncrementCounter(key) => {
            *inner.counters.entry(key).or_insert(0) += 1;
        }
        Command::AddToQueue(queue, id) => {
            inner.queues.entry(queue).or_default().push_back(id);
        }
    }
}
