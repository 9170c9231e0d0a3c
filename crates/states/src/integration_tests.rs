//! Integration tests for the state change pipeline.
//!
//! Tests: StateChangeContext → lock → election → expected-state check →
//! handlers / applied filters → commit, against the in-memory backend.
//!
//! Verifies:
//! - Successful transitions persist state, history and handler side effects
//! - Filters rewrite candidates cumulatively and can roll a transition back
//! - Missing jobs and unexpected states never mutate storage
//! - Concurrent transitions of one job are linearized by the per-job lock

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::bail;
    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::json;

    use jobflow_core::state::names;
    use jobflow_core::{Job, JobId, StateValue};
    use jobflow_storage::{InMemoryStorage, StorageConnection, StorageError, WriteTransaction};

    use crate::config::{KeepLast, StateChangeConfig};
    use crate::context::{ApplyStateContext, StateChangeContext};
    use crate::error::StateChangeError;
    use crate::filter::{ApplyStateFilter, JobFilters, apply_filter_fn, election_filter_fn};
    use crate::handlers::{SCHEDULE_SET, StateHandler, StateHandlerCollection};
    use crate::process::{NoTransitionReason, StateChangeOutcome, StateChangeProcess, StateChanger};
    use crate::retry::{AttemptsExceeded, AutomaticRetry, RETRY_COUNT_PARAMETER, RetryPolicy};

    fn test_job() -> Job {
        Job::new("EmailSender", "Send", vec![r#""ops@example.com""#.to_string()]).unwrap()
    }

    fn setup(id: &str) -> (Arc<InMemoryStorage>, JobId) {
        let storage = Arc::new(InMemoryStorage::new());
        let job_id = JobId::new(id).unwrap();
        storage.create_job_with_id(job_id.clone(), &test_job()).unwrap();
        (storage, job_id)
    }

    fn changer(filters: JobFilters) -> StateChanger {
        StateChanger::new(
            StateHandlerCollection::with_defaults(),
            filters,
            StateChangeConfig::default(),
        )
    }

    fn processing() -> StateValue {
        StateValue::processing("server-1", "worker-1")
    }

    fn succeeded() -> StateValue {
        StateValue::succeeded(Some("\"done\"".to_string()), 5, 20)
    }

    /// Move a job into `state` unconditionally, with filters disabled.
    fn force_state(storage: &InMemoryStorage, job_id: &JobId, state: StateValue) {
        let outcome = changer(JobFilters::new())
            .try_change_state(
                StateChangeContext::new(storage, job_id.clone(), state).without_filters(),
            )
            .unwrap();
        assert!(outcome.is_applied());
    }

    fn history_names(storage: &InMemoryStorage, job_id: &JobId) -> Vec<String> {
        storage
            .get_state_history(job_id)
            .unwrap()
            .into_iter()
            .map(|e| e.state.name().to_string())
            .collect()
    }

    #[test]
    fn processing_job_moves_to_succeeded() {
        let (storage, job_id) = setup("42");
        force_state(&storage, &job_id, processing());

        let applied = changer(JobFilters::new())
            .change_state(
                StateChangeContext::new(&*storage, job_id.clone(), succeeded())
                    .expecting([names::PROCESSING]),
            )
            .unwrap()
            .expect("transition should apply");

        assert!(applied.is(names::SUCCEEDED));
        assert_eq!(
            storage.get_job_state(&job_id).unwrap().as_deref(),
            Some(names::SUCCEEDED)
        );
        assert_eq!(
            history_names(&storage, &job_id),
            vec![names::PROCESSING, names::SUCCEEDED]
        );
        assert!(storage.set_members("state:processing").is_empty());
        assert_eq!(storage.set_members("state:succeeded"), vec!["42"]);
        assert_eq!(storage.counter("stats:succeeded"), 1);
        assert!(storage.job_expire_at(&job_id).is_some());
    }

    #[test]
    fn second_transition_from_processing_is_rejected() {
        let (storage, job_id) = setup("42");
        force_state(&storage, &job_id, processing());
        let changer = changer(JobFilters::new());

        let first = changer
            .change_state(
                StateChangeContext::new(&*storage, job_id.clone(), succeeded())
                    .expecting([names::PROCESSING]),
            )
            .unwrap();
        assert!(first.is_some());

        let second = changer
            .try_change_state(
                StateChangeContext::new(&*storage, job_id.clone(), succeeded())
                    .expecting([names::PROCESSING]),
            )
            .unwrap();

        assert_eq!(
            second,
            StateChangeOutcome::NoTransition(NoTransitionReason::UnexpectedState {
                expected: vec![names::PROCESSING.to_string()],
                actual: Some(names::SUCCEEDED.to_string()),
            })
        );
        assert_eq!(history_names(&storage, &job_id).len(), 2);
        assert_eq!(storage.counter("stats:succeeded"), 1);
    }

    #[test]
    fn expected_states_match_case_insensitively() {
        let (storage, job_id) = setup("42");
        force_state(&storage, &job_id, processing());

        let applied = changer(JobFilters::new())
            .change_state(
                StateChangeContext::new(&*storage, job_id.clone(), succeeded())
                    .expecting(["processing", "enqueued"]),
            )
            .unwrap();

        assert!(applied.is_some());
    }

    #[test]
    fn job_without_state_fails_non_empty_expectation() {
        let (storage, job_id) = setup("42");

        let outcome = changer(JobFilters::new())
            .try_change_state(
                StateChangeContext::new(&*storage, job_id.clone(), processing())
                    .expecting([names::ENQUEUED]),
            )
            .unwrap();

        assert!(matches!(
            outcome,
            StateChangeOutcome::NoTransition(NoTransitionReason::UnexpectedState { actual: None, .. })
        ));
        assert_eq!(storage.get_job_state(&job_id).unwrap(), None);
    }

    #[test]
    fn retry_filter_reschedules_failed_job() {
        let (storage, job_id) = setup("42");
        force_state(&storage, &job_id, processing());
        let filters = JobFilters::new().with_election_filter(AutomaticRetry::new(
            RetryPolicy::fixed(3, Duration::from_secs(60)),
        ));

        let before = Utc::now();
        let applied = changer(filters)
            .change_state(
                StateChangeContext::new(
                    &*storage,
                    job_id.clone(),
                    StateValue::failed("connection refused", "at send()"),
                )
                .expecting([names::PROCESSING]),
            )
            .unwrap()
            .expect("retry should be scheduled");

        assert!(applied.is(names::SCHEDULED));
        assert_eq!(
            applied.reason(),
            Some("Retry attempt 1 of 3: connection refused")
        );
        let enqueue_at = applied
            .timestamp(jobflow_core::state::keys::ENQUEUE_AT)
            .unwrap();
        assert!(enqueue_at >= before + chrono::Duration::seconds(59));

        assert_eq!(
            storage
                .get_job_parameter(&job_id, RETRY_COUNT_PARAMETER)
                .unwrap()
                .as_deref(),
            Some("1")
        );
        // The replaced Failed candidate is kept in history.
        assert_eq!(
            history_names(&storage, &job_id),
            vec![names::PROCESSING, names::FAILED, names::SCHEDULED]
        );
        assert_eq!(storage.set_members(SCHEDULE_SET), vec!["42"]);
        assert!(storage.set_members("state:failed").is_empty());
        assert!(storage.job_expire_at(&job_id).is_none());
    }

    #[test]
    fn exhausted_retries_keep_failed_state() {
        let (storage, job_id) = setup("42");
        force_state(&storage, &job_id, processing());
        storage
            .set_job_parameter(&job_id, RETRY_COUNT_PARAMETER, "3")
            .unwrap();
        let filters = JobFilters::new().with_election_filter(AutomaticRetry::new(
            RetryPolicy::fixed(3, Duration::from_secs(60)),
        ));

        let applied = changer(filters)
            .change_state(StateChangeContext::new(
                &*storage,
                job_id.clone(),
                StateValue::failed("boom", ""),
            ))
            .unwrap()
            .unwrap();

        assert!(applied.is(names::FAILED));
        assert_eq!(storage.set_members("state:failed"), vec!["42"]);
        assert!(storage.set_members(SCHEDULE_SET).is_empty());
    }

    #[test]
    fn exhausted_retries_can_delete_the_job() {
        let (storage, job_id) = setup("42");
        storage
            .set_job_parameter(&job_id, RETRY_COUNT_PARAMETER, "1")
            .unwrap();
        let filters = JobFilters::new().with_election_filter(
            AutomaticRetry::new(RetryPolicy::fixed(1, Duration::from_secs(1)))
                .on_attempts_exceeded(AttemptsExceeded::Delete),
        );

        let applied = changer(filters)
            .change_state(StateChangeContext::new(
                &*storage,
                job_id.clone(),
                StateValue::failed("boom", ""),
            ))
            .unwrap()
            .unwrap();

        assert!(applied.is(names::DELETED));
        assert!(applied.is_final());
        assert!(storage.job_expire_at(&job_id).is_some());
        assert_eq!(storage.counter("stats:deleted"), 1);
    }

    #[test]
    fn missing_job_is_not_mutated() {
        let storage = InMemoryStorage::new();
        let job_id = JobId::new("missing").unwrap();

        let outcome = changer(JobFilters::new())
            .try_change_state(StateChangeContext::new(&storage, job_id.clone(), succeeded()))
            .unwrap();

        assert_eq!(
            outcome,
            StateChangeOutcome::NoTransition(NoTransitionReason::JobNotFound)
        );
        assert!(storage.set_members("state:succeeded").is_empty());
        assert_eq!(storage.counter("stats:succeeded"), 0);
        assert!(storage.get_state_history(&job_id).unwrap().is_empty());
    }

    #[test]
    fn corrupt_job_data_yields_no_transition() {
        let storage = InMemoryStorage::new();
        let job_id = JobId::new("corrupt").unwrap();
        storage
            .create_job_with_invocation_data(job_id.clone(), json!({ "bogus": true }))
            .unwrap();

        let outcome = changer(JobFilters::new())
            .try_change_state(StateChangeContext::new(&storage, job_id.clone(), succeeded()))
            .unwrap();

        assert!(matches!(
            outcome,
            StateChangeOutcome::NoTransition(NoTransitionReason::JobDataUnavailable(_))
        ));
        assert_eq!(storage.get_job_state(&job_id).unwrap(), None);
    }

    type Log = Arc<Mutex<Vec<String>>>;

    struct RecordingHandler {
        state: &'static str,
        log: Log,
    }

    impl StateHandler for RecordingHandler {
        fn state_name(&self) -> &str {
            self.state
        }

        fn apply(
            &self,
            _context: &ApplyStateContext<'_>,
            _transaction: &mut dyn WriteTransaction,
        ) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("apply:{}", self.state));
            Ok(())
        }

        fn unapply(
            &self,
            _context: &ApplyStateContext<'_>,
            _transaction: &mut dyn WriteTransaction,
        ) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("unapply:{}", self.state));
            Ok(())
        }
    }

    struct RecordingFilter {
        log: Log,
    }

    impl ApplyStateFilter for RecordingFilter {
        fn on_state_applied(
            &self,
            context: &ApplyStateContext<'_>,
            _transaction: &mut dyn WriteTransaction,
        ) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("applied:{}", context.new_state.name()));
            Ok(())
        }

        fn on_state_unapplied(
            &self,
            context: &ApplyStateContext<'_>,
            _transaction: &mut dyn WriteTransaction,
        ) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("unapplied:{}", context.old_state.unwrap_or("")));
            Ok(())
        }
    }

    #[test]
    fn old_state_is_unapplied_before_new_state_is_applied() {
        let (storage, job_id) = setup("42");
        force_state(&storage, &job_id, processing());
        let log: Log = Arc::default();

        let handlers = StateHandlerCollection::new()
            .with_handler(RecordingHandler {
                state: names::SUCCEEDED,
                log: log.clone(),
            })
            .with_handler(RecordingHandler {
                state: names::PROCESSING,
                log: log.clone(),
            });
        let filters = JobFilters::new().with_apply_filter(RecordingFilter { log: log.clone() });
        let changer = StateChanger::new(handlers, filters, StateChangeConfig::default());

        changer
            .change_state(StateChangeContext::new(&*storage, job_id, succeeded()))
            .unwrap()
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "unapply:Processing",
                "unapplied:Processing",
                "apply:Succeeded",
                "applied:Succeeded",
            ]
        );
    }

    #[test]
    fn election_filters_see_previous_output() {
        let (storage, job_id) = setup("42");
        let seen: Log = Arc::default();
        let seen_by_second = seen.clone();

        let filters = JobFilters::new()
            .with_election_filter(election_filter_fn("to-intermediate", |_, _| {
                Ok(StateValue::new("Intermediate"))
            }))
            .with_election_filter(election_filter_fn("to-final", move |_, candidate| {
                seen_by_second
                    .lock()
                    .unwrap()
                    .push(candidate.name().to_string());
                Ok(StateValue::new("Final"))
            }));

        let applied = changer(filters)
            .change_state(StateChangeContext::new(&*storage, job_id.clone(), processing()))
            .unwrap()
            .unwrap();

        assert_eq!(applied.name(), "Final");
        assert_eq!(*seen.lock().unwrap(), vec!["Intermediate"]);
        assert_eq!(
            history_names(&storage, &job_id),
            vec![names::PROCESSING, "Intermediate", "Final"]
        );
    }

    #[test]
    fn expected_state_is_checked_against_state_reread_after_election() {
        let (storage, job_id) = setup("42");
        force_state(&storage, &job_id, StateValue::enqueued("default"));
        let loaded: Log = Arc::default();
        let loaded_by_filter = loaded.clone();

        let filters = JobFilters::new().with_election_filter(election_filter_fn(
            "concurrent-delete",
            move |ctx, candidate| {
                loaded_by_filter
                    .lock()
                    .unwrap()
                    .extend(ctx.current_state.map(str::to_string));
                let mut tx = ctx.connection.create_write_transaction();
                tx.set_job_state(&ctx.background_job.id, &StateValue::deleted());
                tx.commit()?;
                Ok(candidate)
            },
        ));

        let outcome = changer(filters)
            .try_change_state(
                StateChangeContext::new(&*storage, job_id.clone(), processing())
                    .expecting([names::ENQUEUED]),
            )
            .unwrap();

        assert_eq!(*loaded.lock().unwrap(), vec![names::ENQUEUED]);
        assert_eq!(
            outcome,
            StateChangeOutcome::NoTransition(NoTransitionReason::UnexpectedState {
                expected: vec![names::ENQUEUED.to_string()],
                actual: Some(names::DELETED.to_string()),
            })
        );
        assert!(storage.set_members("state:processing").is_empty());
        assert_eq!(history_names(&storage, &job_id), vec![names::ENQUEUED]);
    }

    #[test]
    fn disabled_filters_are_skipped_but_handlers_run() {
        let (storage, job_id) = setup("42");
        let filters = JobFilters::new()
            .with_election_filter(election_filter_fn("hijack", |_, _| {
                Ok(StateValue::deleted())
            }))
            .with_apply_filter(apply_filter_fn("broken", |_, _| bail!("must not run")));

        let applied = changer(filters)
            .change_state(
                StateChangeContext::new(&*storage, job_id.clone(), StateValue::enqueued("critical"))
                    .without_filters(),
            )
            .unwrap()
            .unwrap();

        assert!(applied.is(names::ENQUEUED));
        assert_eq!(storage.queue_contents("critical"), vec![job_id]);
    }

    #[test]
    fn failing_applied_filter_rolls_back_everything() {
        let (storage, job_id) = setup("42");
        force_state(&storage, &job_id, processing());
        let filters = JobFilters::new()
            .with_apply_filter(apply_filter_fn("audit", |ctx, tx| {
                tx.increment_counter(&format!("audit:{}", ctx.new_state.name()));
                Ok(())
            }))
            .with_apply_filter(apply_filter_fn("broken", |_, _| bail!("disk full")));

        let err = changer(filters)
            .change_state(StateChangeContext::new(&*storage, job_id.clone(), succeeded()))
            .unwrap_err();

        assert!(matches!(&err, StateChangeError::Filter { filter, .. } if filter == "broken"));
        assert_eq!(
            storage.get_job_state(&job_id).unwrap().as_deref(),
            Some(names::PROCESSING)
        );
        assert_eq!(history_names(&storage, &job_id), vec![names::PROCESSING]);
        assert_eq!(storage.set_members("state:processing"), vec!["42"]);
        assert!(storage.set_members("state:succeeded").is_empty());
        assert_eq!(storage.counter("audit:Succeeded"), 0);
    }

    #[test]
    fn failing_election_filter_aborts_before_any_write() {
        let (storage, job_id) = setup("42");
        let filters = JobFilters::new()
            .with_election_filter(election_filter_fn("broken", |_, _| bail!("no vote")));

        let err = changer(filters)
            .change_state(StateChangeContext::new(&*storage, job_id.clone(), processing()))
            .unwrap_err();

        assert!(matches!(&err, StateChangeError::Filter { filter, .. } if filter == "broken"));
        assert_eq!(storage.get_job_state(&job_id).unwrap(), None);
    }

    #[test]
    fn failing_handler_rolls_back() {
        struct Broken;
        impl StateHandler for Broken {
            fn state_name(&self) -> &str {
                names::SUCCEEDED
            }
            fn apply(
                &self,
                _context: &ApplyStateContext<'_>,
                _transaction: &mut dyn WriteTransaction,
            ) -> anyhow::Result<()> {
                bail!("index unavailable")
            }
            fn unapply(
                &self,
                _context: &ApplyStateContext<'_>,
                _transaction: &mut dyn WriteTransaction,
            ) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let (storage, job_id) = setup("42");
        force_state(&storage, &job_id, processing());
        let changer = StateChanger::new(
            StateHandlerCollection::with_defaults().with_handler(Broken),
            JobFilters::new(),
            StateChangeConfig::default(),
        );

        let err = changer
            .change_state(StateChangeContext::new(&*storage, job_id.clone(), succeeded()))
            .unwrap_err();

        assert!(matches!(&err, StateChangeError::Handler { state, .. } if state == names::SUCCEEDED));
        assert_eq!(storage.set_members("state:processing"), vec!["42"]);
    }

    #[test]
    fn commit_failure_is_an_error_and_applies_nothing() {
        let (storage, job_id) = setup("42");
        force_state(&storage, &job_id, processing());
        storage.fail_next_commit();

        let err = changer(JobFilters::new())
            .change_state(StateChangeContext::new(&*storage, job_id.clone(), succeeded()))
            .unwrap_err();

        assert!(matches!(
            err,
            StateChangeError::Storage(StorageError::Transaction(_))
        ));
        assert_eq!(
            storage.get_job_state(&job_id).unwrap().as_deref(),
            Some(names::PROCESSING)
        );
        assert!(storage.job_expire_at(&job_id).is_none());
    }

    #[test]
    fn held_lock_times_out() {
        let (storage, job_id) = setup("42");
        let _held = storage
            .acquire_distributed_lock(&job_id.lock_resource(), Duration::from_secs(1))
            .unwrap();
        let changer = StateChanger::new(
            StateHandlerCollection::with_defaults(),
            JobFilters::new(),
            StateChangeConfig::default().with_lock_timeout(Duration::from_millis(50)),
        );

        let err = changer
            .change_state(StateChangeContext::new(&*storage, job_id.clone(), processing()))
            .unwrap_err();

        assert!(err.is_contention());
        assert!(matches!(&err, StateChangeError::LockTimeout { job_id: id, .. } if *id == job_id));
        assert_eq!(storage.get_job_state(&job_id).unwrap(), None);
    }

    #[test]
    fn lock_is_released_after_each_call() {
        let (storage, job_id) = setup("42");
        let changer = changer(JobFilters::new());

        changer
            .change_state(StateChangeContext::new(&*storage, job_id.clone(), processing()))
            .unwrap();
        // A no-transition outcome must release the lock too.
        changer
            .change_state(
                StateChangeContext::new(&*storage, job_id.clone(), succeeded())
                    .expecting([names::ENQUEUED]),
            )
            .unwrap();

        assert!(
            storage
                .acquire_distributed_lock(&job_id.lock_resource(), Duration::ZERO)
                .is_ok()
        );
    }

    #[test]
    fn concurrent_transitions_from_the_same_state_apply_once() {
        let (storage, job_id) = setup("42");
        force_state(&storage, &job_id, StateValue::enqueued("default"));
        let changer = changer(JobFilters::new());

        let applied: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|worker| {
                    let storage = &storage;
                    let changer = &changer;
                    let job_id = job_id.clone();
                    scope.spawn(move || {
                        changer
                            .change_state(
                                StateChangeContext::new(
                                    &**storage,
                                    job_id,
                                    StateValue::processing("server-1", format!("worker-{worker}")),
                                )
                                .expecting([names::ENQUEUED]),
                            )
                            .unwrap()
                            .is_some()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(applied.iter().filter(|a| **a).count(), 1);
        assert_eq!(
            history_names(&storage, &job_id),
            vec![names::ENQUEUED, names::PROCESSING]
        );
    }

    #[test]
    fn history_is_trimmed_to_retention_limit() {
        let (storage, job_id) = setup("42");
        let changer = StateChanger::new(
            StateHandlerCollection::with_defaults(),
            JobFilters::new(),
            StateChangeConfig::default().with_history_retention(KeepLast(2)),
        );

        for state in [
            StateValue::enqueued("default"),
            processing(),
            StateValue::failed("boom", ""),
            StateValue::enqueued("default"),
        ] {
            changer
                .change_state(StateChangeContext::new(&*storage, job_id.clone(), state))
                .unwrap()
                .unwrap();
        }

        assert_eq!(
            history_names(&storage, &job_id),
            vec![names::FAILED, names::ENQUEUED]
        );
    }

    #[test]
    fn leaving_a_final_state_cancels_expiration() {
        let (storage, job_id) = setup("42");
        let changer = StateChanger::new(
            StateHandlerCollection::with_defaults(),
            JobFilters::new(),
            StateChangeConfig::default().with_job_expiration(Duration::from_secs(3600)),
        );

        let before = Utc::now();
        changer
            .change_state(StateChangeContext::new(&*storage, job_id.clone(), succeeded()))
            .unwrap();
        let expire_at = storage.job_expire_at(&job_id).unwrap();
        assert!(expire_at >= before + chrono::Duration::seconds(3599));

        changer
            .change_state(StateChangeContext::new(
                &*storage,
                job_id.clone(),
                StateValue::enqueued("default"),
            ))
            .unwrap();
        assert!(storage.job_expire_at(&job_id).is_none());
    }

    fn well_known_state(index: usize) -> StateValue {
        match index {
            0 => StateValue::enqueued("default"),
            1 => processing(),
            2 => succeeded(),
            3 => StateValue::failed("boom", ""),
            4 => StateValue::scheduled(Utc::now() + chrono::Duration::minutes(5)),
            _ => StateValue::deleted(),
        }
    }

    const INDEXED: [&str; 6] = [
        names::ENQUEUED,
        names::PROCESSING,
        names::SUCCEEDED,
        names::FAILED,
        names::SCHEDULED,
        names::DELETED,
    ];

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of unconditional transitions, the job
        /// is indexed under exactly its current state and history records
        /// every transition in order.
        #[test]
        fn job_is_indexed_under_exactly_its_current_state(
            sequence in prop::collection::vec(0usize..6, 1..12)
        ) {
            let (storage, job_id) = setup("prop");
            let changer = changer(JobFilters::new());

            for index in &sequence {
                let applied = changer
                    .change_state(StateChangeContext::new(&*storage, job_id.clone(), well_known_state(*index)))
                    .unwrap();
                prop_assert!(applied.is_some());
            }

            let last = well_known_state(*sequence.last().unwrap());
            prop_assert_eq!(storage.get_job_state(&job_id).unwrap(), Some(last.name().to_string()));
            prop_assert_eq!(history_names(&storage, &job_id).len(), sequence.len());

            for name in INDEXED {
                let members = storage.set_members(&format!("state:{}", name.to_ascii_lowercase()));
                let expected = if name == last.name() { vec!["prop".to_string()] } else { vec![] };
                prop_assert_eq!(members, expected);
            }
        }

        /// Property: a transition applies iff the current state is one of
        /// the expected states.
        #[test]
        fn expected_states_gate_transitions(
            current in 0usize..6,
            expected in prop::collection::vec(0usize..6, 1..4)
        ) {
            let (storage, job_id) = setup("gate");
            force_state(&storage, &job_id, well_known_state(current));
            let expected_names: Vec<&str> = expected.iter().map(|i| INDEXED[*i]).collect();

            let outcome = changer(JobFilters::new())
                .try_change_state(
                    StateChangeContext::new(&*storage, job_id.clone(), processing())
                        .expecting(expected_names.iter().copied()),
                )
                .unwrap();

            prop_assert_eq!(outcome.is_applied(), expected.contains(&current));
        }
    }
}
