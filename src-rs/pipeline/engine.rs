use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::context::RunContext;
use super::state::{ExecutionState, StateUpdate};
use crate::error::AppError;
use crate::task::{Checkpoint, CheckpointStore};

/// One unit of pipeline work. A step reads the state and returns the update
/// it wants merged; an `Err` aborts the run.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, state: &ExecutionState, ctx: &RunContext) -> Result<StateUpdate, AppError>;
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub state: ExecutionState,
    pub error: Option<AppError>,
    pub resumed: bool,
}

impl PipelineOutcome {
    pub fn into_result(self) -> Result<ExecutionState, AppError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.state),
        }
    }
}

pub struct Pipeline {
    name: String,
    steps: Vec<Arc<dyn Step>>,
    max_turns: usize,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

pub struct PipelineBuilder {
    name: String,
    steps: Vec<Arc<dyn Step>>,
    max_turns: usize,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

impl PipelineBuilder {
    pub fn step(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn build(self) -> Result<Pipeline, AppError> {
        if self.steps.is_empty() {
            return Err(AppError::configuration("pipeline has no steps", None));
        }
        if self.max_turns == 0 {
            return Err(AppError::configuration("max_turns must be at least 1", Some("APP_MAX_TURNS")));
        }
        Ok(Pipeline {
            name: self.name,
            steps: self.steps,
            max_turns: self.max_turns,
            checkpoints: self.checkpoints,
        })
    }
}

impl Pipeline {
    pub fn builder(name: &str) -> PipelineBuilder {
        PipelineBuilder {
            name: name.to_string(),
            steps: Vec::new(),
            max_turns: 10,
            checkpoints: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub async fn run(&self, state: ExecutionState, ctx: &RunContext) -> PipelineOutcome {
        let task_id = state.task().task_id.clone();
        let span = info_span!("pipeline", pipeline = %self.name, task_id = %task_id);
        self.run_steps(state, ctx).instrument(span).await
    }

    async fn run_steps(&self, state: ExecutionState, ctx: &RunContext) -> PipelineOutcome {
        let (mut state, resumed) = match self.restore(state).await {
            Restored::Finished(state) => {
                info!("returning finished checkpoint");
                return PipelineOutcome {
                    state,
                    error: None,
                    resumed: true,
                };
            }
            Restored::Partial(state) => (state, true),
            Restored::Fresh(state) => (state, false),
        };

        let mut checkpointing = true;
        for step in &self.steps {
            let name = step.name();
            if state.has_completed(name) {
                debug!(step = name, "skipping step completed before resume");
                continue;
            }

            let turn = state.enter_step();
            if turn > self.max_turns {
                let err = AppError::max_turns(self.max_turns).with_detail("step", name);
                error!(step = name, turn, "turn limit reached");
                return fatal(state, err, resumed);
            }
            if let Err(err) = ctx.check(name) {
                warn!(step = name, error = %err, "run interrupted before step");
                return fatal(state, err.with_detail("step", name), resumed);
            }

            let span = info_span!("step", step = name, turn);
            span.in_scope(|| debug!("step started"));
            let update = step.run(&state, ctx).instrument(span).await;
            let update = match update {
                Ok(update) => update,
                Err(err) => {
                    error!(step = name, code = err.code(), error = %err.describe(), "step failed");
                    let err = err
                        .with_detail("step", name)
                        .with_agent_context(Some(self.name.as_str()), Some(state.task().task_id.as_str()));
                    return fatal(state, err, resumed);
                }
            };
            let clean = update.errors.is_empty();
            if let Err(err) = state.apply(update) {
                return fatal(state, err.with_detail("step", name), resumed);
            }
            state.mark_completed(name);
            debug!(step = name, "step completed");
            // a step that recorded errors must run again on retry
            if checkpointing && !clean {
                debug!(step = name, "step recorded errors, checkpointing stops for this run");
                checkpointing = false;
            }
            if checkpointing {
                self.save(&state, false).await;
            }
        }

        if checkpointing {
            self.save(&state, true).await;
        }
        info!(
            errors = state.errors().len(),
            has_result = state.result().is_some(),
            "pipeline finished"
        );
        PipelineOutcome {
            state,
            error: None,
            resumed,
        }
    }

    async fn restore(&self, state: ExecutionState) -> Restored {
        let store = match &self.checkpoints {
            Some(store) => store,
            None => return Restored::Fresh(state),
        };
        let checkpoint = match store.load(&state.task().task_id).await {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => return Restored::Fresh(state),
            Err(err) => {
                warn!(error = %err, "checkpoint load failed, starting fresh");
                return Restored::Fresh(state);
            }
        };
        if checkpoint.state.task() != state.task() {
            warn!("checkpoint belongs to a different task payload, starting fresh");
            return Restored::Fresh(state);
        }
        if checkpoint.finished {
            Restored::Finished(checkpoint.state)
        } else {
            info!(
                completed = checkpoint.state.completed_steps().len(),
                "resuming from checkpoint"
            );
            Restored::Partial(checkpoint.state)
        }
    }

    async fn save(&self, state: &ExecutionState, finished: bool) {
        if let Some(store) = &self.checkpoints {
            if let Err(err) = store.save(Checkpoint::new(state.clone(), finished)).await {
                warn!(error = %err, "checkpoint save failed");
            }
        }
    }
}

enum Restored {
    Fresh(ExecutionState),
    Partial(ExecutionState),
    Finished(ExecutionState),
}

fn fatal(state: ExecutionState, err: AppError, resumed: bool) -> PipelineOutcome {
    PipelineOutcome {
        state,
        error: Some(err),
        resumed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StepError;
    use crate::result::DetectionResult;
    use crate::task::{DetectionTask, MemoryCheckpointStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Recorder {
        name: String,
        calls: Arc<AtomicUsize>,
        fail: Option<fn() -> AppError>,
    }

    #[async_trait]
    impl Step for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, _state: &ExecutionState, _ctx: &RunContext) -> Result<StateUpdate, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail {
                Some(make) => Err(make()),
                None => Ok(StateUpdate::new().log(format!("{} ran", self.name))),
            }
        }
    }

    struct Produce;

    #[async_trait]
    impl Step for Produce {
        fn name(&self) -> &str {
            "produce"
        }

        async fn run(&self, state: &ExecutionState, _ctx: &RunContext) -> Result<StateUpdate, AppError> {
            Ok(StateUpdate::new().result(DetectionResult::success(&state.task().task_id, vec![])))
        }
    }

    struct FailsOnce {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Step for FailsOnce {
        fn name(&self) -> &str {
            "detect"
        }

        async fn run(&self, state: &ExecutionState, _ctx: &RunContext) -> Result<StateUpdate, AppError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(StateUpdate::new()
                    .error(StepError::new("detect", "external_service", "down"))
                    .log("detect failed"));
            }
            Ok(StateUpdate::new().result(DetectionResult::success(&state.task().task_id, vec![])))
        }
    }

    struct Sleeper;

    #[async_trait]
    impl Step for Sleeper {
        fn name(&self) -> &str {
            "sleep"
        }

        async fn run(&self, _state: &ExecutionState, ctx: &RunContext) -> Result<StateUpdate, AppError> {
            ctx.guard("sleep", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(StateUpdate::new())
            })
            .await
        }
    }

    fn recorder(name: &str, calls: &Arc<AtomicUsize>) -> Arc<dyn Step> {
        Arc::new(Recorder {
            name: name.to_string(),
            calls: Arc::clone(calls),
            fail: None,
        })
    }

    fn state() -> ExecutionState {
        ExecutionState::new(DetectionTask::new("t1", "a1", "s", "e"))
    }

    #[tokio::test]
    async fn steps_run_in_declaration_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::builder("p")
            .step(recorder("one", &calls))
            .step(recorder("two", &calls))
            .build()
            .unwrap();
        let state = pipeline.run(state(), &RunContext::new("x")).await.into_result().unwrap();
        assert_eq!(state.logs(), &["one ran".to_string(), "two ran".to_string()]);
        assert_eq!(state.completed_steps(), &["one".to_string(), "two".to_string()]);
        assert_eq!(state.step_count(), 2);
    }

    #[tokio::test]
    async fn turn_limit_stops_before_the_next_step() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::builder("p")
            .step(recorder("one", &calls))
            .step(recorder("two", &calls))
            .step(recorder("three", &calls))
            .max_turns(2)
            .build()
            .unwrap();
        let outcome = pipeline.run(state(), &RunContext::new("x")).await;
        let err = outcome.error.unwrap();
        assert_eq!(err.code(), "max_turns");
        assert_eq!(err.detail("step"), Some(&json!("three")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_error_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let failing = Arc::new(Recorder {
            name: "boom".to_string(),
            calls: Arc::clone(&calls),
            fail: Some(|| AppError::data_missing("task missing")),
        });
        let pipeline = Pipeline::builder("p")
            .step(failing)
            .step(recorder("after", &calls))
            .build()
            .unwrap();
        let err = pipeline.run(state(), &RunContext::new("x")).await.into_result().unwrap_err();
        assert_eq!(err.code(), "data_missing");
        assert_eq!(err.detail("step"), Some(&json!("boom")));
        assert_eq!(err.detail("agent_name"), Some(&json!("p")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_run_does_not_start_steps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::builder("p").step(recorder("one", &calls)).build().unwrap();
        let (ctx, handle) = RunContext::cancellable("x");
        handle.cancel();
        let err = pipeline.run(state(), &ctx).await.into_result().unwrap_err();
        assert_eq!(err.code(), "timeout");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn deadline_aborts_a_suspended_step() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::builder("p")
            .step(Arc::new(Sleeper))
            .step(recorder("after", &calls))
            .build()
            .unwrap();
        let ctx = RunContext::new("x").with_timeout(Duration::from_millis(20));
        let err = pipeline.run(state(), &ctx).await.into_result().unwrap_err();
        assert_eq!(err.status_code(), 504);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn finished_checkpoint_is_returned_without_rerunning() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryCheckpointStore::new(None));
        let pipeline = Pipeline::builder("p")
            .step(recorder("one", &calls))
            .step(Arc::new(Produce))
            .checkpoints(store.clone())
            .build()
            .unwrap();

        let first = pipeline.run(state(), &RunContext::new("x")).await;
        assert!(!first.resumed);
        let second = pipeline.run(state(), &RunContext::new("y")).await;
        assert!(second.resumed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.state, second.state);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn partial_checkpoint_resumes_after_completed_steps() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryCheckpointStore::new(None));
        let broken = Pipeline::builder("p")
            .step(recorder("one", &first_calls))
            .step(Arc::new(Recorder {
                name: "two".to_string(),
                calls: Arc::clone(&first_calls),
                fail: Some(|| AppError::external_service("down")),
            }))
            .checkpoints(store.clone())
            .build()
            .unwrap();
        assert!(broken.run(state(), &RunContext::new("x")).await.error.is_some());

        let second_calls = Arc::new(AtomicUsize::new(0));
        let fixed = Pipeline::builder("p")
            .step(recorder("one", &second_calls))
            .step(recorder("two", &second_calls))
            .checkpoints(store.clone())
            .build()
            .unwrap();
        let outcome = fixed.run(state(), &RunContext::new("y")).await;
        assert!(outcome.resumed);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcome.into_result().unwrap().logs(),
            &["one ran".to_string(), "two ran".to_string()]
        );
    }

    #[tokio::test]
    async fn recorded_errors_are_retried_not_replayed() {
        let load_calls = Arc::new(AtomicUsize::new(0));
        let detect_calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryCheckpointStore::new(None));
        let pipeline = Pipeline::builder("p")
            .step(recorder("load", &load_calls))
            .step(Arc::new(FailsOnce {
                calls: Arc::clone(&detect_calls),
            }))
            .checkpoints(store.clone())
            .build()
            .unwrap();

        let first = pipeline.run(state(), &RunContext::new("x")).await.into_result().unwrap();
        assert!(first.result().is_none());
        assert_eq!(first.errors().len(), 1);

        let retry = pipeline.run(state(), &RunContext::new("y")).await;
        assert!(retry.resumed);
        assert_eq!(detect_calls.load(Ordering::SeqCst), 2);
        assert_eq!(load_calls.load(Ordering::SeqCst), 1);
        let retried = retry.into_result().unwrap();
        assert!(retried.result().is_some());
        assert!(retried.errors().is_empty());

        let cached = pipeline.run(state(), &RunContext::new("z")).await;
        assert!(cached.resumed);
        assert_eq!(detect_calls.load(Ordering::SeqCst), 2);
        assert!(cached.state.result().is_some());
    }

    #[tokio::test]
    async fn different_payload_with_same_id_starts_fresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryCheckpointStore::new(None));
        let pipeline = Pipeline::builder("p")
            .step(recorder("one", &calls))
            .checkpoints(store)
            .build()
            .unwrap();
        pipeline.run(state(), &RunContext::new("x")).await;
        let other = ExecutionState::new(DetectionTask::new("t1", "a2", "s", "e"));
        let outcome = pipeline.run(other, &RunContext::new("y")).await;
        assert!(!outcome.resumed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn builder_rejects_empty_pipelines() {
        assert!(Pipeline::builder("p").build().is_err());
    }
}
