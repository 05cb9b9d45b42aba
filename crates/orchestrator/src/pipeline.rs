//! Pipeline builder and sequential runner

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use contracts::{
    ContractError, FailureMode, PipelineBlueprint, PipelineState, RetryPolicy, RunStatus,
    RunSummary, Stage, StageContext, StageRecord, StageStatus,
};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{OrchestratorError, Result};
use crate::retry::backoff_delay;

const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Pipeline builder
///
/// Collects stages and run policy; [`PipelineBuilder::build`] checks the
/// stage contract chain.
pub struct PipelineBuilder {
    name: String,
    seed_keys: Vec<String>,
    stages: Vec<Box<dyn Stage>>,
    retry: RetryPolicy,
    stage_retry: HashMap<String, RetryPolicy>,
    stage_timeout: Duration,
    stage_timeouts: HashMap<String, Duration>,
    failure_mode: FailureMode,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed_keys: Vec::new(),
            stages: Vec::new(),
            retry: RetryPolicy::default(),
            stage_retry: HashMap::new(),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            stage_timeouts: HashMap::new(),
            failure_mode: FailureMode::default(),
        }
    }

    /// Builder preloaded with a blueprint's policy and per-stage overrides
    ///
    /// `stages` must be the blueprint's stages, built in order.
    pub fn from_blueprint(blueprint: &PipelineBlueprint, stages: Vec<Box<dyn Stage>>) -> Self {
        let mut builder = Self::new(&blueprint.pipeline.name)
            .seed_keys(blueprint.seed_keys())
            .retry(blueprint.retry.clone())
            .stage_timeout(blueprint.stage_timeout())
            .failure_mode(blueprint.failure_mode)
            .stages(stages);

        for stage in &blueprint.stages {
            if let Some(policy) = &stage.retry {
                builder = builder.stage_retry(&stage.name, policy.clone());
            }
            if let Some(secs) = stage.timeout_secs {
                builder = builder.stage_timeout_for(&stage.name, Duration::from_secs(secs));
            }
        }
        builder
    }

    pub fn seed_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(mut self, stages: impl IntoIterator<Item = Box<dyn Stage>>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Default retry policy for every stage
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Retry policy for one stage, overriding the default
    pub fn stage_retry(mut self, stage: impl Into<String>, policy: RetryPolicy) -> Self {
        self.stage_retry.insert(stage.into(), policy);
        self
    }

    /// Time budget for a single attempt
    pub fn stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn stage_timeout_for(mut self, stage: impl Into<String>, timeout: Duration) -> Self {
        self.stage_timeouts.insert(stage.into(), timeout);
        self
    }

    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Validate the contract chain and build the pipeline
    ///
    /// # Errors
    /// [`OrchestratorError::InvalidPipeline`] when a stage name or output key
    /// repeats, an output shadows a seed, or a stage requires a key that no
    /// seed or earlier stage provides.
    pub fn build(self) -> Result<Pipeline> {
        let invalid = |reason: String| OrchestratorError::invalid(&self.name, reason);

        if self.stages.is_empty() {
            return Err(invalid("pipeline has no stages".to_string()));
        }

        let mut names = HashSet::new();
        let mut available: HashSet<&str> = self.seed_keys.iter().map(String::as_str).collect();

        for stage in &self.stages {
            let d = stage.descriptor();
            if !names.insert(d.name.as_str()) {
                return Err(invalid(format!("duplicate stage name '{}'", d.name)));
            }
            if let Some(missing) = d.requires.iter().find(|k| !available.contains(k.as_str())) {
                return Err(invalid(format!(
                    "stage '{}' requires '{missing}', which no seed or earlier stage provides",
                    d.name
                )));
            }
            if d.produces.is_empty() {
                return Err(invalid(format!("stage '{}' produces no key", d.name)));
            }
            if !available.insert(d.produces.as_str()) {
                return Err(invalid(format!(
                    "stage '{}' produces '{}', which is already a seed or an earlier output",
                    d.name, d.produces
                )));
            }
        }

        for name in self.stage_retry.keys().chain(self.stage_timeouts.keys()) {
            if !names.contains(name.as_str()) {
                return Err(invalid(format!("override for unknown stage '{name}'")));
            }
        }

        debug!(pipeline = %self.name, stages = self.stages.len(), "pipeline built");

        Ok(Pipeline {
            name: self.name,
            seed_keys: self.seed_keys,
            stages: self.stages,
            retry: self.retry,
            stage_retry: self.stage_retry,
            stage_timeout: self.stage_timeout,
            stage_timeouts: self.stage_timeouts,
            failure_mode: self.failure_mode,
        })
    }
}

/// Validated, runnable pipeline
pub struct Pipeline {
    name: String,
    seed_keys: Vec<String>,
    stages: Vec<Box<dyn Stage>>,
    retry: RetryPolicy,
    stage_retry: HashMap<String, RetryPolicy>,
    stage_timeout: Duration,
    stage_timeouts: HashMap<String, Duration>,
    failure_mode: FailureMode,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("seed_keys", &self.seed_keys)
            .field("stages", &self.stage_names())
            .field("failure_mode", &self.failure_mode)
            .finish()
    }
}

/// Finished run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub pipeline: String,
    pub state: PipelineState,
    /// Keys written by successful stages, in run order
    pub produced: Vec<String>,
    pub records: Vec<StageRecord>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl PipelineOutcome {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            pipeline: self.pipeline.clone(),
            status: self.status,
            started_at: self.started_at,
            duration_ms: self.duration.as_millis() as u64,
            stages: self.records.clone(),
        }
    }
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seed_keys(&self) -> &[String] {
        &self.seed_keys
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Run every stage once, in order, starting from `seed`
    ///
    /// # Errors
    /// - [`OrchestratorError::MissingSeed`] before anything runs
    /// - [`OrchestratorError::StageFailed`] in fail-fast mode
    #[instrument(name = "pipeline_run", skip(self, seed), fields(pipeline = %self.name))]
    pub async fn run(&self, run_id: &str, seed: PipelineState) -> Result<PipelineOutcome> {
        if let Some(key) = self.seed_keys.iter().find(|k| !seed.contains(k)) {
            return Err(OrchestratorError::MissingSeed {
                pipeline: self.name.clone(),
                key: key.clone(),
            });
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let mut state = seed;
        let mut records = Vec::with_capacity(self.stages.len());
        let mut produced = Vec::new();

        info!(run_id, stages = self.stages.len(), "pipeline started");

        for stage in &self.stages {
            let descriptor = stage.descriptor();

            if let Some(missing) = descriptor.requires.iter().find(|k| !state.contains(k)) {
                warn!(stage = %descriptor.name, missing = %missing, "stage skipped");
                let record =
                    StageRecord::skipped(&descriptor.name, format!("missing input '{missing}'"));
                observability::record_stage_completed(&record);
                records.push(record);
                continue;
            }

            let (record, result) = self.run_stage(run_id, stage.as_ref(), &state).await;
            observability::record_stage_completed(&record);

            match result {
                Ok(value) => {
                    state.insert(descriptor.produces.clone(), value);
                    produced.push(descriptor.produces.clone());
                    records.push(record);
                }
                Err(source) => {
                    let attempts = record.attempts;
                    records.push(record);
                    if self.failure_mode == FailureMode::FailFast {
                        observability::record_run_completed(
                            &self.name,
                            None,
                            start.elapsed().as_millis() as u64,
                        );
                        return Err(OrchestratorError::StageFailed {
                            stage: descriptor.name.clone(),
                            attempts,
                            source,
                            records,
                        });
                    }
                }
            }
        }

        let status = if records.iter().all(|r| r.status == StageStatus::Succeeded) {
            RunStatus::Completed
        } else {
            RunStatus::Partial
        };
        let duration = start.elapsed();
        observability::record_run_completed(&self.name, Some(status), duration.as_millis() as u64);
        info!(run_id, %status, duration_ms = duration.as_millis() as u64, "pipeline finished");

        Ok(PipelineOutcome {
            run_id: run_id.to_string(),
            pipeline: self.name.clone(),
            state,
            produced,
            records,
            status,
            started_at,
            duration,
        })
    }

    /// Attempt loop for one stage
    async fn run_stage(
        &self,
        run_id: &str,
        stage: &dyn Stage,
        state: &PipelineState,
    ) -> (StageRecord, std::result::Result<Value, ContractError>) {
        let name = stage.name();
        let policy = self.stage_retry.get(name).unwrap_or(&self.retry);
        let timeout = self
            .stage_timeouts
            .get(name)
            .copied()
            .unwrap_or(self.stage_timeout);
        let max_attempts = policy.max_attempts.max(1);
        let start = Instant::now();
        // calls made by attempts that failed; a model error implies one call
        let mut failed_calls = 0;

        let mut attempt = 1;
        loop {
            let ctx = StageContext {
                run_id,
                attempt,
                max_attempts,
                state,
            };

            let result = match tokio::time::timeout(timeout, stage.run(&ctx)).await {
                Ok(result) => result,
                Err(_) => Err(ContractError::Timeout {
                    stage: name.to_string(),
                    waited_ms: timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(output) => {
                    observability::record_stage_attempt(name, "success");
                    debug!(stage = name, attempt, model_calls = output.model_calls, "stage succeeded");
                    let record = StageRecord {
                        name: name.to_string(),
                        status: StageStatus::Succeeded,
                        attempts: attempt,
                        duration_ms: start.elapsed().as_millis() as u64,
                        model_calls: failed_calls + output.model_calls,
                        error: None,
                        notes: output.notes,
                    };
                    return (record, Ok(output.value));
                }
                Err(e) => {
                    let outcome = match &e {
                        ContractError::Timeout { .. } => "timeout",
                        e if e.is_retryable() => "retryable_error",
                        _ => "error",
                    };
                    observability::record_stage_attempt(name, outcome);
                    if e.is_model_error() {
                        failed_calls += 1;
                    }

                    if e.is_retryable() && attempt < max_attempts {
                        let delay = backoff_delay(policy, attempt, e.retry_after_ms());
                        warn!(
                            stage = name,
                            attempt,
                            max_attempts,
                            backoff_ms = delay.as_millis() as u64,
                            error = %e,
                            "stage attempt failed, retrying"
                        );
                        observability::record_stage_retry(name, delay.as_millis() as u64);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    error!(stage = name, attempt, error = %e, "stage failed");
                    let record = StageRecord {
                        name: name.to_string(),
                        status: StageStatus::Failed,
                        attempts: attempt,
                        duration_ms: start.elapsed().as_millis() as u64,
                        model_calls: failed_calls,
                        error: Some(e.to_string()),
                        notes: Vec::new(),
                    };
                    return (record, Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use contracts::{StageConfig, StageDescriptor, StageKind, StageOutput};
    use serde_json::json;

    /// Appends its name to the string input
    struct Append {
        descriptor: StageDescriptor,
    }

    impl Append {
        fn boxed(name: &str, input: &str, output: &str) -> Box<dyn Stage> {
            Box::new(Self {
                descriptor: StageDescriptor::new(name, [input], output),
            })
        }
    }

    #[async_trait::async_trait]
    impl Stage for Append {
        fn descriptor(&self) -> &StageDescriptor {
            &self.descriptor
        }

        async fn run(&self, ctx: &StageContext<'_>) -> std::result::Result<StageOutput, ContractError> {
            let input: String = ctx.state.get(&self.descriptor.name, &self.descriptor.requires[0])?;
            Ok(StageOutput::new(json!(format!("{input}+{}", self.descriptor.name))).with_model_calls(1))
        }
    }

    #[derive(Clone, Copy)]
    enum Failure {
        Transient,
        Permanent,
        Slow(Duration),
    }

    /// Fails a fixed number of times, then echoes its input
    struct Flaky {
        descriptor: StageDescriptor,
        fail_times: u32,
        failure: Failure,
        attempts: Arc<AtomicU32>,
        final_flags: Arc<Mutex<Vec<bool>>>,
    }

    impl Flaky {
        fn new(name: &str, fail_times: u32, failure: Failure) -> Self {
            Self {
                descriptor: StageDescriptor::new(name, ["topic"], name),
                fail_times,
                failure,
                attempts: Arc::new(AtomicU32::new(0)),
                final_flags: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait::async_trait]
    impl Stage for Flaky {
        fn descriptor(&self) -> &StageDescriptor {
            &self.descriptor
        }

        async fn run(&self, ctx: &StageContext<'_>) -> std::result::Result<StageOutput, ContractError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            self.final_flags.lock().unwrap().push(ctx.is_final_attempt());
            if n <= self.fail_times {
                return Err(match self.failure {
                    Failure::Transient => ContractError::model_request("mock", "502"),
                    Failure::Permanent => ContractError::model_auth("mock", "bad key"),
                    Failure::Slow(d) => {
                        tokio::time::sleep(d).await;
                        ContractError::Other("unreachable".into())
                    }
                });
            }
            Ok(StageOutput::new(json!(n)).with_model_calls(1))
        }
    }

    fn seed() -> PipelineState {
        let mut state = PipelineState::new();
        state.insert("topic", json!("rust"));
        state
    }

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(attempts, Duration::from_millis(1))
    }

    fn reason(err: OrchestratorError) -> String {
        match err {
            OrchestratorError::InvalidPipeline { reason, .. } => reason,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_rejects_broken_chain() {
        let err = PipelineBuilder::new("p")
            .seed_keys(["topic"])
            .stage(Append::boxed("draft", "outline", "draft"))
            .stage(Append::boxed("outline", "topic", "outline"))
            .build()
            .unwrap_err();
        assert!(reason(err).contains("requires 'outline'"));
    }

    #[test]
    fn test_build_rejects_duplicates_and_shadowed_seed() {
        let dup_name = PipelineBuilder::new("p")
            .seed_keys(["topic"])
            .stage(Append::boxed("a", "topic", "x"))
            .stage(Append::boxed("a", "topic", "y"))
            .build()
            .unwrap_err();
        assert!(reason(dup_name).contains("duplicate stage name"));

        let dup_key = PipelineBuilder::new("p")
            .seed_keys(["topic"])
            .stage(Append::boxed("a", "topic", "x"))
            .stage(Append::boxed("b", "topic", "x"))
            .build()
            .unwrap_err();
        assert!(reason(dup_key).contains("produces 'x'"));

        let shadow = PipelineBuilder::new("p")
            .seed_keys(["topic"])
            .stage(Append::boxed("a", "topic", "topic"))
            .build()
            .unwrap_err();
        assert!(reason(shadow).contains("already a seed"));

        let unknown = PipelineBuilder::new("p")
            .seed_keys(["topic"])
            .stage(Append::boxed("a", "topic", "x"))
            .stage_retry("nope", RetryPolicy::none())
            .build()
            .unwrap_err();
        assert!(reason(unknown).contains("unknown stage 'nope'"));
    }

    #[tokio::test]
    async fn test_outputs_flow_forward() {
        let pipeline = PipelineBuilder::new("p")
            .seed_keys(["topic"])
            .stage(Append::boxed("outline", "topic", "outline"))
            .stage(Append::boxed("draft", "outline", "draft"))
            .build()
            .unwrap();

        let outcome = pipeline.run("run-1", seed()).await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.state.get_raw("draft"), Some(&json!("rust+outline+draft")));
        assert_eq!(outcome.summary().total_model_calls(), 2);
        assert_eq!(outcome.records.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_seed() {
        let pipeline = PipelineBuilder::new("p")
            .seed_keys(["topic"])
            .stage(Append::boxed("outline", "topic", "outline"))
            .build()
            .unwrap();
        let err = pipeline.run("r", PipelineState::new()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingSeed { ref key, .. } if key == "topic"));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let flaky = Flaky::new("flaky", 2, Failure::Transient);
        let flags = flaky.final_flags.clone();
        let pipeline = PipelineBuilder::new("p")
            .seed_keys(["topic"])
            .stage(Box::new(flaky))
            .retry(fast_retry(3))
            .build()
            .unwrap();

        let outcome = pipeline.run("r", seed()).await.unwrap();
        assert_eq!(outcome.records[0].attempts, 3);
        // both failed attempts reached the model
        assert_eq!(outcome.records[0].model_calls, 3);
        assert_eq!(outcome.summary().total_model_calls(), 3);
        assert_eq!(outcome.state.get_raw("flaky"), Some(&json!(3)));
        assert_eq!(*flags.lock().unwrap(), vec![false, false, true]);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let flaky = Flaky::new("flaky", 1, Failure::Permanent);
        let attempts = flaky.attempts.clone();
        let pipeline = PipelineBuilder::new("p")
            .seed_keys(["topic"])
            .stage(Box::new(flaky))
            .retry(fast_retry(5))
            .build()
            .unwrap();

        let err = pipeline.run("r", seed()).await.unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        match err {
            OrchestratorError::StageFailed {
                stage,
                attempts,
                records,
                ..
            } => {
                assert_eq!(stage, "flaky");
                assert_eq!(attempts, 1);
                assert_eq!(records[0].status, StageStatus::Failed);
                assert_eq!(records[0].model_calls, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_retryable_then_fails() {
        let pipeline = PipelineBuilder::new("p")
            .seed_keys(["topic"])
            .stage(Box::new(Flaky::new(
                "slow",
                10,
                Failure::Slow(Duration::from_millis(500)),
            )))
            .retry(fast_retry(2))
            .stage_timeout(Duration::from_millis(20))
            .build()
            .unwrap();

        let err = pipeline.run("r", seed()).await.unwrap_err();
        match err {
            OrchestratorError::StageFailed { source, attempts, .. } => {
                assert!(matches!(source, ContractError::Timeout { .. }));
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stage_retry_override() {
        let pipeline = PipelineBuilder::new("p")
            .seed_keys(["topic"])
            .stage(Box::new(Flaky::new("flaky", 2, Failure::Transient)))
            .retry(fast_retry(3))
            .stage_retry("flaky", RetryPolicy::none())
            .build()
            .unwrap();
        let err = pipeline.run("r", seed()).await.unwrap_err();
        assert_eq!(err.records()[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_continue_on_error_skips_dependants() {
        let pipeline = PipelineBuilder::new("p")
            .seed_keys(["topic"])
            .stage(Box::new(Flaky::new("broken", 1, Failure::Permanent)))
            .stage(Append::boxed("after_broken", "broken", "after_broken"))
            .stage(Append::boxed("independent", "topic", "independent"))
            .failure_mode(FailureMode::ContinueOnError)
            .build()
            .unwrap();

        let outcome = pipeline.run("r", seed()).await.unwrap();
        let statuses: Vec<_> = outcome.records.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![StageStatus::Failed, StageStatus::Skipped, StageStatus::Succeeded]
        );
        assert_eq!(outcome.status, RunStatus::Partial);
        assert!(outcome.records[1].notes[0].contains("missing input 'broken'"));
        assert!(outcome.state.contains("independent"));
    }

    #[test]
    fn test_from_blueprint_applies_overrides() {
        let mut bp = PipelineBlueprint::referral_default();
        bp.stages = vec![StageConfig::new("outline", StageKind::Prompt)];
        bp.stages[0].retry = Some(RetryPolicy::none());
        bp.stages[0].timeout_secs = Some(5);
        bp.pipeline.seeds = vec!["topic".into()];

        let pipeline =
            PipelineBuilder::from_blueprint(&bp, vec![Append::boxed("outline", "topic", "outline")])
                .build()
                .unwrap();
        assert_eq!(pipeline.name(), "alumni_referral");
        assert_eq!(pipeline.seed_keys(), ["topic".to_string()]);
        assert_eq!(pipeline.stage_names(), vec!["outline"]);
    }
}
