use crate::agents::{AgentRuntime, ChatAgentRuntime};
use crate::context::SupervisorContext;
use crate::events::{Event, EventPayload, EventSink, FinalResult};
use crate::phases::{analysis, execution, judge, progress, quality, routing};
use crate::phases::{AnalysisCache, Services};
use fleet_core::{
    default_roster, default_tool_catalog, AgentRoster, FleetConfig, FleetError, FleetResult,
    Phase, PhaseStatus, Task, ToolCatalog,
};
use fleet_reasoner::{
    CacheStats, ChatBackend, ChatReasoningCall, OpenAiBackend, ReasoningCall, Reasoner, TtlCache,
};
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info};
use uuid::Uuid;

/// Events buffered between the run and a slow consumer.
const EVENT_BUFFER: usize = 64;

/// The five-phase supervisor pipeline.
///
/// Cheap to clone; clones share the roster, reasoner, agent runtime and the
/// analysis cache.
#[derive(Clone)]
pub struct SupervisorPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    config: Arc<FleetConfig>,
    services: Services,
}

impl SupervisorPipeline {
    /// Start building a pipeline.
    pub fn builder() -> SupervisorPipelineBuilder {
        SupervisorPipelineBuilder::default()
    }

    /// Pipeline whose reasoning and agents both talk to the configured
    /// OpenAI-compatible model.
    pub fn from_config(config: FleetConfig) -> FleetResult<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| FleetError::Config("no [model] section configured".into()))?;
        Self::builder()
            .config(config)
            .chat_backend(Arc::new(OpenAiBackend::new(model)))
            .build()
    }

    /// Run configuration.
    pub fn config(&self) -> &FleetConfig {
        &self.inner.config
    }

    /// Statistics of the shared analysis cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.services.cache.stats()
    }

    /// Start a run and return its event stream.
    ///
    /// The configuration is validated first; an invalid configuration fails
    /// here, before any stage runs. The stream is finite and ends with a
    /// `final_result` event. Dropping it cancels the run. Must be called
    /// from within a Tokio runtime.
    pub fn run(&self, task: Task) -> FleetResult<EventStream> {
        self.inner.config.validate()?;

        let run_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let sink = EventSink::new(run_id, tx, cancel.clone());
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();

        info!(run_id = %run_id, task_id = %task.id(), words = task.word_count(), "Run started");

        tokio::spawn(async move {
            let mut ctx =
                SupervisorContext::new(task, Arc::clone(&inner.config), sink, token.clone());
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(run_id = %run_id, "Run abandoned by consumer");
                }
                _ = drive(&inner.services, &mut ctx) => {}
            }
        });

        Ok(EventStream {
            run_id,
            inner: ReceiverStream::new(rx),
            _guard: cancel.drop_guard(),
        })
    }

    /// Run to the end, collecting every event.
    pub async fn run_to_completion(&self, task: Task) -> FleetResult<RunReport> {
        let mut stream = self.run(task)?;
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            if let EventPayload::FinalResult { result } = &event.payload {
                let result = result.as_ref().clone();
                events.push(event);
                return Ok(RunReport { result, events });
            }
            events.push(event);
        }
        Err(FleetError::Cancelled)
    }
}

/// A finished run: its final result and every event it produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The final result.
    pub result: FinalResult,
    /// All events in emission order, the final one included.
    pub events: Vec<Event>,
}

impl RunReport {
    /// Events of the given kind.
    pub fn events_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| e.kind() == kind)
    }
}

/// Event stream of one run. Dropping it cancels the run.
pub struct EventStream {
    run_id: Uuid,
    inner: ReceiverStream<Event>,
    _guard: DropGuard,
}

impl EventStream {
    /// Identifier of the run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Drive the stage machine of one run to its final event.
async fn drive(services: &Services, ctx: &mut SupervisorContext) {
    ctx.begin_stage(Phase::Analysis).await;
    let status = analysis::execute(services, ctx).await;
    ctx.finish_stage(Phase::Analysis, status).await;

    ctx.begin_stage(Phase::Routing).await;
    let status = routing::execute(services, ctx).await;
    ctx.finish_stage(Phase::Routing, status).await;

    loop {
        ctx.begin_stage(Phase::Execution).await;
        match execution::execute(services, ctx).await {
            Ok(status) => ctx.finish_stage(Phase::Execution, status).await,
            Err(FleetError::Cancelled) => return,
            Err(e) => {
                let message = e.to_string();
                error!(run_id = %ctx.run_id(), error = %message, "Execution failed");
                ctx.failure = Some(message.clone());
                ctx.finish_stage(
                    Phase::Execution,
                    PhaseStatus::Error {
                        message: message.clone(),
                    },
                )
                .await;
                ctx.emit(
                    Some(Phase::Execution),
                    EventPayload::Error {
                        message,
                        fatal: true,
                    },
                )
                .await;
                break;
            }
        }

        ctx.begin_stage(Phase::Progress).await;
        let status = progress::execute(services, ctx).await;
        ctx.finish_stage(Phase::Progress, status).await;

        ctx.begin_stage(Phase::Quality).await;
        let status = quality::execute(services, ctx).await;
        ctx.finish_stage(Phase::Quality, status).await;

        if let Some(feedback) = quality::refinement_feedback(ctx) {
            let score = ctx.quality.as_ref().map(|q| q.score);
            ctx.begin_refinement(Phase::Quality, score, feedback).await;
            continue;
        }

        if ctx.config.judge_enabled() && !ctx.escalated {
            ctx.begin_stage(Phase::Judge).await;
            let status = judge::execute(services, ctx).await;
            ctx.finish_stage(Phase::Judge, status).await;

            if let Some(feedback) = judge::refinement_feedback(ctx) {
                let score = ctx.judge.as_ref().and_then(|v| v.score);
                ctx.begin_refinement(Phase::Judge, score, feedback).await;
                continue;
            }
        }
        break;
    }

    let result = ctx.final_result();
    info!(
        run_id = %ctx.run_id(),
        flag = %result.flag,
        failed = result.failed,
        refinement_rounds = result.refinement_rounds,
        duration_ms = result.total_duration_ms,
        "Run finished"
    );
    ctx.emit(
        None,
        EventPayload::FinalResult {
            result: Box::new(result),
        },
    )
    .await;
}

/// Builder for [`SupervisorPipeline`].
#[derive(Default)]
pub struct SupervisorPipelineBuilder {
    config: Option<FleetConfig>,
    roster: Option<AgentRoster>,
    tools: Option<ToolCatalog>,
    reasoning_call: Option<Arc<dyn ReasoningCall>>,
    reasoner: Option<Reasoner>,
    runtime: Option<Arc<dyn AgentRuntime>>,
    cache: Option<Arc<AnalysisCache>>,
}

impl SupervisorPipelineBuilder {
    /// Run configuration (defaults to [`FleetConfig::default`]).
    pub fn config(mut self, config: FleetConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Agents the router may assign (defaults to [`default_roster`]).
    pub fn roster(mut self, roster: AgentRoster) -> Self {
        self.roster = Some(roster);
        self
    }

    /// Tools the router may require (defaults to [`default_tool_catalog`]).
    pub fn tools(mut self, tools: ToolCatalog) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Reasoning model. Without one every stage uses heuristics.
    pub fn reasoning_call(mut self, call: Arc<dyn ReasoningCall>) -> Self {
        self.reasoning_call = Some(call);
        self
    }

    /// A reasoner with its own retry policy and timeout; overrides
    /// [`Self::reasoning_call`]. Profile, threshold and word cutoffs still
    /// come from the configuration.
    pub fn reasoner(mut self, reasoner: Reasoner) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    /// Runtime that executes agents. Required.
    pub fn agent_runtime(mut self, runtime: Arc<dyn AgentRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Use one chat backend for both reasoning and agents.
    pub fn chat_backend(self, backend: Arc<dyn ChatBackend>) -> Self {
        self.reasoning_call(Arc::new(ChatReasoningCall::new(Arc::clone(&backend))))
            .agent_runtime(Arc::new(ChatAgentRuntime::new(backend)))
    }

    /// Share an analysis cache with other pipelines.
    pub fn cache(mut self, cache: Arc<AnalysisCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Assemble the pipeline.
    ///
    /// The configuration itself is validated on every [`SupervisorPipeline::run`].
    pub fn build(self) -> FleetResult<SupervisorPipeline> {
        let config = self.config.unwrap_or_default();
        let runtime = self
            .runtime
            .ok_or_else(|| FleetError::Config("an agent runtime is required".into()))?;
        let reasoner = match self.reasoner {
            Some(reasoner) => reasoner.apply_config(&config),
            None => Reasoner::from_config(self.reasoning_call, &config),
        };
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(TtlCache::new(
                config.cache_ttl(),
                config.cache_max_entries.max(1),
            ))
        });

        Ok(SupervisorPipeline {
            inner: Arc::new(PipelineInner {
                config: Arc::new(config),
                services: Services {
                    reasoner,
                    runtime,
                    roster: self.roster.unwrap_or_else(default_roster),
                    tools: self.tools.unwrap_or_else(default_tool_catalog),
                    cache,
                },
            }),
        })
    }
}
