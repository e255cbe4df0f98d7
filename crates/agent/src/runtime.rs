use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use supportdesk_core::audit::{
    AuditCategory, AuditContext, AuditOutcome, AuditSink, NoopAuditSink,
};
use supportdesk_core::config::AppConfig;
use supportdesk_core::domain::customer::UserContext;
use supportdesk_core::domain::session::{SessionId, Turn};
use supportdesk_core::domain::specialist::{ActiveAgent, SpecialistId};
use supportdesk_core::errors::{ApplicationError, DomainError};
use supportdesk_db::{RepositoryError, SessionRepository};

use crate::guardrails::{
    gates_from_config, InputClassifier, InputGate, OutputClassifier, OutputGate,
};
use crate::llm::LlmClient;
use crate::responder::{
    responder_from_config, ResponderError, SpecialistRequest, SpecialistResponder,
};
use crate::router::{category_label, RouteDecision, Router, TransitionError};
use crate::specialists::{PromptRenderer, RenderError};
use crate::tools::{ToolCatalog, ToolId};

/// How a turn ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Answered(SpecialistId),
    Clarification,
    InputRefused,
    OutputRefused(SpecialistId),
    Failed,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answered(_) => "answered",
            Self::Clarification => "clarification",
            Self::InputRefused => "input_refused",
            Self::OutputRefused(_) => "output_refused",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseChunk {
    pub text: String,
}

/// Finite sequence of answer chunks for one turn.
#[derive(Debug)]
pub struct ResponseStream {
    chunks: mpsc::Receiver<ResponseChunk>,
    outcome: TurnOutcome,
    correlation_id: String,
}

impl ResponseStream {
    fn from_text(text: &str, outcome: TurnOutcome, correlation_id: String) -> Self {
        let pieces = text.split_inclusive('\n').collect::<Vec<_>>();
        let (sender, chunks) = mpsc::channel(pieces.len().max(1));
        for piece in pieces {
            if sender.try_send(ResponseChunk { text: piece.to_string() }).is_err() {
                break;
            }
        }
        Self { chunks, outcome, correlation_id }
    }

    pub async fn next(&mut self) -> Option<ResponseChunk> {
        self.chunks.recv().await
    }

    pub fn outcome(&self) -> TurnOutcome {
        self.outcome
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub async fn collect_text(mut self) -> String {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk.text);
        }
        text
    }
}

#[derive(Debug, Error)]
enum TurnError {
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
    #[error(transparent)]
    Routing(#[from] TransitionError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Responder(#[from] ResponderError),
    #[error("empty request")]
    EmptyRequest,
}

impl From<TurnError> for ApplicationError {
    fn from(value: TurnError) -> Self {
        match value {
            TurnError::Persistence(error) => Self::Persistence(error.to_string()),
            TurnError::Routing(error) => {
                Self::Domain(DomainError::InvariantViolation(error.to_string()))
            }
            TurnError::Render(error) => Self::Configuration(error.to_string()),
            TurnError::Responder(error) => Self::Integration(error.to_string()),
            TurnError::EmptyRequest => {
                Self::Domain(DomainError::InvariantViolation("request text is empty".to_string()))
            }
        }
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

struct Reply {
    text: String,
    outcome: TurnOutcome,
}

#[derive(Default)]
struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    fn lock_for(&self, session_id: &SessionId) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(session_id.0.clone()).or_default())
    }
}

/// Turn pipeline for every session: input gate, router, specialist, output
/// gate, commit. Turns of one session run one at a time; different sessions
/// run concurrently.
pub struct SupportRuntime {
    sessions: Arc<dyn SessionRepository>,
    router: Router,
    renderer: PromptRenderer,
    tools: ToolCatalog,
    responder: Arc<dyn SpecialistResponder>,
    input_gate: InputGate,
    output_gate: OutputGate,
    audit: Arc<dyn AuditSink>,
    locks: SessionLocks,
}

impl SupportRuntime {
    pub fn from_config(
        config: &AppConfig,
        sessions: Arc<dyn SessionRepository>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Result<Self, ApplicationError> {
        let renderer = PromptRenderer::new(config.policy.clone(), config.router.max_clarifications)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        let (input_gate, output_gate) = gates_from_config(&config.gates, llm.clone());

        Ok(Self {
            sessions,
            router: Router::new(config.router.max_clarifications),
            renderer,
            tools: ToolCatalog::standard(config.policy.clone()),
            responder: responder_from_config(&config.responder, llm),
            input_gate,
            output_gate,
            audit: Arc::new(NoopAuditSink),
            locks: SessionLocks::default(),
        })
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_responder(mut self, responder: Arc<dyn SpecialistResponder>) -> Self {
        self.responder = responder;
        self
    }

    pub fn with_tools(mut self, tools: ToolCatalog) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_input_classifier(mut self, classifier: Arc<dyn InputClassifier>) -> Self {
        self.input_gate = self.input_gate.with_classifier(classifier);
        self
    }

    pub fn with_output_classifier(mut self, classifier: Arc<dyn OutputClassifier>) -> Self {
        self.output_gate = self.output_gate.with_classifier(classifier);
        self
    }

    /// Runs one customer turn. Never fails: errors end the turn with a
    /// user-safe message and leave the session untouched.
    pub async fn submit_turn(
        &self,
        session_id: &SessionId,
        ctx: &UserContext,
        text: &str,
    ) -> ResponseStream {
        let correlation_id = format!("turn-{}", Uuid::new_v4());
        let lock = self.locks.lock_for(session_id);
        let _guard = lock.lock().await;

        let audit = AuditContext::new(
            session_id.clone(),
            Some(ctx.customer_id().clone()),
            correlation_id.clone(),
            "support_runtime",
        );

        match self.run_turn(session_id, ctx, text, &audit).await {
            Ok(reply) => {
                info!(
                    event_name = "ingress.turn.completed",
                    session_id = %session_id,
                    correlation_id = %correlation_id,
                    outcome = reply.outcome.as_str(),
                    "turn completed"
                );
                ResponseStream::from_text(&reply.text, reply.outcome, correlation_id)
            }
            Err(turn_error) => {
                let detail = turn_error.to_string();
                let interface =
                    ApplicationError::from(turn_error).into_interface(correlation_id.clone());
                error!(
                    event_name = "ingress.turn.failed",
                    session_id = %session_id,
                    correlation_id = %correlation_id,
                    error = %detail,
                    "turn failed, session left unchanged"
                );
                self.audit.emit(
                    audit
                        .event("turn.failed", AuditCategory::Ingress, AuditOutcome::Failed)
                        .with_metadata("error", detail),
                );
                ResponseStream::from_text(
                    interface.user_message(),
                    TurnOutcome::Failed,
                    correlation_id,
                )
            }
        }
    }

    async fn run_turn(
        &self,
        session_id: &SessionId,
        ctx: &UserContext,
        text: &str,
        audit: &AuditContext,
    ) -> Result<Reply, TurnError> {
        let request = text.trim();
        if request.is_empty() {
            return Err(TurnError::EmptyRequest);
        }

        let history = self.sessions.list_turns(session_id).await?;
        let active = self.sessions.active_agent(session_id).await?;
        info!(
            event_name = "ingress.turn.received",
            session_id = %session_id,
            correlation_id = %audit.correlation_id,
            active_agent = %active,
            history_len = history.len(),
            "turn received"
        );

        if self.input_gate.applies_to(active) {
            let verdict = self.input_gate.check(request, ctx).await;
            if verdict.is_tripped() {
                let reason = verdict.tripwire_reason.unwrap_or_default();
                warn!(
                    event_name = "guardrail.input.tripped",
                    session_id = %session_id,
                    correlation_id = %audit.correlation_id,
                    reason = %reason,
                    "input gate refused request"
                );
                self.audit.emit(
                    audit
                        .event("guardrail.input", AuditCategory::Guardrail, AuditOutcome::Rejected)
                        .with_metadata("entry", active.as_str())
                        .with_metadata("reason", reason),
                );
                return Ok(Reply {
                    text: self.input_gate.refusal().to_string(),
                    outcome: TurnOutcome::InputRefused,
                });
            }
            if verdict.low_confidence {
                debug!(
                    event_name = "guardrail.input.low_confidence",
                    session_id = %session_id,
                    correlation_id = %audit.correlation_id,
                    "input gate could not decide, passing request through"
                );
            }
        }

        let decision =
            self.router.route(request, ctx, &history, active, &audit.correlation_id)?;
        debug!(
            event_name = "routing.decision",
            session_id = %session_id,
            correlation_id = %audit.correlation_id,
            decision = %decision,
            "router decided"
        );

        let (specialist, handoff) = match decision {
            RouteDecision::Clarify { question, round } => {
                self.sessions
                    .commit_turn(
                        session_id,
                        vec![Turn::user(request), Turn::clarification(question.clone())],
                        ActiveAgent::Triage,
                    )
                    .await?;
                self.audit.emit(
                    audit
                        .event("routing.clarify", AuditCategory::Routing, AuditOutcome::Success)
                        .with_metadata("round", round.to_string()),
                );
                return Ok(Reply { text: question, outcome: TurnOutcome::Clarification });
            }
            RouteDecision::Stay(specialist) => (specialist, None),
            RouteDecision::Handoff(record) => {
                info!(
                    event_name = "routing.handoff",
                    session_id = %session_id,
                    correlation_id = %audit.correlation_id,
                    to = %record.to_specialist(),
                    issue_type = record.issue_type(),
                    reason = record.reason(),
                    priority_note = record.priority_note().unwrap_or("none"),
                    "handing off to specialist"
                );
                let mut event = audit
                    .event("routing.handoff", AuditCategory::Routing, AuditOutcome::Success)
                    .with_metadata("from", active.as_str())
                    .with_metadata("to", record.to_specialist().as_str())
                    .with_metadata("reason", record.reason())
                    .with_metadata("issue_type", record.issue_type());
                if let Some(note) = record.priority_note() {
                    event = event.with_metadata("priority_note", note);
                }
                self.audit.emit(event);
                (record.to_specialist(), Some(record))
            }
        };

        let prompt = self.renderer.render_specialist(specialist, ctx)?;
        let draft = self
            .responder
            .respond(
                SpecialistRequest {
                    specialist,
                    prompt: &prompt,
                    ctx,
                    history: &history,
                    request,
                    handoff: handoff.as_ref(),
                },
                &self.tools,
            )
            .await?;

        for call in &draft.tool_calls {
            let mutating = ToolId::parse(&call.tool).is_some_and(|tool| tool.is_mutating());
            info!(
                event_name = "tool.invoked",
                session_id = %session_id,
                correlation_id = %audit.correlation_id,
                specialist = %specialist,
                tool = %call.tool,
                succeeded = call.succeeded,
                "specialist invoked tool"
            );
            self.audit.emit(
                audit
                    .event(
                        "tool.invoked",
                        AuditCategory::Tool,
                        if call.succeeded { AuditOutcome::Success } else { AuditOutcome::Failed },
                    )
                    .with_metadata("specialist", specialist.as_str())
                    .with_metadata("tool", call.tool.clone())
                    .with_metadata("mutating", mutating.to_string())
                    .with_metadata("output", call.output.clone()),
            );
        }

        if self.output_gate.applies_to(specialist) {
            let verdict = self.output_gate.check(&draft.text, specialist, ctx).await;
            if verdict.is_tripped() {
                let flagged = verdict.flagged_categories().join(",");
                warn!(
                    event_name = "guardrail.output.tripped",
                    session_id = %session_id,
                    correlation_id = %audit.correlation_id,
                    specialist = %specialist,
                    flagged = %flagged,
                    "output gate replaced specialist draft"
                );
                self.audit.emit(
                    audit
                        .event("guardrail.output", AuditCategory::Guardrail, AuditOutcome::Rejected)
                        .with_metadata("specialist", specialist.as_str())
                        .with_metadata("flagged", flagged)
                        .with_metadata("draft", draft.text.clone()),
                );
                return Ok(Reply {
                    text: self.output_gate.refusal().to_string(),
                    outcome: TurnOutcome::OutputRefused(specialist),
                });
            }
        }

        let answer = match &handoff {
            Some(_) => format!(
                "{} 담당 전문가에게 연결해드릴게요.\n\n{}",
                category_label(specialist),
                draft.text
            ),
            None => draft.text,
        };

        self.sessions
            .commit_turn(
                session_id,
                vec![Turn::user(request), Turn::assistant(specialist, answer.clone())],
                ActiveAgent::Specialist(specialist),
            )
            .await?;

        Ok(Reply { text: answer, outcome: TurnOutcome::Answered(specialist) })
    }

    /// Empties the transcript and returns the session to triage.
    pub async fn reset_session(&self, session_id: &SessionId) -> Result<(), ApplicationError> {
        let lock = self.locks.lock_for(session_id);
        let _guard = lock.lock().await;
        let correlation_id = format!("reset-{}", Uuid::new_v4());

        self.sessions.clear(session_id).await.map_err(persistence)?;
        info!(
            event_name = "session.reset",
            session_id = %session_id,
            correlation_id = %correlation_id,
            "session reset"
        );
        self.audit.emit(
            AuditContext::new(session_id.clone(), None, correlation_id, "support_runtime").event(
                "session.reset",
                AuditCategory::Session,
                AuditOutcome::Success,
            ),
        );
        Ok(())
    }

    pub async fn history(&self, session_id: &SessionId) -> Result<Vec<Turn>, ApplicationError> {
        self.sessions.list_turns(session_id).await.map_err(persistence)
    }

    pub async fn active_agent(
        &self,
        session_id: &SessionId,
    ) -> Result<ActiveAgent, ApplicationError> {
        self.sessions.active_agent(session_id).await.map_err(persistence)
    }

    /// Instructions the given agent would receive for this customer.
    pub fn render_prompt(
        &self,
        agent: ActiveAgent,
        ctx: &UserContext,
    ) -> Result<String, ApplicationError> {
        let rendered = match agent {
            ActiveAgent::Triage => self.renderer.render_triage(ctx),
            ActiveAgent::Specialist(id) => self.renderer.render_specialist(id, ctx),
        };
        rendered.map_err(|error| ApplicationError::Configuration(error.to_string()))
    }
}
