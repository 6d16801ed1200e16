//! The conversation loop.
//!
//! One task drives the whole session. Per turn it selects a speaker, asks
//! that agent for a reply, records usage, appends the turn, reports it to
//! the sink and consults the budget. The agent call and the inter-turn delay
//! are the only suspension points; nothing else is shared or concurrent.

use std::time::Duration;

use rand::rngs::StdRng;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn, Instrument};

use super::context::{ContextBuilder, DEFAULT_HISTORY_WINDOW};
use super::selector::TurnSelector;
use super::{SessionReport, SessionStatus};
use crate::agent::{Agent, AgentId};
use crate::budget::{classify, BudgetConfig, BudgetStatus};
use crate::config::Config;
use crate::error::{Result, RoundtableError};
use crate::log_component;
use crate::transcript::{Transcript, TranscriptSink};
use crate::usage::{usage_percentage, UsageAccumulator, UsageState};

/// Default theme when none is given.
pub const DEFAULT_THEME: &str = "Discuss general topics freely";

/// Default pause between turns.
pub const DEFAULT_TURN_DELAY: Duration = Duration::from_secs(2);

/// Settings fixed for the lifetime of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub theme: String,
    pub budget: BudgetConfig,
    /// Pause after each turn. Interrupted by a stop request.
    pub turn_delay: Duration,
    pub history_window: usize,
    /// Stop (as a manual stop) after this many turns.
    pub max_turns: Option<u64>,
    /// Seed for speaker selection; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.to_string(),
            budget: BudgetConfig::default(),
            turn_delay: DEFAULT_TURN_DELAY,
            history_window: DEFAULT_HISTORY_WINDOW,
            max_turns: None,
            seed: None,
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            theme: config.conversation.theme.clone(),
            budget: config.budget,
            turn_delay: Duration::from_secs_f64(config.conversation.turn_delay_secs.max(0.0)),
            history_window: config.conversation.history_window,
            max_turns: config.conversation.max_turns,
            seed: config.conversation.seed,
        }
    }
}

/// Drives one conversation from its first turn to a terminal status.
pub struct ConversationLoop {
    agents: Vec<Agent>,
    config: SessionConfig,
    sink: Box<dyn TranscriptSink>,
    selector: TurnSelector<StdRng>,
    context: ContextBuilder,
    accumulator: UsageAccumulator,
    transcript: Transcript,
    status: SessionStatus,
    warned_at: Option<u64>,
}

impl ConversationLoop {
    /// Set up a session for `roster`.
    ///
    /// Agents with a repeated id are dropped, keeping the first.
    ///
    /// # Errors
    /// - `InsufficientAgents` if fewer than two distinct agents remain
    /// - `Config` if the budget is invalid
    pub fn new(
        roster: Vec<Agent>,
        config: SessionConfig,
        sink: Box<dyn TranscriptSink>,
    ) -> Result<Self> {
        config.budget.validate()?;

        let mut agents: Vec<Agent> = Vec::with_capacity(roster.len());
        for agent in roster {
            if agents.iter().any(|a| a.id() == agent.id()) {
                warn!(agent = %agent.id(), "Duplicate agent id ignored");
                continue;
            }
            agents.push(agent);
        }
        if agents.len() < 2 {
            return Err(RoundtableError::InsufficientAgents {
                available: agents.len(),
            });
        }

        let ids: Vec<AgentId> = agents.iter().map(|a| a.id().clone()).collect();
        let selector = match config.seed {
            Some(seed) => TurnSelector::seeded(ids, seed)?,
            None => TurnSelector::from_entropy(ids)?,
        };
        let accumulator = UsageAccumulator::new(agents.iter().map(|a| (a.id().clone(), a.pricing())));
        let context = ContextBuilder::new().with_history_window(config.history_window);

        Ok(Self {
            agents,
            config,
            sink,
            selector,
            context,
            accumulator,
            transcript: Transcript::new(),
            status: SessionStatus::Running,
            warned_at: None,
        })
    }

    /// Use a custom prompt builder (system prompt, history window).
    pub fn with_context_builder(mut self, context: ContextBuilder) -> Self {
        self.context = context;
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn usage(&self) -> &UsageState {
        self.accumulator.state()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run until the budget is spent, a stop is requested, an agent fails or
    /// `max_turns` is reached.
    ///
    /// `cancel` is checked between turns: an agent call already in flight is
    /// allowed to finish and its turn is recorded. The sink's `finalize` is
    /// called exactly once before this returns.
    pub async fn run(mut self, cancel: watch::Receiver<bool>) -> SessionReport {
        let span = info_span!(
            "session",
            theme = %self.config.theme,
            ceiling = self.config.budget.token_ceiling,
            agents = self.agents.len(),
        );
        async move {
            info!("Conversation started");
            let mut cancel = cancel;
            let (status, error) = self.drive(&mut cancel).await;
            self.finish(status, error).await
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self, cancel: &mut watch::Receiver<bool>) -> (SessionStatus, Option<String>) {
        loop {
            if *cancel.borrow() {
                info!(turns = self.transcript.len(), "Stop requested");
                return (SessionStatus::StoppedManual, None);
            }
            if let Some(max) = self.config.max_turns {
                if self.transcript.len() as u64 >= max {
                    info!(max_turns = max, "Turn limit reached");
                    return (SessionStatus::StoppedManual, None);
                }
            }

            let speaker = match self.selector.next_speaker() {
                Ok(speaker) => speaker,
                Err(e) => return self.fail(e).await,
            };

            let Some(index) = self.agents.iter().position(|a| a.id() == &speaker) else {
                let err = RoundtableError::NotFound(format!("agent {}", speaker));
                return self.fail(err).await;
            };
            let reply = {
                let context = self.context.build(&self.config.theme, self.transcript.turns());
                self.agents[index].invoke(&context).await
            };
            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => return self.fail(e).await,
            };

            let recorded =
                match self
                    .accumulator
                    .record(&speaker, reply.input_tokens, reply.output_tokens)
                {
                    Ok(recorded) => recorded,
                    Err(e) => return self.fail(e).await,
                };
            let turn = self
                .transcript
                .push(
                    speaker,
                    reply.text,
                    reply.input_tokens,
                    reply.output_tokens,
                    recorded.cost,
                )
                .clone();

            log_component!(
                info,
                "session",
                "Turn recorded",
                sequence = turn.sequence,
                speaker = turn.speaker.as_str(),
                tokens = turn.total_tokens(),
                total_tokens = recorded.snapshot.total_tokens(),
            );
            report("append", self.sink.append(&turn, &recorded.snapshot).await);

            match classify(&recorded.snapshot, &self.config.budget) {
                BudgetStatus::Exceeded => {
                    warn!(
                        total_tokens = recorded.snapshot.total_tokens(),
                        ceiling = self.config.budget.token_ceiling,
                        "Token budget reached"
                    );
                    return (SessionStatus::StoppedBudget, None);
                }
                BudgetStatus::Warning if self.status == SessionStatus::Running => {
                    self.status = SessionStatus::Warned;
                    self.warned_at = Some(turn.sequence);
                    warn!(
                        percent = usage_percentage(
                            &recorded.snapshot,
                            self.config.budget.token_ceiling
                        ),
                        "Token budget warning threshold crossed"
                    );
                    report("warning", self.sink.warning(&recorded.snapshot).await);
                }
                _ => {}
            }

            if !self.config.turn_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.turn_delay) => {}
                    _ = stop_requested(cancel) => {}
                }
            }
        }
    }

    async fn fail(&mut self, err: RoundtableError) -> (SessionStatus, Option<String>) {
        let reason = err.to_string();
        match err.provider_error() {
            Some(provider) if provider.is_transient() => {
                error!(error = %reason, "Agent call failed (transient)");
            }
            _ => error!(error = %reason, "Agent call failed"),
        }
        report("error", self.sink.error(&reason).await);
        (SessionStatus::StoppedError, Some(reason))
    }

    async fn finish(mut self, status: SessionStatus, error: Option<String>) -> SessionReport {
        self.status = status;
        let usage = self.accumulator.snapshot();
        report("finalize", self.sink.finalize(status, &usage).await);
        info!(
            status = ?status,
            turns = self.transcript.len(),
            total_tokens = usage.total_tokens(),
            total_cost = %usage.total_cost,
            "Conversation ended"
        );
        SessionReport {
            status,
            turns: self.transcript.into_turns(),
            usage,
            warned_at: self.warned_at,
            error,
        }
    }
}

fn report(event: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!(event, error = %e, "Transcript sink failed");
    }
}

/// Resolves once a stop is requested. Never resolves if the sender is gone.
async fn stop_requested(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::pricing::Pricing;
    use crate::providers::{ChatOptions, LLMProvider, LLMResponse, Message, Usage};
    use crate::transcript::{MemorySink, SinkEvent, Turn};
    use async_trait::async_trait;
    use std::fmt;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// Shared call counter across every agent, so a script can key on the
    /// global turn number.
    #[derive(Clone, Default)]
    struct Calls(Arc<AtomicU64>);

    impl Calls {
        fn bump(&self) -> u64 {
            self.0.fetch_add(1, Ordering::SeqCst) + 1
        }
        fn get(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct ScriptedProvider {
        calls: Calls,
        tokens: (u32, u32),
        fail_on: Option<u64>,
        cancel_on: Option<(u64, Arc<watch::Sender<bool>>)>,
    }

    impl fmt::Debug for ScriptedProvider {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ScriptedProvider").finish()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn chat(
            &self,
            _messages: Vec<Message>,
            _model: Option<&str>,
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            let n = self.calls.bump();
            if self.fail_on == Some(n) {
                return Err(ProviderError::ServerError("boom".into()).into());
            }
            if let Some((at, tx)) = &self.cancel_on {
                if *at == n {
                    let _ = tx.send(true);
                }
            }
            Ok(LLMResponse::text(&format!("reply {}", n))
                .with_usage(Usage::new(self.tokens.0, self.tokens.1)))
        }

        fn default_model(&self) -> &str {
            "scripted"
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Script {
        calls: Calls,
        tokens: (u32, u32),
        fail_on: Option<u64>,
        cancel_on: Option<(u64, Arc<watch::Sender<bool>>)>,
    }

    impl Script {
        fn new(tokens: (u32, u32)) -> Self {
            Self {
                calls: Calls::default(),
                tokens,
                fail_on: None,
                cancel_on: None,
            }
        }

        fn roster(&self, names: &[&str]) -> Vec<Agent> {
            names
                .iter()
                .map(|name| {
                    let provider = ScriptedProvider {
                        calls: self.calls.clone(),
                        tokens: self.tokens,
                        fail_on: self.fail_on,
                        cancel_on: self.cancel_on.clone(),
                    };
                    Agent::new(*name, Arc::new(provider), Pricing::per_million(3.0, 15.0))
                })
                .collect()
        }
    }

    fn config(ceiling: u64) -> SessionConfig {
        SessionConfig {
            theme: "Tea".into(),
            budget: BudgetConfig::new(ceiling, 0.9).unwrap(),
            turn_delay: Duration::ZERO,
            seed: Some(7),
            ..Default::default()
        }
    }

    fn no_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the channel open for the whole test.
        std::mem::forget(tx);
        rx
    }

    fn assert_no_repeats(turns: &[Turn]) {
        for pair in turns.windows(2) {
            assert_ne!(pair[0].speaker, pair[1].speaker);
        }
    }

    #[test]
    fn test_new_requires_two_agents() {
        let script = Script::new((1, 1));
        let err = ConversationLoop::new(
            script.roster(&["A"]),
            config(100),
            Box::new(MemorySink::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            RoundtableError::InsufficientAgents { available: 1 }
        ));

        let err = ConversationLoop::new(
            script.roster(&["A", "A"]),
            config(100),
            Box::new(MemorySink::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            RoundtableError::InsufficientAgents { available: 1 }
        ));
    }

    #[test]
    fn test_new_rejects_invalid_budget() {
        let script = Script::new((1, 1));
        let mut cfg = config(100);
        cfg.budget.token_ceiling = 0;
        let result = ConversationLoop::new(
            script.roster(&["A", "B"]),
            cfg,
            Box::new(MemorySink::new()),
        );
        assert!(matches!(result, Err(RoundtableError::Config(_))));
    }

    #[test]
    fn test_new_session_starts_running_with_zero_usage() {
        let script = Script::new((1, 1));
        let session = ConversationLoop::new(
            script.roster(&["A", "B", "C"]),
            config(100),
            Box::new(MemorySink::new()),
        )
        .unwrap();
        assert_eq!(session.status(), SessionStatus::Running);
        assert_eq!(session.usage().total_tokens(), 0);
        assert_eq!(session.agents().len(), 3);
    }

    #[tokio::test]
    async fn test_budget_stop_includes_triggering_turn() {
        // 30 tokens per turn against a ceiling of 100: turns 1-3 are under,
        // turn 4 reaches 120 and stops the session.
        let script = Script::new((20, 10));
        let sink = MemorySink::new();
        let session = ConversationLoop::new(
            script.roster(&["A", "B", "C"]),
            config(100),
            Box::new(sink.clone()),
        )
        .unwrap();

        let report = session.run(no_cancel()).await;
        assert_eq!(report.status, SessionStatus::StoppedBudget);
        assert_eq!(report.turns.len(), 4);
        assert_eq!(report.usage.total_tokens(), 120);
        assert_eq!(sink.turns().len(), 4);
        assert_eq!(script.calls.get(), 4);
        assert_no_repeats(&report.turns);

        // 90 tokens after turn 3 is exactly the warning threshold
        assert_eq!(report.warned_at, Some(3));
        assert_eq!(sink.warnings(), 1);

        let (status, usage) = sink.finalized().unwrap();
        assert_eq!(status, SessionStatus::StoppedBudget);
        assert_eq!(usage, report.usage);
    }

    #[tokio::test]
    async fn test_warning_is_emitted_once() {
        // 10 tokens per turn, ceiling 100: warning at turn 9, stop at turn 10
        let script = Script::new((5, 5));
        let sink = MemorySink::new();
        let session = ConversationLoop::new(
            script.roster(&["A", "B"]),
            config(100),
            Box::new(sink.clone()),
        )
        .unwrap();

        let report = session.run(no_cancel()).await;
        assert_eq!(report.status, SessionStatus::StoppedBudget);
        assert_eq!(report.turns.len(), 10);
        assert_eq!(report.warned_at, Some(9));
        assert_eq!(sink.warnings(), 1);

        let events = sink.events();
        let warning_pos = events
            .iter()
            .position(|e| matches!(e, SinkEvent::Warning(_)))
            .unwrap();
        assert!(matches!(&events[warning_pos - 1], SinkEvent::Turn(t) if t.sequence == 9));
    }

    #[tokio::test]
    async fn test_invocation_error_on_turn_five() {
        let mut script = Script::new((1, 1));
        script.fail_on = Some(5);
        let sink = MemorySink::new();
        let session = ConversationLoop::new(
            script.roster(&["A", "B", "C"]),
            config(10_000),
            Box::new(sink.clone()),
        )
        .unwrap();

        let report = session.run(no_cancel()).await;
        assert_eq!(report.status, SessionStatus::StoppedError);
        assert_eq!(report.turns.len(), 4);
        assert_eq!(report.usage.total_tokens(), 8);
        let reason = report.error.unwrap();
        assert!(reason.contains("boom"));

        let events = sink.events();
        assert!(matches!(&events[4], SinkEvent::Error(r) if r == &reason));
        assert!(matches!(
            &events[5],
            SinkEvent::Finalized(SessionStatus::StoppedError, _)
        ));
        assert_eq!(events.len(), 6);
    }

    #[tokio::test]
    async fn test_cancel_between_turns_three_and_four() {
        let (tx, rx) = watch::channel(false);
        let mut script = Script::new((10, 10));
        script.cancel_on = Some((3, Arc::new(tx)));
        let sink = MemorySink::new();
        let session = ConversationLoop::new(
            script.roster(&["A", "B", "C"]),
            config(10_000),
            Box::new(sink.clone()),
        )
        .unwrap();

        let report = session.run(rx).await;
        assert_eq!(report.status, SessionStatus::StoppedManual);
        assert_eq!(report.turns.len(), 3);
        assert_eq!(report.usage.total_tokens(), 60);
        assert_eq!(script.calls.get(), 3);
        assert_eq!(sink.turns().len(), 3);
        assert_eq!(
            sink.finalized().map(|(s, u)| (s, u.total_tokens())),
            Some((SessionStatus::StoppedManual, 60))
        );
    }

    #[tokio::test]
    async fn test_cancel_before_first_turn() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let script = Script::new((1, 1));
        let session = ConversationLoop::new(
            script.roster(&["A", "B"]),
            config(100),
            Box::new(MemorySink::new()),
        )
        .unwrap();

        let report = session.run(rx).await;
        assert_eq!(report.status, SessionStatus::StoppedManual);
        assert!(report.turns.is_empty());
        assert_eq!(script.calls.get(), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_turn_delay() {
        let (tx, rx) = watch::channel(false);
        let mut script = Script::new((1, 1));
        script.cancel_on = Some((1, Arc::new(tx)));
        let mut cfg = config(10_000);
        cfg.turn_delay = Duration::from_secs(3600);
        let session = ConversationLoop::new(
            script.roster(&["A", "B"]),
            cfg,
            Box::new(MemorySink::new()),
        )
        .unwrap();

        let report = tokio::time::timeout(Duration::from_secs(5), session.run(rx))
            .await
            .expect("delay should be interrupted");
        assert_eq!(report.status, SessionStatus::StoppedManual);
        assert_eq!(report.turns.len(), 1);
    }

    #[tokio::test]
    async fn test_max_turns() {
        let script = Script::new((1, 1));
        let mut cfg = config(10_000);
        cfg.max_turns = Some(7);
        let session = ConversationLoop::new(
            script.roster(&["A", "B", "C"]),
            cfg,
            Box::new(MemorySink::new()),
        )
        .unwrap();

        let report = session.run(no_cancel()).await;
        assert_eq!(report.status, SessionStatus::StoppedManual);
        assert_eq!(report.turns.len(), 7);
        assert_no_repeats(&report.turns);
    }

    #[tokio::test]
    async fn test_replayed_cost_matches_usage() {
        let script = Script::new((1_234, 567));
        let mut cfg = config(1_000_000);
        cfg.max_turns = Some(25);
        let session = ConversationLoop::new(
            script.roster(&["A", "B", "C"]),
            cfg,
            Box::new(MemorySink::new()),
        )
        .unwrap();

        let report = session.run(no_cancel()).await;
        let replayed = UsageState::replay(&report.turns);
        assert_eq!(replayed.total_cost, report.usage.total_cost);
        assert!(replayed.same_totals(&report.usage));
        let sequences: Vec<u64> = report.turns.iter().map(|t| t.sequence).collect();
        assert_eq!(sequences, (1..=25).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_session() {
        struct FailingSink;

        #[async_trait]
        impl TranscriptSink for FailingSink {
            async fn append(&self, _t: &Turn, _u: &UsageState) -> Result<()> {
                Err(RoundtableError::Config("disk full".into()))
            }
            async fn warning(&self, _u: &UsageState) -> Result<()> {
                Err(RoundtableError::Config("disk full".into()))
            }
            async fn error(&self, _r: &str) -> Result<()> {
                Err(RoundtableError::Config("disk full".into()))
            }
            async fn finalize(&self, _s: SessionStatus, _u: &UsageState) -> Result<()> {
                Err(RoundtableError::Config("disk full".into()))
            }
        }

        let script = Script::new((20, 10));
        let session = ConversationLoop::new(
            script.roster(&["A", "B"]),
            config(100),
            Box::new(FailingSink),
        )
        .unwrap();
        let report = session.run(no_cancel()).await;
        assert_eq!(report.status, SessionStatus::StoppedBudget);
        assert_eq!(report.turns.len(), 4);
    }

    #[test]
    fn test_session_config_from_config() {
        let mut cfg = Config::default();
        cfg.conversation.theme = "Space".into();
        cfg.conversation.turn_delay_secs = 0.5;
        cfg.conversation.max_turns = Some(3);
        cfg.budget.token_ceiling = 20_000;

        let session = SessionConfig::from(&cfg);
        assert_eq!(session.theme, "Space");
        assert_eq!(session.turn_delay, Duration::from_millis(500));
        assert_eq!(session.max_turns, Some(3));
        assert_eq!(session.budget.token_ceiling, 20_000);
        assert_eq!(session.history_window, DEFAULT_HISTORY_WINDOW);
    }
}
