//! Integration tests for Roundtable
//!
//! These drive a full `ConversationLoop` with scripted providers and check
//! the turn-taking, budget and persistence properties end to end.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::sync::watch;

use roundtable::agent::{Agent, AgentId};
use roundtable::budget::BudgetConfig;
use roundtable::conversation::{ConversationLoop, SessionConfig, SessionStatus};
use roundtable::pricing::{Cost, Pricing};
use roundtable::providers::{ChatOptions, LLMProvider, LLMResponse, Message, Role, Usage};
use roundtable::transcript::{
    FanoutSink, MemorySink, RosterEntry, SessionLog, SessionLogSink, SessionMeta,
};
use roundtable::usage::UsageState;
use roundtable::Result;

// ============================================================================
// Scripted provider
// ============================================================================

/// Replies with a fixed usage and records every prompt it was sent.
struct ScriptedProvider {
    name: &'static str,
    usage: Usage,
    calls: AtomicU32,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    fn new(name: &'static str, prompt_tokens: u32, completion_tokens: u32) -> Arc<Self> {
        Arc::new(Self {
            name,
            usage: Usage::new(prompt_tokens, completion_tokens),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        _model: Option<&str>,
        _options: ChatOptions,
    ) -> Result<LLMResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(messages);
        Ok(LLMResponse::text(&format!("{} says hello #{}", self.name, n)).with_usage(self.usage))
    }

    fn default_model(&self) -> &str {
        "scripted-1"
    }

    fn name(&self) -> &str {
        self.name
    }
}

fn open_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    // The loop treats a dropped sender as "never cancelled"; keep it anyway.
    std::mem::forget(tx);
    rx
}

fn session_config(ceiling: u64) -> SessionConfig {
    SessionConfig {
        theme: "Is tea better than coffee?".to_string(),
        budget: BudgetConfig::new(ceiling, 0.9).unwrap(),
        turn_delay: Duration::ZERO,
        seed: Some(2024),
        ..Default::default()
    }
}

// ============================================================================
// Session tests
// ============================================================================

#[tokio::test]
async fn test_three_agents_until_budget() {
    let openai = ScriptedProvider::new("openai", 120, 30);
    let claude = ScriptedProvider::new("anthropic", 110, 40);
    let gemini = ScriptedProvider::new("gemini", 100, 20);
    let agents = vec![
        Agent::new("ChatGPT", openai.clone(), Pricing::per_million(2.50, 10.00)),
        Agent::new("Claude", claude.clone(), Pricing::per_million(3.00, 15.00)),
        Agent::new("Gemini", gemini.clone(), Pricing::Free),
    ];
    let sink = MemorySink::new();

    let session = ConversationLoop::new(agents, session_config(2_000), Box::new(sink.clone()))
        .unwrap();
    let report = session.run(open_channel()).await;

    assert_eq!(report.status, SessionStatus::StoppedBudget);
    assert!(report.usage.total_tokens() >= 2_000);
    let before_last: u64 = report.turns[..report.turns.len() - 1]
        .iter()
        .map(|t| t.total_tokens())
        .sum();
    assert!(before_last < 2_000);

    // No speaker twice in a row, sequences contiguous from 1
    for (i, pair) in report.turns.windows(2).enumerate() {
        assert_ne!(pair[0].speaker, pair[1].speaker, "repeat at turn {}", i + 2);
    }
    for (i, turn) in report.turns.iter().enumerate() {
        assert_eq!(turn.sequence, i as u64 + 1);
    }

    // Replay reproduces the accumulated totals
    let replayed = UsageState::replay(&report.turns);
    assert!(replayed.same_totals(&report.usage));
    let summed: Cost = report.turns.iter().map(|t| t.cost).sum();
    assert_eq!(summed, report.usage.total_cost);

    // Gemini is free; the others are not
    let gemini_usage = report.usage.agent(&AgentId::new("Gemini"));
    if let Some(g) = gemini_usage {
        assert!(g.cost.is_zero());
    }

    assert_eq!(sink.warnings(), 1);
    assert_eq!(sink.turns().len(), report.turns.len());
    let calls = openai.calls.load(Ordering::SeqCst)
        + claude.calls.load(Ordering::SeqCst)
        + gemini.calls.load(Ordering::SeqCst);
    assert_eq!(calls as usize, report.turns.len());
}

#[tokio::test]
async fn test_prompts_show_each_agent_its_own_side() {
    let a = ScriptedProvider::new("a", 10, 10);
    let b = ScriptedProvider::new("b", 10, 10);
    let agents = vec![
        Agent::new("A", a.clone(), Pricing::Free),
        Agent::new("B", b.clone(), Pricing::Free),
    ];
    let mut config = session_config(100_000);
    config.max_turns = Some(4);

    let session = ConversationLoop::new(agents, config, Box::new(MemorySink::new())).unwrap();
    let report = session.run(open_channel()).await;
    assert_eq!(report.turns.len(), 4);
    assert_eq!(report.status, SessionStatus::StoppedManual);

    // Two agents strictly alternate, so A's second prompt saw A's first
    // reply as its own and B's reply as someone else's.
    let first = report.turns[0].speaker.clone();
    let provider = if first.as_str() == "A" { &a } else { &b };
    let prompts = provider.prompts.lock().unwrap();
    let second = &prompts[1];
    assert_eq!(second[0].role, Role::System);
    assert!(second[0].content.contains("Is tea better than coffee?"));
    assert_eq!(second[2].role, Role::Assistant);
    assert_eq!(second[2].content, report.turns[0].text);
    assert_eq!(second[3].role, Role::User);
    assert!(second[3].content.starts_with(&format!("{}: ", report.turns[1].speaker)));
}

#[tokio::test]
async fn test_insufficient_agents_is_rejected() {
    let a = ScriptedProvider::new("a", 1, 1);
    let agents = vec![Agent::new("A", a, Pricing::Free)];
    let result = ConversationLoop::new(agents, session_config(100), Box::new(MemorySink::new()));
    assert!(matches!(
        result,
        Err(roundtable::RoundtableError::InsufficientAgents { available: 1 })
    ));
}

// ============================================================================
// Persistence tests
// ============================================================================

#[tokio::test]
async fn test_session_log_roundtrip() {
    let dir = tempdir().unwrap();
    let agents = vec![
        Agent::new(
            "ChatGPT",
            ScriptedProvider::new("openai", 200, 50),
            Pricing::per_million(2.50, 10.00),
        ),
        Agent::new(
            "Claude",
            ScriptedProvider::new("anthropic", 210, 60),
            Pricing::per_million(3.00, 15.00),
        ),
    ];
    let config = session_config(3_000);
    let roster: Vec<RosterEntry> = agents.iter().map(RosterEntry::from).collect();
    let meta = SessionMeta::new(&config.theme, config.budget, roster).with_name("roundtrip");
    let log_sink = SessionLogSink::create(dir.path(), meta).await.unwrap();
    let json_path = log_sink.json_path().to_path_buf();
    let text_path = log_sink.text_path().to_path_buf();

    let memory = MemorySink::new();
    let sink = FanoutSink::new().with(memory.clone()).with(log_sink);
    let session = ConversationLoop::new(agents, config, Box::new(sink)).unwrap();
    let report = session.run(open_channel()).await;
    assert_eq!(report.status, SessionStatus::StoppedBudget);

    let log = SessionLog::load(&json_path).unwrap();
    assert_eq!(log.meta.name, "roundtrip");
    assert_eq!(log.status, SessionStatus::StoppedBudget);
    assert_eq!(log.turns, report.turns);
    assert_eq!(log.usage, report.usage);
    assert_eq!(log.warned_at, report.warned_at);
    assert!(log.ended_at.is_some());
    assert_eq!(log.meta.roster.len(), 2);
    log.verify().unwrap();

    let text = std::fs::read_to_string(&text_path).unwrap();
    assert!(text.contains("Theme: Is tea better than coffee?"));
    assert!(text.contains("Conversation ended"));
    for turn in &report.turns {
        assert!(text.contains(&turn.text));
    }
}

#[tokio::test]
async fn test_cancelled_session_log_is_consistent() {
    let dir = tempdir().unwrap();
    let agents = vec![
        Agent::new("A", ScriptedProvider::new("a", 5, 5), Pricing::Free),
        Agent::new("B", ScriptedProvider::new("b", 5, 5), Pricing::Free),
    ];
    let mut config = session_config(100_000);
    config.turn_delay = Duration::from_millis(20);
    let roster: Vec<RosterEntry> = agents.iter().map(RosterEntry::from).collect();
    let meta = SessionMeta::new(&config.theme, config.budget, roster).with_name("cancelled");
    let log_sink = SessionLogSink::create(dir.path(), meta).await.unwrap();
    let json_path = log_sink.json_path().to_path_buf();

    let (tx, rx) = watch::channel(false);
    let session = ConversationLoop::new(agents, config, Box::new(log_sink)).unwrap();
    let handle = tokio::spawn(session.run(rx));
    tokio::time::sleep(Duration::from_millis(70)).await;
    tx.send(true).unwrap();
    let report = handle.await.unwrap();

    assert_eq!(report.status, SessionStatus::StoppedManual);
    assert!(!report.turns.is_empty());
    let log = SessionLog::load(&json_path).unwrap();
    assert_eq!(log.status, SessionStatus::StoppedManual);
    assert_eq!(log.turns.len(), report.turns.len());
    log.verify().unwrap();
}
