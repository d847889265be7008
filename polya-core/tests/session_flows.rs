//! Integration tests for the session flows
//!
//! These drive a `SessionManager` end to end against the scripted engine and
//! check what reaches the engine, what lands in history, and what is published.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use polya_core::prelude::*;

const MAX_PROMPT_CHARS: usize = 1855;

/// Summarizer stub that counts calls and records what it was asked to condense
struct CountingSummarizer {
    calls: AtomicUsize,
    seen: StdMutex<Vec<String>>,
    summary: String,
}

impl CountingSummarizer {
    fn new(summary: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: StdMutex::new(Vec::new()),
            summary: summary.into(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    async fn summarize(&self, _engine: Option<&mut EngineHandle>, raw: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(raw.to_string());
        self.summary.clone()
    }
}

/// Engine whose single fragment is held back until the gate opens
struct GatedLoader {
    gate: Arc<Notify>,
}

struct GatedContext {
    gate: Arc<Notify>,
    done: bool,
}

#[async_trait]
impl EngineLoader for GatedLoader {
    async fn create_context(&self, _model_path: &Path) -> Result<Box<dyn EngineContext>> {
        Ok(Box::new(GatedContext {
            gate: Arc::clone(&self.gate),
            done: false,
        }))
    }
}

#[async_trait]
impl EngineContext for GatedContext {
    async fn clear(&mut self) {}

    async fn reset_state(&mut self) {
        self.done = false;
    }

    async fn completion_init(&mut self, _prompt: &str) -> Result<()> {
        self.done = false;
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.done
    }

    async fn completion_loop(&mut self) -> Result<String> {
        self.gate.notified().await;
        self.done = true;
        Ok("released".to_string())
    }
}

fn session(loader: &ScriptedLoader) -> SessionManager {
    SessionManager::new(Arc::new(loader.clone()), PolyaConfig::default())
}

fn request() -> SolutionRequest {
    SolutionRequest::new("Two numbers add to $$10$$ and differ by $$2$$.", "Guess and check")
        .with_final_answer("$$6$$ and $$4$$")
}

async fn assert_prompts_within_cap(stats: &EngineStats) {
    for prompt in stats.prompts().await {
        assert!(
            prompt.chars().count() <= MAX_PROMPT_CHARS,
            "submitted prompt of {} chars",
            prompt.chars().count()
        );
    }
}

#[tokio::test]
async fn test_empty_input_touches_nothing() {
    let loader = ScriptedLoader::new();
    let session = session(&loader);

    assert_eq!(session.continue_conversation("").await, messages::EMPTY_INPUT);
    assert_eq!(session.continue_conversation(" \n\t ").await, messages::EMPTY_INPUT);

    assert_eq!(loader.stats().contexts_created(), 0);
    assert_eq!(loader.stats().inits(), 0);
    assert!(session.history().await.is_empty());
}

#[tokio::test]
async fn test_stop_phrase_short_circuits() {
    let loader = ScriptedLoader::new().with_completion(["1. Try 6 and 4."]);
    let session = session(&loader);
    session.solve(&request()).await;
    let before = session.history().await;

    for message in ["ok thank you very much", "STOP", "Yes that's enough, why 6?"] {
        assert_eq!(session.continue_conversation(message).await, messages::STOP_ACK);
    }

    assert_eq!(loader.stats().inits(), 1);
    assert_eq!(session.history().await, before);
}

#[tokio::test]
async fn test_oversized_input_rejected() {
    let loader = ScriptedLoader::new();
    let session = session(&loader);

    let reply = session.continue_conversation(&"a".repeat(501)).await;

    assert_eq!(reply, messages::INPUT_TOO_LONG);
    assert_eq!(loader.stats().inits(), 0);
    assert!(session.history().await.is_empty());
}

#[tokio::test]
async fn test_oversized_solution_prompt_never_submitted() {
    let loader = ScriptedLoader::new().with_completion(["never used"]);
    let session = session(&loader);

    let reply = session
        .solve(&SolutionRequest::new("x".repeat(1400), "Draw a picture"))
        .await;

    assert_eq!(reply, messages::SOLUTION_TOO_LONG);
    assert_eq!(loader.stats().inits(), 0);
    assert!(session.history().await.is_empty());
}

#[tokio::test]
async fn test_oversized_follow_up_prompt_never_submitted() {
    let loader = ScriptedLoader::new().with_completion(["1. Try 6 and 4."]);
    let summarizer = CountingSummarizer::new("a".repeat(1500));
    let session = session(&loader).with_summarizer(summarizer.clone());
    session.solve(&request()).await;

    let reply = session.continue_conversation("Why 6?").await;

    assert_eq!(reply, messages::CANNOT_PROCESS);
    assert_eq!(loader.stats().inits(), 1);
    assert_eq!(summarizer.calls(), 1);
    // The question is recorded even though no answer was generated
    assert_eq!(session.history().await.last(), Some(&Turn::user("Why 6?")));
    assert_prompts_within_cap(&loader.stats()).await;
}

#[tokio::test]
async fn test_endless_engine_stops_at_step_cap() {
    let loader = ScriptedLoader::new().endless("x");
    let session = session(&loader).with_summarizer(CountingSummarizer::new("short"));

    let reply = session.solve(&request()).await;

    assert_eq!(reply, "x".repeat(1000));
    assert_eq!(loader.stats().loops(), 1000);

    // The session is still usable afterwards
    let reply = session.continue_conversation("Why?").await;
    assert_eq!(reply.len(), 1000);
}

#[tokio::test]
async fn test_summary_computed_once_per_conversation() {
    let loader = ScriptedLoader::new()
        .with_completion(["1. Try 6 and 4.\n", "2. Check $$6-4=2$$."])
        .with_completion(["Because $$6+4=10$$."])
        .with_completion(["The difference is $$2$$."]);
    let summarizer = CountingSummarizer::new("We guessed $$6$$ and $$4$$.");
    let session = session(&loader).with_summarizer(summarizer.clone());

    session.solve(&request()).await;
    let first = session.continue_conversation("Why 6?").await;
    let second = session.continue_conversation("And the difference?").await;

    assert_eq!(first, "Because $$6+4=10$$.");
    assert_eq!(second, "The difference is $$2$$.");
    assert_eq!(summarizer.calls(), 1);
    assert_eq!(summarizer.seen(), vec!["1. Try 6 and 4.\n2. Check $$6-4=2$$.".to_string()]);
    assert_eq!(
        session.cached_summary().await.as_deref(),
        Some("We guessed $$6$$ and $$4$$.")
    );

    let prompts = loader.stats().prompts().await;
    assert_eq!(prompts.len(), 3);
    for prompt in &prompts[1..] {
        assert!(prompt.contains("Assistant (summary):We guessed $$6$$ and $$4$$. User (new):"));
        assert!(prompt.contains("technique(s): \"- Guess and check\""));
    }
    assert!(prompts[2].ends_with("User (new): And the difference?. Assistant:"));
}

#[tokio::test]
async fn test_engine_summarizer_shares_the_context() {
    let loader = ScriptedLoader::new()
        .with_completion(["1. Try 6 and 4."])
        .with_completion(["  Guessing gives $$6$$ and $$4$$.  "])
        .with_completion(["Because they add to $$10$$."])
        .with_completion(["Yes."]);
    let session = session(&loader);

    session.solve(&request()).await;
    let reply = session.continue_conversation("Why 6?").await;
    session.continue_conversation("Is that all?").await;

    assert_eq!(reply, "Because they add to $$10$$.");
    assert_eq!(loader.stats().contexts_created(), 1);

    let prompts = loader.stats().prompts().await;
    assert_eq!(prompts.len(), 4);
    assert!(prompts[1].starts_with("Summarize the following explanation"));
    assert!(prompts[1].ends_with("Explanation to summarize: 1. Try 6 and 4."));
    assert!(prompts[2].contains("Assistant (summary):Guessing gives $$6$$ and $$4$$. User (new): Why 6?"));
    assert!(prompts[3].starts_with("Continue the conversation"));
    assert_prompts_within_cap(&loader.stats()).await;
}

#[tokio::test]
async fn test_history_after_follow_up() {
    let loader = ScriptedLoader::new()
        .with_completion(["\n1. Try 6 and 4.\n"])
        .with_completion(["Because $$6+4=10$$."]);
    let session = session(&loader).with_summarizer(CountingSummarizer::new("s"));

    session.solve(&request()).await;
    session.continue_conversation("Why 6?").await;

    assert_eq!(
        session.history().await,
        vec![
            Turn::user("Two numbers add to $$10$$ and differ by $$2$$."),
            Turn::assistant("1. Try 6 and 4."),
            Turn::user("Why 6?"),
            Turn::assistant("Because $$6+4=10$$."),
        ]
    );
}

#[tokio::test]
async fn test_degenerate_output_not_stored() {
    let loader = ScriptedLoader::new()
        .with_completion(["``", "`"])
        .with_completion(["1. Try 6 and 4."])
        .with_completion(["   "]);
    let session = session(&loader).with_summarizer(CountingSummarizer::new("s"));

    assert_eq!(session.solve(&request()).await, messages::FALLBACK);
    assert!(session.history().await.is_empty());

    session.solve(&request()).await;
    assert_eq!(session.continue_conversation("Why 6?").await, messages::FALLBACK);

    let history = session.history().await;
    assert_eq!(history.len(), 3);
    assert_eq!(history[2], Turn::user("Why 6?"));
}

#[tokio::test]
async fn test_not_ready_paths() {
    let loader = ScriptedLoader::new().failing("model file missing");
    let session = session(&loader);

    assert!(session.ensure_ready().await.is_err());
    assert_eq!(session.solve(&request()).await, messages::CONTEXT_UNAVAILABLE);
    assert_eq!(
        session.continue_conversation("Why 6?").await,
        messages::CONTEXT_UNAVAILABLE
    );
    assert!(session.force_reset().await.is_err());

    assert!(!session.is_ready());
    assert!(session.history().await.is_empty());
    // Validation still runs without an engine
    assert_eq!(session.continue_conversation("").await, messages::EMPTY_INPUT);
}

#[tokio::test]
async fn test_force_reset_clears_conversation() {
    let loader = ScriptedLoader::new()
        .with_completion(["1. Try 6 and 4."])
        .with_completion(["Because."])
        .with_completion(["Fresh answer."]);
    let summarizer = CountingSummarizer::new("cached");
    let session = session(&loader).with_summarizer(summarizer.clone());

    session.solve(&request()).await;
    session.continue_conversation("Why 6?").await;
    let resets_before = loader.stats().resets();

    session.force_reset().await.unwrap();

    assert!(session.history().await.is_empty());
    assert!(session.cached_summary().await.is_none());
    assert!(loader.stats().resets() > resets_before);
    assert!(session.is_ready());

    // No first response exists any more, so nothing is summarized
    session.continue_conversation("Anything?").await;
    assert_eq!(summarizer.calls(), 1);
    let prompt = loader.stats().last_prompt().await.unwrap();
    assert!(prompt.contains(&format!("Assistant (summary):{} User (new)", messages::NO_SUMMARY)));
    assert!(prompt.contains("technique(s): \"\""));
}

#[tokio::test]
async fn test_open_problem_from_store() {
    let store = ProblemStore::from_json_str(
        r#"[{
            "id": "coins",
            "body": "Ten coins make $$0.47$$. How many pennies?",
            "techniques": ["Make a table", "Guess and check"],
            "figureDescription": "A pile of coins",
            "finalAnswer": "$$7$$ pennies",
            "solution": "Try 7 pennies."
        }]"#,
    )
    .unwrap();
    let problem = store.get("coins").unwrap();
    let loader = ScriptedLoader::new().with_completion(["1. Make a table.\n2. $$7$$ pennies."]);
    let session = session(&loader);

    let reply = session.open_problem(problem).await;

    assert_eq!(reply, "1. Make a table.\n2. $$7$$ pennies.");
    let prompt = loader.stats().last_prompt().await.unwrap();
    assert!(prompt.starts_with(
        "Solve the problem using the Polya-style technique: Make a table, Guess and check."
    ));
    assert!(prompt.contains("Figure: A pile of coins Provided Solution: Try 7 pennies."));
    assert!(prompt.ends_with("Finish with the final answer: $$7$$ pennies and nothing else."));
    assert_eq!(session.history().await[0], Turn::user(problem.body.as_str()));
}

#[tokio::test]
async fn test_events_track_the_stream() {
    let loader = ScriptedLoader::new().with_completion(["1. Try", " 6 and 4.", "\n"]);
    let (session, mut rx) = session(&loader).with_event_channel();

    let reply = session.solve(&request()).await;
    drop(session);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let types: Vec<_> = events.iter().map(SessionEvent::event_type).collect();
    assert_eq!(
        types,
        vec![
            "readiness_changed",
            "generation_started",
            "stream_chunk",
            "stream_chunk",
            "stream_chunk",
            "generation_finished",
            "reply",
        ]
    );

    let last_chunk = events.iter().rev().find_map(|e| match e {
        SessionEvent::StreamChunk { text, .. } => Some(text.clone()),
        _ => None,
    });
    assert_eq!(last_chunk.as_deref(), Some("1. Try 6 and 4.\n"));

    match events.last() {
        Some(SessionEvent::Reply { text, .. }) => assert_eq!(text, &reply),
        other => panic!("expected reply event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unread_subscriber_never_stalls_the_session() {
    let loader = ScriptedLoader::new().endless("x");
    let (session, _rx) = session(&loader)
        .with_summarizer(CountingSummarizer::new("short"))
        .with_event_channel();
    let stream = session.subscribe_stream().unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), session.solve(&request()))
        .await
        .expect("solve stalled behind a full event buffer");

    assert_eq!(reply, "x".repeat(1000));
    assert_eq!(loader.stats().loops(), 1000);
    assert_eq!(*stream.borrow(), "x".repeat(1000));

    // The lock was released, so the other flows still go through
    tokio::time::timeout(Duration::from_secs(5), session.reset_chat())
        .await
        .expect("reset stalled");
    tokio::time::timeout(Duration::from_secs(5), session.shutdown())
        .await
        .expect("shutdown stalled");
    assert!(!session.is_ready());
}

#[tokio::test]
async fn test_rejections_are_published_as_replies() {
    let loader = ScriptedLoader::new();
    let (session, mut rx) = session(&loader).with_event_channel();

    session.continue_conversation("stop").await;
    drop(session);

    let event = rx.recv().await.unwrap();
    assert!(matches!(event, SessionEvent::Reply { ref text, .. } if text == messages::STOP_ACK));
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_overlapping_flows_are_refused() {
    let gate = Arc::new(Notify::new());
    let loader = GatedLoader {
        gate: Arc::clone(&gate),
    };
    let (session, mut rx) =
        SessionManager::new(Arc::new(loader), PolyaConfig::default()).with_event_channel();
    let session = Arc::new(session);

    let solving = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.solve(&request()).await }
    });

    loop {
        match rx.recv().await {
            Some(SessionEvent::GenerationStarted { .. }) => break,
            Some(_) => continue,
            None => panic!("event channel closed before generation started"),
        }
    }

    assert_eq!(session.continue_conversation("Why 6?").await, messages::BUSY);
    assert_eq!(session.solve(&request()).await, messages::BUSY);
    // Rejections that need no engine are still answered while busy
    assert_eq!(session.continue_conversation("").await, messages::EMPTY_INPUT);

    gate.notify_one();
    assert_eq!(solving.await.unwrap(), "released");

    let history = session.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1], Turn::assistant("released"));
}

#[tokio::test]
async fn test_shutdown_then_reuse() {
    let loader = ScriptedLoader::new()
        .with_completion(["first"])
        .with_completion(["second"]);
    let session = session(&loader);

    session.solve(&request()).await;
    session.shutdown().await;
    assert!(!session.is_ready());

    assert_eq!(session.solve(&request()).await, "second");
    assert_eq!(loader.stats().contexts_created(), 2);
}
