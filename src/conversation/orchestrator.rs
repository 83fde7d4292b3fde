//! Conversation orchestrator: one chat request in, one display reply out.
//!
//! Per request:
//! 1. Reject an empty prompt (the only early exit before the network).
//! 2. Validate model and temperature, substituting defaults with warnings.
//! 3. Compile the transcript from stored history, or send the raw prompt.
//! 4. Query the inference backend.
//! 5. On failure, return error text and leave history alone.
//! 6. On success, sanitize reasoning-model output and record the exchange.
//!
//! Same-user preserve-history requests are serialized by a per-user guard so
//! that each exchange sees the one before it. Requests from different users
//! never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::Instrument;
use uuid::Uuid;

use super::errors::RelayError;
use super::history::HistoryStore;
use super::prompt::compile;
use super::sanitizer::sanitize;
use super::types::{RelayReply, RequestParameters, Turn};
use crate::config::RelayConfig;
use crate::inference::{InferenceBackend, InferenceError};

/// Async guard serializing one user's history-bearing exchanges.
type UserGuard = Arc<tokio::sync::Mutex<()>>;

// ─── ConversationOrchestrator ───────────────────────────────────────────────

/// Composes validation, prompt compilation, inference, sanitization and
/// history updates.
pub struct ConversationOrchestrator {
    config: RelayConfig,
    backend: Arc<dyn InferenceBackend>,
    history: Arc<dyn HistoryStore>,
    user_guards: Mutex<HashMap<String, UserGuard>>,
}

impl ConversationOrchestrator {
    pub fn new(
        config: RelayConfig,
        backend: Arc<dyn InferenceBackend>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            config,
            backend,
            history,
            user_guards: Mutex::new(HashMap::new()),
        }
    }

    /// The configuration this orchestrator validates against.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Stored turns for `user_id`.
    pub fn history(&self, user_id: &str) -> Vec<Turn> {
        self.history.get(user_id)
    }

    /// Handle one chat request.
    ///
    /// Returns `Err` only for request validation failures. Inference failures
    /// come back as an `Ok` reply with `is_error` set.
    pub async fn handle(
        &self,
        user_id: &str,
        params: RequestParameters,
    ) -> Result<RelayReply, RelayError> {
        let span = tracing::info_span!("handle", request_id = %Uuid::new_v4(), user = %user_id);
        self.handle_inner(user_id, params).instrument(span).await
    }

    /// Forget everything stored for `user_id`. Returns whether anything was stored.
    pub async fn clear_history(&self, user_id: &str) -> bool {
        let guard = self.user_guard(user_id);
        let existed = {
            let _lock = guard.lock().await;
            self.history.clear(user_id)
        };
        drop(guard);
        self.release_guard(user_id);
        tracing::info!(user = %user_id, existed, "history clear requested");
        existed
    }

    async fn handle_inner(
        &self,
        user_id: &str,
        params: RequestParameters,
    ) -> Result<RelayReply, RelayError> {
        if params.prompt.trim().is_empty() {
            tracing::info!("rejected empty prompt");
            return Err(RelayError::EmptyPrompt);
        }

        let mut warnings = Vec::new();
        let model = self.resolve_model(params.model.as_deref(), &mut warnings);
        let temperature = self.resolve_temperature(params.temperature, &mut warnings);

        if !params.preserve_history {
            return Ok(self.exchange(user_id, &params, &model, temperature, warnings).await);
        }

        // Held across read → infer → append so turn pairs stay in order.
        let guard = self.user_guard(user_id);
        let reply = {
            let _lock = guard.lock().await;
            self.exchange(user_id, &params, &model, temperature, warnings).await
        };
        drop(guard);
        self.release_guard(user_id);

        Ok(reply)
    }

    /// Query the backend and, for preserve-history requests, record the exchange.
    async fn exchange(
        &self,
        user_id: &str,
        params: &RequestParameters,
        model: &str,
        temperature: f32,
        warnings: Vec<String>,
    ) -> RelayReply {
        let prompt = if params.preserve_history {
            let turns = self.history.get(user_id);
            tracing::debug!(prior_turns = turns.len(), "compiling prompt from history");
            compile(&turns, &params.prompt)
        } else {
            params.prompt.clone()
        };

        let raw = match self.backend.query(&prompt, model, temperature).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    model = %model,
                    error = %e,
                    transport = e.is_transport(),
                    "inference failed"
                );
                return RelayReply::failed(error_message(&e), warnings);
            }
        };

        let answer = if self.config.is_reasoning_model(model) {
            sanitize(&raw, params.show_thinking)
        } else {
            raw
        };

        if params.preserve_history {
            self.history.append(user_id, &params.prompt, &answer);
        }

        tracing::info!(
            model = %model,
            warnings = warnings.len(),
            answer_len = answer.len(),
            preserve_history = params.preserve_history,
            "request answered"
        );

        RelayReply::answered(answer, warnings)
    }

    // ─── Validation ─────────────────────────────────────────────────────

    /// Accept an allowed model, otherwise fall back to the default.
    fn resolve_model(&self, requested: Option<&str>, warnings: &mut Vec<String>) -> String {
        let default = &self.config.default_model;
        match requested.map(str::trim).filter(|m| !m.is_empty()) {
            None => default.clone(),
            Some(model) if self.config.is_allowed_model(model) => model.to_string(),
            Some(model) => {
                tracing::info!(rejected = %model, substitute = %default, "model not allowed");
                warnings.push(format!(
                    "⚠️ Model `{model}` is not available; using `{default}` instead."
                ));
                default.clone()
            }
        }
    }

    /// Accept a temperature in [0.0, 1.0], otherwise fall back to the default.
    fn resolve_temperature(&self, requested: Option<f32>, warnings: &mut Vec<String>) -> f32 {
        let default = self.config.default_temperature;
        match requested {
            None => default,
            Some(t) if (0.0..=1.0).contains(&t) => t,
            Some(t) => {
                tracing::info!(rejected = t, substitute = default, "temperature out of range");
                warnings.push(format!(
                    "⚠️ Temperature {t} is outside 0.0-1.0; using {default} instead."
                ));
                default
            }
        }
    }

    fn user_guard(&self, user_id: &str) -> UserGuard {
        let mut guards = self
            .user_guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guards.entry(user_id.to_string()).or_default().clone()
    }

    /// Drop `user_id`'s guard entry once no request holds a handle to it.
    ///
    /// Callers must have dropped their own handle first. A handle can only be
    /// cloned under the map lock, so a count of one here means the entry is idle.
    fn release_guard(&self, user_id: &str) {
        let mut guards = self
            .user_guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if guards
            .get(user_id)
            .is_some_and(|guard| Arc::strong_count(guard) == 1)
        {
            guards.remove(user_id);
        }
    }
}

/// User-facing text for a failed inference call.
pub fn error_message(err: &InferenceError) -> String {
    match err {
        InferenceError::Status { status } => {
            format!("❌ Error communicating with Ollama (HTTP {status}).")
        }
        InferenceError::Timeout { duration_secs } => format!(
            "❌ Error communicating with Ollama: no answer within {duration_secs}s."
        ),
        InferenceError::Transport { .. } | InferenceError::ClientBuild { .. } => {
            format!("❌ Error communicating with Ollama: {err}.")
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::history::InMemoryHistoryStore;
    use crate::conversation::prompt::PREAMBLE;
    use crate::conversation::types::Role;
    use crate::inference::GenerateRequest;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Backend double that records every call and replays scripted results.
    #[derive(Default)]
    struct ScriptedBackend {
        calls: Mutex<Vec<GenerateRequest>>,
        replies: Mutex<VecDeque<Result<String, InferenceError>>>,
        delay: Option<Duration>,
    }

    impl ScriptedBackend {
        fn replying(replies: Vec<Result<String, InferenceError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                ..Self::default()
            })
        }

        fn calls(&self) -> Vec<GenerateRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        async fn query(
            &self,
            prompt: &str,
            model: &str,
            temperature: f32,
        ) -> Result<String, InferenceError> {
            self.calls
                .lock()
                .unwrap()
                .push(GenerateRequest::new(model, prompt, temperature));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("default reply".to_string()))
        }
    }

    fn orchestrator(backend: Arc<ScriptedBackend>) -> ConversationOrchestrator {
        ConversationOrchestrator::new(
            RelayConfig::default(),
            backend,
            Arc::new(InMemoryHistoryStore::new()),
        )
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_without_network() {
        let backend = ScriptedBackend::replying(vec![]);
        let orch = orchestrator(backend.clone());

        let err = orch
            .handle("u1", RequestParameters::new("   \n\t"))
            .await
            .unwrap_err();
        assert_eq!(err, RelayError::EmptyPrompt);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reasoning_output_is_sanitized() {
        let backend = ScriptedBackend::replying(vec![Ok(
            "<think>reasoning</think>Hi there!".to_string(),
        )]);
        let orch = orchestrator(backend.clone());

        let reply = orch.handle("u1", RequestParameters::new("Hello!")).await.unwrap();
        assert_eq!(reply.text(), "Hi there!");
        assert!(!reply.is_error);
        assert!(reply.warnings.is_empty());

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "deepseek-r1:8b");
        assert_eq!(calls[0].prompt, "Hello!");
    }

    #[tokio::test]
    async fn test_show_thinking_keeps_reasoning() {
        let backend = ScriptedBackend::replying(vec![Ok(
            ">>> scaffold\n<think>reasoning</think>Hi there!".to_string(),
        )]);
        let orch = orchestrator(backend);

        let reply = orch
            .handle("u1", RequestParameters::new("Hello!").with_show_thinking(true))
            .await
            .unwrap();
        assert_eq!(reply.text(), "<think>reasoning</think>Hi there!");
    }

    #[tokio::test]
    async fn test_non_reasoning_model_passes_through() {
        let raw = "<think>kept</think>\n>>> also kept";
        let backend = ScriptedBackend::replying(vec![Ok(raw.to_string())]);
        let orch = orchestrator(backend);

        let reply = orch
            .handle("u1", RequestParameters::new("Hello!").with_model("llama3.1:8b"))
            .await
            .unwrap();
        assert_eq!(reply.text(), raw);
    }

    #[tokio::test]
    async fn test_unknown_model_falls_back_with_warning() {
        let backend = ScriptedBackend::replying(vec![Ok("ok".to_string())]);
        let orch = orchestrator(backend.clone());

        let reply = orch
            .handle("u1", RequestParameters::new("Hello!").with_model("nonexistent"))
            .await
            .unwrap();

        assert_eq!(reply.warnings.len(), 1);
        assert!(reply.warnings[0].contains("nonexistent"));
        assert!(reply.warnings[0].contains("deepseek-r1:8b"));
        assert_eq!(backend.calls()[0].model, "deepseek-r1:8b");
        assert_eq!(reply.text(), format!("{}\n\nok", reply.warnings[0]));
    }

    #[tokio::test]
    async fn test_out_of_range_temperature_falls_back() {
        let backend = ScriptedBackend::replying(vec![Ok("ok".to_string())]);
        let orch = orchestrator(backend.clone());

        let reply = orch
            .handle("u1", RequestParameters::new("Hello!").with_temperature(1.5))
            .await
            .unwrap();

        assert_eq!(reply.warnings.len(), 1);
        assert!(reply.warnings[0].contains("1.5"));
        assert!((backend.calls()[0].temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_nan_temperature_falls_back() {
        let backend = ScriptedBackend::replying(vec![Ok("ok".to_string())]);
        let orch = orchestrator(backend.clone());

        let reply = orch
            .handle("u1", RequestParameters::new("Hello!").with_temperature(f32::NAN))
            .await
            .unwrap();
        assert_eq!(reply.warnings.len(), 1);
        assert!((backend.calls()[0].temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_boundary_temperatures_accepted() {
        let backend = ScriptedBackend::replying(vec![]);
        let orch = orchestrator(backend.clone());

        for t in [0.0, 1.0] {
            let reply = orch
                .handle("u1", RequestParameters::new("Hello!").with_temperature(t))
                .await
                .unwrap();
            assert!(reply.warnings.is_empty());
        }
        let temps: Vec<f32> = backend.calls().iter().map(|c| c.temperature).collect();
        assert_eq!(temps, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_both_warnings_in_order() {
        let backend = ScriptedBackend::replying(vec![Ok("ok".to_string())]);
        let orch = orchestrator(backend);

        let reply = orch
            .handle(
                "u1",
                RequestParameters::new("Hello!")
                    .with_model("gpt-9")
                    .with_temperature(-0.1),
            )
            .await
            .unwrap();
        assert_eq!(reply.warnings.len(), 2);
        assert!(reply.warnings[0].contains("gpt-9"));
        assert!(reply.warnings[1].contains("-0.1"));
        assert!(reply
            .text()
            .starts_with(&format!("{}\n{}\n\n", reply.warnings[0], reply.warnings[1])));
    }

    #[tokio::test]
    async fn test_without_history_sends_raw_prompt_and_stores_nothing() {
        let backend = ScriptedBackend::replying(vec![]);
        let orch = orchestrator(backend.clone());

        orch.handle("u1", RequestParameters::new("Hello!")).await.unwrap();
        assert_eq!(backend.calls()[0].prompt, "Hello!");
        assert!(orch.history("u1").is_empty());
    }

    #[tokio::test]
    async fn test_without_history_ignores_stored_turns() {
        let backend = ScriptedBackend::replying(vec![
            Ok("Hi there!".to_string()),
            Ok("Paris.".to_string()),
        ]);
        let orch = orchestrator(backend.clone());

        orch.handle("u1", RequestParameters::new("Hello!").with_preserve_history(true))
            .await
            .unwrap();
        let before = orch.history("u1");
        assert_eq!(before.len(), 2);

        let reply = orch
            .handle("u1", RequestParameters::new("Capital of France?"))
            .await
            .unwrap();
        assert_eq!(reply.text(), "Paris.");

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].prompt, "Capital of France?");
        assert!(!calls[1].prompt.contains(PREAMBLE));
        assert!(!calls[1].prompt.contains("User:"));
        assert_eq!(orch.history("u1"), before);
    }

    #[tokio::test]
    async fn test_second_history_call_sees_first_exchange() {
        let backend = ScriptedBackend::replying(vec![
            Ok("<think>hmm</think>Hi there!".to_string()),
            Ok("I am fine.".to_string()),
        ]);
        let orch = orchestrator(backend.clone());

        orch.handle("u1", RequestParameters::new("Hello!").with_preserve_history(true))
            .await
            .unwrap();
        orch.handle(
            "u1",
            RequestParameters::new("How are you?").with_preserve_history(true),
        )
        .await
        .unwrap();

        let calls = backend.calls();
        assert_eq!(
            calls[0].prompt,
            format!("{PREAMBLE}\nUser: Hello!\nAssistant:")
        );
        assert_eq!(
            calls[1].prompt,
            format!(
                "{PREAMBLE}\nUser: Hello!\nAssistant: Hi there!\nUser: How are you?\nAssistant:"
            )
        );

        let turns = orch.history("u1");
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0], Turn::user("Hello!"));
        assert_eq!(turns[1], Turn::assistant("Hi there!"));
    }

    #[tokio::test]
    async fn test_history_stores_original_prompt() {
        let backend = ScriptedBackend::replying(vec![Ok("answer".to_string())]);
        let orch = orchestrator(backend);

        orch.handle(
            "u1",
            RequestParameters::new("  spaced prompt ").with_preserve_history(true),
        )
        .await
        .unwrap();
        assert_eq!(orch.history("u1")[0].text, "  spaced prompt ");
    }

    #[tokio::test]
    async fn test_transport_error_leaves_history_unchanged() {
        let backend = ScriptedBackend::replying(vec![
            Ok("first".to_string()),
            Err(InferenceError::Transport {
                endpoint: "http://localhost:11434/api/generate".into(),
                reason: "connection refused".into(),
            }),
        ]);
        let orch = orchestrator(backend);
        let params = |p: &str| RequestParameters::new(p).with_preserve_history(true);

        orch.handle("u1", params("one")).await.unwrap();
        let before = orch.history("u1");

        let reply = orch.handle("u1", params("two")).await.unwrap();
        assert!(reply.is_error);
        assert!(reply.text().starts_with("❌"));
        assert_eq!(orch.history("u1"), before);
    }

    #[tokio::test]
    async fn test_status_error_keeps_warnings() {
        let backend =
            ScriptedBackend::replying(vec![Err(InferenceError::Status { status: 500 })]);
        let orch = orchestrator(backend);

        let reply = orch
            .handle(
                "u1",
                RequestParameters::new("Hello!")
                    .with_temperature(2.0)
                    .with_preserve_history(true),
            )
            .await
            .unwrap();
        assert!(reply.is_error);
        assert!(reply.content.contains("500"));
        assert_eq!(reply.warnings.len(), 1);
        assert!(reply.text().starts_with(&reply.warnings[0]));
        assert!(orch.history("u1").is_empty());
    }

    #[tokio::test]
    async fn test_history_length_stays_even() {
        let backend = ScriptedBackend::replying(vec![
            Ok("a".to_string()),
            Err(InferenceError::Timeout { duration_secs: 30 }),
            Ok("b".to_string()),
            Err(InferenceError::Status { status: 404 }),
            Ok("c".to_string()),
        ]);
        let orch = orchestrator(backend);

        for i in 0..5 {
            let params = RequestParameters::new(format!("q{i}")).with_preserve_history(true);
            orch.handle("u1", params).await.unwrap();
            assert_eq!(orch.history("u1").len() % 2, 0);
        }
        assert_eq!(orch.history("u1").len(), 6);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let backend = ScriptedBackend::replying(vec![]);
        let orch = orchestrator(backend);

        assert!(!orch.clear_history("u1").await);

        orch.handle("u1", RequestParameters::new("Hello!").with_preserve_history(true))
            .await
            .unwrap();
        assert!(orch.clear_history("u1").await);
        assert!(orch.history("u1").is_empty());
    }

    #[tokio::test]
    async fn test_same_user_requests_serialize() {
        let backend = Arc::new(ScriptedBackend {
            delay: Some(Duration::from_millis(50)),
            ..ScriptedBackend::default()
        });
        let orch = Arc::new(orchestrator(backend.clone()));

        let a = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.handle("u1", RequestParameters::new("first").with_preserve_history(true))
                    .await
            })
        };
        let b = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.handle("u1", RequestParameters::new("second").with_preserve_history(true))
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let turns = orch.history("u1");
        assert_eq!(turns.len(), 4);
        for (i, turn) in turns.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(turn.role, expected);
        }

        // Whichever ran second saw the other's exchange in its transcript.
        let calls = backend.calls();
        let later = &calls[1].prompt;
        let earlier_prompt = &turns[0].text;
        assert!(later.contains(&format!("User: {earlier_prompt}\nAssistant: default reply")));
    }

    #[tokio::test]
    async fn test_different_users_do_not_share_history() {
        let backend = ScriptedBackend::replying(vec![]);
        let orch = orchestrator(backend.clone());

        let alice = orch.handle("alice", RequestParameters::new("a?").with_preserve_history(true));
        let bob = orch.handle("bob", RequestParameters::new("b?").with_preserve_history(true));
        let (ra, rb) = tokio::join!(alice, bob);
        ra.unwrap();
        rb.unwrap();

        assert_eq!(orch.history("alice")[0].text, "a?");
        assert_eq!(orch.history("bob")[0].text, "b?");
        for call in backend.calls() {
            assert!(!(call.prompt.contains("a?") && call.prompt.contains("b?")));
        }
    }

    fn guard_count(orch: &ConversationOrchestrator) -> usize {
        orch.user_guards.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_clear_for_unknown_users_keeps_no_guards() {
        let orch = orchestrator(ScriptedBackend::replying(vec![]));

        for i in 0..100 {
            assert!(!orch.clear_history(&format!("stranger-{i}")).await);
        }
        assert_eq!(guard_count(&orch), 0);
    }

    #[tokio::test]
    async fn test_guards_released_after_requests() {
        let backend = ScriptedBackend::replying(vec![
            Ok("ok".to_string()),
            Err(InferenceError::Status { status: 500 }),
        ]);
        let orch = orchestrator(backend);
        let params = |p: &str| RequestParameters::new(p).with_preserve_history(true);

        orch.handle("u1", params("one")).await.unwrap();
        orch.handle("u2", params("two")).await.unwrap();
        assert!(orch.clear_history("u1").await);
        assert_eq!(guard_count(&orch), 0);
    }

    #[test]
    fn test_error_messages() {
        assert!(error_message(&InferenceError::Status { status: 404 }).contains("404"));
        assert!(error_message(&InferenceError::Timeout { duration_secs: 30 }).contains("30s"));
        let transport = error_message(&InferenceError::Transport {
            endpoint: "http://x".into(),
            reason: "dns failure".into(),
        });
        assert!(transport.contains("dns failure"));
    }
}
