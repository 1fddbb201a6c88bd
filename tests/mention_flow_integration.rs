//! Integration tests from a channel member's perspective.
//!
//! These tests exercise the full mention flow without a live Slack
//! workspace or completion endpoint: a recording surface stands in for the
//! Web API and a scripted backend stands in for the model. They verify the
//! journeys a user would hit: asking for help, persisting channel
//! defaults, layering option tiers, watching a streamed answer build up,
//! and reading the diagnostics posted when something fails.
//!
//! Run: `cargo test --test mention_flow_integration`

mod support {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::stream;

    use chatrelay::channels::{
        CoalescerConfig, MentionEvent, MessageHandle, MessageSurface, ReplyTarget,
    };
    use chatrelay::error::{LlmError, SurfaceError};
    use chatrelay::llm::{
        CompletionBackend, CompletionRequest, CredentialTable, EndpointAuth, FragmentStream,
    };
    use chatrelay::options::OptionsPatch;
    use chatrelay::orchestrator::Orchestrator;
    use chatrelay::store::ChannelOptionStore;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SurfaceOp {
        Create { text: String, broadcast: bool },
        Replace { text: String },
    }

    /// Stand-in for the Slack Web API that records every edit.
    #[derive(Default)]
    pub struct RecordingSurface {
        ops: Mutex<Vec<SurfaceOp>>,
    }

    impl RecordingSurface {
        pub fn ops(&self) -> Vec<SurfaceOp> {
            self.ops.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSurface for RecordingSurface {
        async fn create(
            &self,
            _target: &ReplyTarget,
            text: &str,
            broadcast: bool,
        ) -> Result<MessageHandle, SurfaceError> {
            self.ops.lock().unwrap().push(SurfaceOp::Create {
                text: text.to_string(),
                broadcast,
            });
            Ok(MessageHandle("1700000000.000100".to_string()))
        }

        async fn replace(
            &self,
            _target: &ReplyTarget,
            _handle: &MessageHandle,
            text: &str,
        ) -> Result<(), SurfaceError> {
            self.ops.lock().unwrap().push(SurfaceOp::Replace {
                text: text.to_string(),
            });
            Ok(())
        }
    }

    type Script = Result<Vec<Result<String, LlmError>>, LlmError>;

    /// Stand-in for the completions endpoint. Each `open_stream` call
    /// consumes the next queued script.
    #[derive(Default)]
    pub struct ScriptedBackend {
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<(String, CompletionRequest)>>,
    }

    impl ScriptedBackend {
        pub fn push_stream(&self, parts: &[&str]) {
            let items = parts.iter().map(|p| Ok(p.to_string())).collect();
            self.scripts.lock().unwrap().push_back(Ok(items));
        }

        pub fn push_failing_stream(&self, parts: &[&str], error: LlmError) {
            let mut items: Vec<Result<String, LlmError>> =
                parts.iter().map(|p| Ok(p.to_string())).collect();
            items.push(Err(error));
            self.scripts.lock().unwrap().push_back(Ok(items));
        }

        pub fn push_refusal(&self, error: LlmError) {
            self.scripts.lock().unwrap().push_back(Err(error));
        }

        pub fn requests(&self) -> Vec<(String, CompletionRequest)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn open_stream(
            &self,
            base_url: &str,
            _auth: &EndpointAuth,
            request: CompletionRequest,
        ) -> Result<FragmentStream, LlmError> {
            self.requests
                .lock()
                .unwrap()
                .push((base_url.to_string(), request));
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted stream queued");
            match script {
                Ok(items) => Ok(Box::pin(stream::iter(items))),
                Err(error) => Err(error),
            }
        }
    }

    pub struct Harness {
        pub surface: Arc<RecordingSurface>,
        pub backend: Arc<ScriptedBackend>,
        pub store: ChannelOptionStore,
        pub orchestrator: Orchestrator,
    }

    pub async fn harness(process: OptionsPatch) -> Harness {
        harness_with(process, CredentialTable::default()).await
    }

    pub async fn harness_with(process: OptionsPatch, credentials: CredentialTable) -> Harness {
        let surface = Arc::new(RecordingSurface::default());
        let backend = Arc::new(ScriptedBackend::default());
        let store = ChannelOptionStore::in_memory().await.unwrap();
        let orchestrator = Orchestrator::new(
            surface.clone(),
            backend.clone(),
            store.clone(),
            process,
            credentials,
            CoalescerConfig {
                progress_marker: ":keyboard:".to_string(),
                // Instantaneous test fragments must never cross the flush
                // window, keeping edit sequences deterministic.
                flush_interval: Duration::from_secs(3600),
            },
        );
        Harness {
            surface,
            backend,
            store,
            orchestrator,
        }
    }

    pub fn process_defaults() -> OptionsPatch {
        OptionsPatch {
            base_url: Some("http://localhost:8000/v1".to_string()),
            model: Some("llama-3.1-8b".to_string()),
            ..OptionsPatch::default()
        }
    }

    pub fn mention(text: &str) -> MentionEvent {
        MentionEvent {
            channel: "C1".to_string(),
            ts: "1700000000.000001".to_string(),
            text: text.to_string(),
        }
    }
}

// ============================================================================
// 1. Help & Usage Journey
// ============================================================================
mod help_and_usage {
    use crate::support::{SurfaceOp, harness, mention, process_defaults};
    use chatrelay::options::schema;

    #[tokio::test]
    async fn test_bare_mention_gets_usage_in_thread_only() {
        let h = harness(process_defaults()).await;
        h.orchestrator.handle_mention(mention("<@U0BOT>")).await;

        let ops = h.surface.ops();
        assert_eq!(ops.len(), 1, "exactly one reply: {ops:?}");
        match &ops[0] {
            SurfaceOp::Create { text, broadcast } => {
                assert!(text.contains("Usage:"));
                assert!(!broadcast, "usage reply must not broadcast");
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert!(h.backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_usage_lists_every_option_flag() {
        let h = harness(process_defaults()).await;
        h.orchestrator.handle_mention(mention("<@U0BOT>")).await;

        let ops = h.surface.ops();
        let SurfaceOp::Create { text, .. } = &ops[0] else {
            panic!("expected a created reply");
        };
        for spec in schema::FIELDS {
            assert!(text.contains(spec.flag), "usage is missing {}", spec.flag);
        }
        assert!(text.contains("--set-as-channel-defaults"));
    }

    #[tokio::test]
    async fn test_malformed_mention_gets_error_description() {
        let h = harness(process_defaults()).await;
        h.orchestrator
            .handle_mention(mention("<@U0BOT> --temperature"))
            .await;

        let ops = h.surface.ops();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            SurfaceOp::Create { text, broadcast } => {
                assert!(text.contains("--temperature"));
                assert!(text.contains("missing its value"));
                assert!(!broadcast);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }
}

// ============================================================================
// 2. Channel Defaults Journey
// ============================================================================
mod channel_defaults {
    use chatrelay::options::OptionsPatch;
    use pretty_assertions::assert_eq;

    use crate::support::{SurfaceOp, harness, mention, process_defaults};

    #[tokio::test]
    async fn test_set_defaults_persists_and_broadcasts_snapshot() {
        let h = harness(process_defaults()).await;
        h.orchestrator
            .handle_mention(mention(
                "<@U0BOT> --temperature 0.25 --set-as-channel-defaults",
            ))
            .await;

        let stored = h.store.get("C1").await.unwrap();
        assert_eq!(stored.temperature, Some(0.25));
        assert_eq!(stored.base_url.as_deref(), Some("http://localhost:8000/v1"));
        assert_eq!(stored.model.as_deref(), Some("llama-3.1-8b"));

        let ops = h.surface.ops();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            SurfaceOp::Create { text, broadcast } => {
                assert!(text.contains("\"temperature\":0.25"), "got {text}");
                assert!(*broadcast, "defaults confirmation is channel-visible");
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_set_defaults_keeps_earlier_fields() {
        let h = harness(process_defaults()).await;
        h.orchestrator
            .handle_mention(mention(
                "<@U0BOT> --temperature 0.25 --set-as-channel-defaults",
            ))
            .await;
        h.orchestrator
            .handle_mention(mention("<@U0BOT> --top-p 0.5 --set-as-channel-defaults"))
            .await;

        let stored = h.store.get("C1").await.unwrap();
        assert_eq!(stored.temperature, Some(0.25), "earlier default survives");
        assert_eq!(stored.top_p, Some(0.5));
    }

    #[tokio::test]
    async fn test_set_defaults_needs_a_resolvable_record() {
        // Without a base_url or model on any tier there is no full record
        // to persist, so nothing is written.
        let h = harness(OptionsPatch::default()).await;
        h.orchestrator
            .handle_mention(mention(
                "<@U0BOT> --temperature 0.25 --set-as-channel-defaults",
            ))
            .await;

        assert!(h.store.get("C1").await.unwrap().is_empty());
        let ops = h.surface.ops();
        match &ops[0] {
            SurfaceOp::Create { text, broadcast } => {
                assert!(text.contains("base_url"));
                assert!(!broadcast);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_defaults_are_scoped_to_their_channel() {
        let h = harness(process_defaults()).await;
        h.orchestrator
            .handle_mention(mention(
                "<@U0BOT> --temperature 0.25 --set-as-channel-defaults",
            ))
            .await;

        assert!(h.store.get("C2").await.unwrap().is_empty());
    }
}

// ============================================================================
// 3. Option Precedence Journey
// ============================================================================
mod option_precedence {
    use chatrelay::options::OptionsPatch;
    use pretty_assertions::assert_eq;

    use crate::support::{harness, mention, process_defaults};

    #[tokio::test]
    async fn test_tiers_layer_request_over_channel_over_process() {
        let process = OptionsPatch {
            temperature: Some(0.2),
            ..process_defaults()
        };
        let h = harness(process).await;

        // Only the process tier supplies a temperature.
        h.backend.push_stream(&["ok"]);
        h.orchestrator.handle_mention(mention("<@U0BOT> one")).await;

        // The channel persists its own default, which now wins.
        h.store
            .upsert(
                "C1",
                &OptionsPatch {
                    temperature: Some(0.9),
                    ..OptionsPatch::default()
                },
            )
            .await
            .unwrap();
        h.backend.push_stream(&["ok"]);
        h.orchestrator.handle_mention(mention("<@U0BOT> two")).await;

        // An inline override beats them all for this one request.
        h.backend.push_stream(&["ok"]);
        h.orchestrator
            .handle_mention(mention("<@U0BOT> --temperature 0.4 three"))
            .await;

        let temperatures: Vec<f64> = h
            .backend
            .requests()
            .iter()
            .map(|(_, request)| request.temperature)
            .collect();
        assert_eq!(temperatures, [0.2, 0.9, 0.4]);
    }

    #[tokio::test]
    async fn test_inline_override_does_not_persist() {
        let h = harness(process_defaults()).await;
        h.backend.push_stream(&["ok"]);
        h.orchestrator
            .handle_mention(mention("<@U0BOT> --temperature 0.4 once"))
            .await;

        assert!(h.store.get("C1").await.unwrap().is_empty());

        h.backend.push_stream(&["ok"]);
        h.orchestrator.handle_mention(mention("<@U0BOT> again")).await;
        let requests = h.backend.requests();
        assert_eq!(requests[1].1.temperature, 1.0, "built-in default returns");
    }

    #[tokio::test]
    async fn test_request_carries_resolved_fields_to_backend() {
        let h = harness(process_defaults()).await;
        h.backend.push_stream(&["ok"]);
        h.orchestrator
            .handle_mention(mention("<@U0BOT> --role system --top-p 0.3 question"))
            .await;

        let requests = h.backend.requests();
        let (base_url, request) = &requests[0];
        assert_eq!(base_url, "http://localhost:8000/v1");
        assert_eq!(request.model, "llama-3.1-8b");
        assert_eq!(request.role, "system");
        assert_eq!(request.top_p, 0.3);
        assert_eq!(request.content, "question");
    }
}

// ============================================================================
// 4. Streaming Reply Journey
// ============================================================================
mod streaming_reply {
    use pretty_assertions::assert_eq;

    use crate::support::{SurfaceOp, harness, mention, process_defaults};

    #[tokio::test]
    async fn test_answer_builds_up_then_loses_the_marker() {
        let h = harness(process_defaults()).await;
        h.backend.push_stream(&["The ", "answer ", "is ", "42."]);
        h.orchestrator
            .handle_mention(mention("<@U0BOT> the question"))
            .await;

        let ops = h.surface.ops();
        assert_eq!(
            ops.first(),
            Some(&SurfaceOp::Create {
                text: "The :keyboard:".to_string(),
                broadcast: true,
            })
        );
        assert_eq!(
            ops.last(),
            Some(&SurfaceOp::Replace {
                text: "The answer is 42.".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_resolved_broadcast_false_applies_to_the_reply() {
        let h = harness(process_defaults()).await;
        h.backend.push_stream(&["quiet"]);
        h.orchestrator
            .handle_mention(mention("<@U0BOT> --broadcast-reply false shh"))
            .await;

        match &h.surface.ops()[0] {
            SurfaceOp::Create { broadcast, .. } => assert!(!broadcast),
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_production_leaves_a_placeholder() {
        let h = harness(process_defaults()).await;
        h.backend.push_stream(&[]);
        h.orchestrator
            .handle_mention(mention("<@U0BOT> anybody home"))
            .await;

        assert_eq!(
            h.surface.ops(),
            vec![SurfaceOp::Create {
                text: "(no response content)".to_string(),
                broadcast: false,
            }]
        );
    }
}

// ============================================================================
// 5. Failure Reporting Journey
// ============================================================================
mod failure_reporting {
    use chatrelay::error::LlmError;
    use chatrelay::llm::CredentialTable;
    use pretty_assertions::assert_eq;

    use crate::support::{SurfaceOp, harness, harness_with, mention, process_defaults};

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_partial_output_visible() {
        let h = harness(process_defaults()).await;
        h.backend.push_failing_stream(
            &["Par", "tial"],
            LlmError::RequestFailed {
                endpoint: "http://localhost:8000/v1".to_string(),
                reason: "connection reset".to_string(),
            },
        );
        h.orchestrator.handle_mention(mention("<@U0BOT> go")).await;

        let ops = h.surface.ops();
        assert_eq!(ops.len(), 3, "create, partial flush, diagnostic: {ops:?}");
        assert_eq!(
            ops[1],
            SurfaceOp::Replace {
                text: "Partial".to_string(),
            },
            "partial output must stay visible"
        );
        match &ops[2] {
            SurfaceOp::Create { text, broadcast } => {
                assert!(text.contains("connection reset"));
                assert!(!broadcast);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refused_stream_gets_one_diagnostic_and_no_streaming_message() {
        let h = harness(process_defaults()).await;
        h.backend.push_refusal(LlmError::RateLimited {
            endpoint: "http://localhost:8000/v1".to_string(),
        });
        h.orchestrator.handle_mention(mention("<@U0BOT> go")).await;

        let ops = h.surface.ops();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            SurfaceOp::Create { text, broadcast } => {
                assert!(text.contains("rate limited"));
                assert!(!broadcast);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_credential_names_the_env_var() {
        let credentials = CredentialTable::new([(
            "http://localhost:8000/v1".to_string(),
            "CHATRELAY_TEST_NO_SUCH_KEY".to_string(),
        )]);
        let h = harness_with(process_defaults(), credentials).await;
        h.orchestrator.handle_mention(mention("<@U0BOT> go")).await;

        let ops = h.surface.ops();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            SurfaceOp::Create { text, broadcast } => {
                assert!(text.contains("CHATRELAY_TEST_NO_SUCH_KEY"));
                assert!(!broadcast);
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert!(
            h.backend.requests().is_empty(),
            "no request without a credential"
        );
    }

    #[tokio::test]
    async fn test_unresolvable_endpoint_is_reported_before_any_request() {
        let h = harness(chatrelay::options::OptionsPatch::default()).await;
        h.orchestrator.handle_mention(mention("<@U0BOT> go")).await;

        assert!(h.backend.requests().is_empty());
        match &h.surface.ops()[0] {
            SurfaceOp::Create { text, broadcast } => {
                assert!(text.contains("base_url"));
                assert!(!broadcast);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }
}
