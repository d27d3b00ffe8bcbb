use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::info;
use tracing::warn;

use gauntlet_config::ConsensusMode;
use gauntlet_config::CouncilConfig;
use gauntlet_config::LlmConfig;
use gauntlet_config::ResilienceConfig;
use gauntlet_protocol::CouncilEvent;
use gauntlet_protocol::CouncilVote;
use gauntlet_protocol::Verdict;
use gauntlet_store::retry::RetryPolicy;
use gauntlet_store::retry::with_backoff;

use crate::transport::ModelTransport;
use crate::verdict::parse_verdict;

/// Judge reasoning is truncated to this many characters before it is
/// embedded in the chairman prompt.
const CHAIRMAN_REASONING_MAX: usize = 800;

/// The original question is previewed at most this long in the
/// chairman prompt.
const CHAIRMAN_QUESTION_MAX: usize = 3000;

/// Final outcome of a council run, with each judge's original vote.
#[derive(Debug, Clone, PartialEq)]
pub struct CouncilOutcome {
    pub passed: bool,
    pub votes: Vec<CouncilVote>,
}

struct CouncilState {
    config: CouncilConfig,
    transport: Arc<dyn ModelTransport>,
    retry: RetryPolicy,
    max_tokens: u32,
    chairman_max_tokens: u32,
}

/// Multi-model consensus runner. Cheap to clone; shared state sits
/// behind an `Arc`.
#[derive(Clone)]
pub struct Council {
    state: Arc<CouncilState>,
}

impl Council {
    pub fn new(
        config: CouncilConfig,
        llm: &LlmConfig,
        resilience: &ResilienceConfig,
        transport: Arc<dyn ModelTransport>,
    ) -> Self {
        Self {
            state: Arc::new(CouncilState {
                config,
                transport,
                retry: retry_policy(resilience),
                max_tokens: llm.max_tokens,
                chairman_max_tokens: llm.chairman_max_tokens,
            }),
        }
    }

    /// True when a run would actually consult judges.
    pub fn is_active(&self) -> bool {
        !self.state.config.enabled_models().is_empty() && self.state.transport.is_configured()
    }

    /// Run the council: every enabled judge votes, then the configured
    /// consensus decides. Judge failures become `unclear` votes.
    pub async fn run(&self, prompt: &str, rule_id: &str) -> CouncilOutcome {
        let state = &self.state;
        let models = state.config.enabled_models();
        if models.is_empty() || !state.transport.is_configured() {
            warn!("council: no usable judges — treating rule `{rule_id}` as pass");
            return CouncilOutcome {
                passed: true,
                votes: Vec::new(),
            };
        }

        let mut votes: Vec<CouncilVote> = Vec::with_capacity(models.len());
        let mut responses: Vec<String> = Vec::with_capacity(models.len());
        for model in &models {
            let call = with_backoff(&state.retry, &format!("council judge {model}"), || {
                state.transport.complete(prompt, model, state.max_tokens)
            })
            .await;
            match call {
                Ok(text) => {
                    let verdict = parse_verdict(&text);
                    votes.push(CouncilVote {
                        model: model.clone(),
                        verdict,
                    });
                    responses.push(text);
                }
                Err(err) => {
                    warn!("council judge {model} failed for rule {rule_id}: {err}");
                    votes.push(CouncilVote {
                        model: model.clone(),
                        verdict: Verdict::Unclear,
                    });
                    responses.push(String::new());
                }
            }
        }

        let passed = match state.config.consensus {
            ConsensusMode::Chairman if state.config.chairman_model.is_some() => {
                let (passed, _rationale) = self.chairman_decision(prompt, rule_id, &votes, &responses).await;
                passed
            }
            ConsensusMode::Unanimity => unanimous(&votes),
            _ => majority(&votes),
        };
        info!(
            "council {rule_id}: {:?} (pass={} fail={} unclear={}) -> {passed}",
            state.config.consensus,
            count(&votes, Verdict::Pass),
            count(&votes, Verdict::Fail),
            count(&votes, Verdict::Unclear),
        );
        CouncilOutcome { passed, votes }
    }

    /// Streaming variant: judges run in order and their tokens are
    /// forwarded as they arrive. The receiver sees the event sequence
    /// documented on [`CouncilEvent`].
    pub fn run_streaming(&self, prompt: &str, rule_id: &str) -> mpsc::Receiver<CouncilEvent> {
        let (tx, rx) = mpsc::channel(256);
        let council = self.clone();
        let prompt = prompt.to_string();
        let rule_id = rule_id.to_string();
        tokio::spawn(async move {
            council.stream_inner(&prompt, &rule_id, tx).await;
        });
        rx
    }

    async fn stream_inner(&self, prompt: &str, rule_id: &str, tx: mpsc::Sender<CouncilEvent>) {
        let state = &self.state;
        let models = state.config.enabled_models();
        if models.is_empty() || !state.transport.is_configured() {
            warn!("council: no usable judges — treating rule `{rule_id}` as pass");
            let _ = tx
                .send(CouncilEvent::Complete {
                    passed: true,
                    votes: Vec::new(),
                })
                .await;
            return;
        }

        let _ = tx
            .send(CouncilEvent::Prompt {
                text: prompt.to_string(),
            })
            .await;

        let mut votes: Vec<CouncilVote> = Vec::with_capacity(models.len());
        let mut responses: Vec<String> = Vec::with_capacity(models.len());
        for model in &models {
            let _ = tx
                .send(CouncilEvent::ModelStart {
                    model: model.clone(),
                })
                .await;
            let mut full_text = String::new();
            let mut had_error = false;
            match state.transport.stream(prompt, model, state.max_tokens).await {
                Ok(mut stream) => {
                    while let Some(chunk) = stream.next().await {
                        match chunk {
                            Ok(text) => {
                                full_text.push_str(&text);
                                let _ = tx
                                    .send(CouncilEvent::ModelChunk {
                                        model: model.clone(),
                                        text,
                                    })
                                    .await;
                            }
                            Err(err) => {
                                warn!("council judge {model} stream error for rule {rule_id}: {err}");
                                let _ = tx
                                    .send(CouncilEvent::ModelChunk {
                                        model: model.clone(),
                                        text: format!("[Error: {err}]"),
                                    })
                                    .await;
                                had_error = true;
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!("council judge {model} failed for rule {rule_id}: {err}");
                    let _ = tx
                        .send(CouncilEvent::ModelChunk {
                            model: model.clone(),
                            text: format!("[Error: {err}]"),
                        })
                        .await;
                    had_error = true;
                }
            }
            let verdict = if had_error {
                Verdict::Unclear
            } else {
                parse_verdict(&full_text)
            };
            votes.push(CouncilVote {
                model: model.clone(),
                verdict,
            });
            let _ = tx
                .send(CouncilEvent::ModelVerdict {
                    model: model.clone(),
                    verdict,
                    full_text: full_text.clone(),
                })
                .await;
            responses.push(full_text);
        }

        if state.config.consensus == ConsensusMode::Chairman
            && let Some(chairman) = state.config.chairman_model.clone()
        {
            let _ = tx
                .send(CouncilEvent::ChairmanStart {
                    model: chairman.clone(),
                })
                .await;
            let (passed, rationale) = self.chairman_decision(prompt, rule_id, &votes, &responses).await;
            let _ = tx
                .send(CouncilEvent::ChairmanVerdict { passed, rationale })
                .await;
            let _ = tx.send(CouncilEvent::Complete { passed, votes }).await;
            return;
        }

        let passed = match state.config.consensus {
            ConsensusMode::Unanimity => unanimous(&votes),
            _ => majority(&votes),
        };
        info!(
            "council {rule_id}: {:?} (pass={} fail={}) -> {passed}",
            state.config.consensus,
            count(&votes, Verdict::Pass),
            count(&votes, Verdict::Fail),
        );
        let _ = tx.send(CouncilEvent::Complete { passed, votes }).await;
    }

    /// Ask the chairman to synthesise the judges' votes and reasoning.
    /// Falls back to a majority of the original votes when the chairman
    /// errors out.
    async fn chairman_decision(
        &self,
        prompt: &str,
        rule_id: &str,
        votes: &[CouncilVote],
        responses: &[String],
    ) -> (bool, String) {
        let state = &self.state;
        let Some(chairman) = state.config.chairman_model.clone() else {
            return (majority(votes), String::new());
        };
        let chairman_prompt = build_chairman_prompt(prompt, votes, responses);
        let call = with_backoff(&state.retry, &format!("council chairman {chairman}"), || {
            state
                .transport
                .complete(&chairman_prompt, &chairman, state.chairman_max_tokens)
        })
        .await;
        match call {
            Ok(text) => {
                let passed = parse_verdict(&text) == Verdict::Pass;
                info!("council {rule_id}: chairman {chairman} -> {passed}");
                (passed, text.trim().to_string())
            }
            Err(err) => {
                warn!("council chairman {chairman} failed for rule {rule_id}: {err}");
                (majority(votes), String::new())
            }
        }
    }
}

fn retry_policy(resilience: &ResilienceConfig) -> RetryPolicy {
    RetryPolicy {
        attempts: resilience.retry_attempts,
        base_delay: Duration::from_secs_f64(resilience.retry_base_delay),
        max_delay: Duration::from_secs_f64(resilience.retry_max_delay),
        backoff_factor: resilience.retry_backoff_factor,
    }
}

fn count(votes: &[CouncilVote], verdict: Verdict) -> usize {
    votes.iter().filter(|v| v.verdict == verdict).count()
}

/// Pass iff strictly more pass than fail votes; unclears do not count.
fn majority(votes: &[CouncilVote]) -> bool {
    count(votes, Verdict::Pass) > count(votes, Verdict::Fail)
}

/// Pass iff every judge voted pass.
fn unanimous(votes: &[CouncilVote]) -> bool {
    !votes.is_empty() && count(votes, Verdict::Pass) == votes.len()
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

/// The synthesis prompt: original question plus each judge's labelled
/// vote and (truncated) reasoning.
fn build_chairman_prompt(original: &str, votes: &[CouncilVote], responses: &[String]) -> String {
    let mut lines = vec![
        "You are the chairman. The following question was evaluated by a council of models. Here are their votes and reasoning.".to_string(),
        String::new(),
        "QUESTION:".to_string(),
        truncate_chars(original, CHAIRMAN_QUESTION_MAX),
        String::new(),
        "COUNCIL VOTES AND REASONING:".to_string(),
    ];
    for (vote, response) in votes.iter().zip(responses.iter()) {
        lines.push(format!("--- Model: {} ---", vote.model));
        lines.push(format!("Vote: {}", vote.verdict.label()));
        lines.push(format!(
            "Reasoning: {}",
            truncate_chars(response.trim(), CHAIRMAN_REASONING_MAX)
        ));
        lines.push(String::new());
    }
    lines.push(
        "Synthesize the above and decide the final outcome. Output your brief reasoning, then on a new line exactly: PASS or FAIL.".to_string(),
    );
    lines.push("Your final line must be only PASS or FAIL.".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;
    use pretty_assertions::assert_eq;

    fn council_config(models: &[&str], consensus: ConsensusMode, chairman: Option<&str>) -> CouncilConfig {
        serde_json::from_value(serde_json::json!({
            "models": models,
            "consensus": match consensus {
                ConsensusMode::Majority => "majority",
                ConsensusMode::Unanimity => "unanimity",
                ConsensusMode::Chairman => "chairman",
            },
            "chairman_model": chairman,
        }))
        .unwrap()
    }

    fn council(config: CouncilConfig, transport: ScriptedTransport) -> Council {
        Council::new(
            config,
            &LlmConfig::default(),
            &ResilienceConfig {
                retry_attempts: 1,
                retry_base_delay: 0.001,
                retry_max_delay: 0.002,
                retry_backoff_factor: 2.0,
            },
            Arc::new(transport),
        )
    }

    async fn drain(mut rx: mpsc::Receiver<CouncilEvent>) -> Vec<CouncilEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn majority_passes_two_to_one() {
        let transport = ScriptedTransport::new()
            .with_response("a", "fine\nPASS")
            .with_response("b", "not fine\nFAIL")
            .with_response("c", "fine\nPASS");
        let outcome = council(
            council_config(&["a", "b", "c"], ConsensusMode::Majority, None),
            transport,
        )
        .run("q", "rule")
        .await;
        assert!(outcome.passed);
        assert_eq!(outcome.votes.len(), 3);
    }

    #[tokio::test]
    async fn unanimity_rejects_any_unclear() {
        let transport = ScriptedTransport::new()
            .with_response("a", "PASS")
            .with_response("b", "no idea, shrug");
        let outcome = council(
            council_config(&["a", "b"], ConsensusMode::Unanimity, None),
            transport,
        )
        .run("q", "rule")
        .await;
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn failed_judge_votes_unclear() {
        let transport = ScriptedTransport::new()
            .with_response("a", "PASS")
            .with_failure("b", "502 bad gateway")
            .with_response("c", "PASS");
        let outcome = council(
            council_config(&["a", "b", "c"], ConsensusMode::Majority, None),
            transport,
        )
        .run("q", "rule")
        .await;
        assert!(outcome.passed);
        assert_eq!(outcome.votes[1].verdict, Verdict::Unclear);
    }

    #[tokio::test]
    async fn chairman_verdict_overrides_majority() {
        // A and C vote PASS, B votes FAIL; the chairman still fails it.
        let transport = ScriptedTransport::new()
            .with_response("a", "strong response\nPASS")
            .with_response("b", "misses C2\nFAIL")
            .with_response("c", "acceptable\nPASS")
            .with_response("d", "B is right about C2.\nFAIL");
        let outcome = council(
            council_config(&["a", "b", "c"], ConsensusMode::Chairman, Some("d")),
            transport,
        )
        .run("q", "rule")
        .await;
        assert!(!outcome.passed);
        // The judges' own votes are preserved.
        assert_eq!(
            outcome
                .votes
                .iter()
                .map(|v| v.verdict)
                .collect::<Vec<_>>(),
            [Verdict::Pass, Verdict::Fail, Verdict::Pass]
        );
    }

    #[tokio::test]
    async fn chairman_error_falls_back_to_majority() {
        let transport = ScriptedTransport::new()
            .with_response("a", "PASS")
            .with_response("b", "PASS")
            .with_response("c", "FAIL")
            .with_failure("d", "timeout");
        let outcome = council(
            council_config(&["a", "b", "c"], ConsensusMode::Chairman, Some("d")),
            transport,
        )
        .run("q", "rule")
        .await;
        assert!(outcome.passed);
    }

    #[tokio::test]
    async fn empty_council_passes() {
        let outcome = council(
            council_config(&[], ConsensusMode::Majority, None),
            ScriptedTransport::new(),
        )
        .run("q", "rule")
        .await;
        assert!(outcome.passed);
        assert!(outcome.votes.is_empty());
    }

    #[tokio::test]
    async fn streaming_event_order_with_chairman() {
        let transport = ScriptedTransport::new()
            .with_response("a", "good\nPASS")
            .with_response("b", "bad\nFAIL")
            .with_response("c", "good\nPASS")
            .with_response("d", "synthesis\nFAIL");
        let rx = council(
            council_config(&["a", "b", "c"], ConsensusMode::Chairman, Some("d")),
            transport,
        )
        .run_streaming("the question", "rule");
        let events = drain(rx).await;

        assert!(matches!(&events[0], CouncilEvent::Prompt { text } if text == "the question"));
        assert!(matches!(&events[1], CouncilEvent::ModelStart { model } if model == "a"));

        let verdicts: Vec<&CouncilEvent> = events
            .iter()
            .filter(|e| matches!(e, CouncilEvent::ModelVerdict { .. }))
            .collect();
        assert_eq!(verdicts.len(), 3);

        let chairman_verdict = events
            .iter()
            .find(|e| matches!(e, CouncilEvent::ChairmanVerdict { .. }))
            .unwrap();
        assert!(
            matches!(chairman_verdict, CouncilEvent::ChairmanVerdict { passed: false, rationale } if rationale.contains("synthesis"))
        );

        match events.last().unwrap() {
            CouncilEvent::Complete { passed, votes } => {
                assert!(!*passed);
                assert_eq!(votes.len(), 3);
                assert_eq!(votes[0].verdict, Verdict::Pass);
                assert_eq!(votes[1].verdict, Verdict::Fail);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn streaming_chunks_accumulate_into_full_text() {
        let transport = ScriptedTransport::new().with_response("a", "line one\nline two\nPASS");
        let rx = council(
            council_config(&["a"], ConsensusMode::Majority, None),
            transport,
        )
        .run_streaming("q", "rule");
        let events = drain(rx).await;
        let full = events.iter().find_map(|e| match e {
            CouncilEvent::ModelVerdict { full_text, .. } => Some(full_text.clone()),
            _ => None,
        });
        assert_eq!(full.unwrap(), "line one\nline two\nPASS");
    }
}
