//! # Live Stages
//!
//! Each live stage is one chat-completions call against an OpenAI-compatible
//! endpoint. Token usage comes from the response `usage` block.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{PlannerError, Result};
use crate::models::{AgentMetrics, ModelConfig, Pricing};
use crate::plan::parse_plan_proposal;
use crate::workflow::StageId;

use super::prompts;
use super::{Stage, StageExtras, StageInput, StageResult};

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Reply text plus the token usage the endpoint reported
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
}

/// Minimal OpenAI-compatible chat-completions client
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    config: ModelConfig,
}

impl ChatClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        if !config.has_credentials() {
            return Err(PlannerError::LiveModeUnavailable);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PlannerError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Send one system + user exchange
    pub async fn complete(&self, system: &str, user: &str) -> anyhow::Result<Completion> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(&body)
            .send()
            .await
            .context("chat completions request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(anyhow!("chat completions returned {}: {}", status, text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .context("failed to parse chat completions response")?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("chat completions response had no content"))?;

        Ok(Completion {
            text,
            usage: parsed.usage,
        })
    }
}

/// Rough token estimate for replies without a usage block
fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64 * 2
}

/// A stage backed by the chat-completions endpoint
pub struct LiveStage {
    id: StageId,
    client: Arc<ChatClient>,
    pricing: Pricing,
}

impl LiveStage {
    pub fn new(id: StageId, client: Arc<ChatClient>, pricing: Pricing) -> Self {
        Self {
            id,
            client,
            pricing,
        }
    }

    fn user_prompt(&self, input: &StageInput) -> String {
        let req = &input.request;
        match self.id {
            StageId::DataAnalyst => format!(
                "Compile shipment, fleet, historical volume, route and crew data for the {} hub \
                 for {} to {} ({} days).",
                req.hub,
                req.date_from,
                req.date_to,
                req.days()
            ),
            StageId::CapacityCalc => format!(
                "Calculate capacity requirements for the {} hub from this data:\n\n{}",
                req.hub,
                input.context()
            ),
            StageId::DocResearcher => format!(
                "Research the policies and regulations that apply to these calculations:\n\n{}",
                input.context()
            ),
            StageId::Planner => format!(
                "Create the capacity plan for the {} hub, {} to {}, from these inputs:\n\n{}",
                req.hub,
                req.date_from,
                req.date_to,
                input.context()
            ),
        }
    }
}

#[async_trait]
impl Stage for LiveStage {
    fn id(&self) -> StageId {
        self.id
    }

    #[tracing::instrument(name = "stage", skip_all, fields(stage = %self.id, mode = "live"))]
    async fn run(&self, input: &StageInput) -> anyhow::Result<StageResult> {
        let system = prompts::system_prompt(self.id);
        let user = self.user_prompt(input);

        let started = Instant::now();
        let completion = self
            .client
            .complete(&system, &user)
            .await
            .with_context(|| format!("{} stage failed", self.id.display_name()))?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (input_tokens, output_tokens) = match completion.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => {
                tracing::debug!("no usage block, estimating tokens");
                (
                    estimate_tokens(&system) + estimate_tokens(&user),
                    estimate_tokens(&completion.text),
                )
            }
        };

        // A plain completion reports no tool usage
        let tools_used: Vec<String> = Vec::new();
        let extras = match self.id {
            StageId::Planner => {
                let plan = parse_plan_proposal(&completion.text);
                if plan.is_none() {
                    tracing::warn!("planner output had no parseable plan block");
                }
                StageExtras {
                    plan,
                    ..Default::default()
                }
            }
            StageId::DataAnalyst | StageId::CapacityCalc | StageId::DocResearcher => {
                StageExtras::default()
            }
        };

        let metrics = AgentMetrics::priced(
            input_tokens,
            output_tokens,
            duration_ms,
            tools_used.len() as u32,
            &self.pricing,
        );

        Ok(StageResult {
            output: completion.text,
            metrics,
            tools_used,
            extras,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkflowRequest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn config() -> ModelConfig {
        ModelConfig {
            base_url: "http://localhost:9/v1/".to_string(),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_requires_key() {
        assert!(matches!(
            ChatClient::new(ModelConfig::default()),
            Err(PlannerError::LiveModeUnavailable)
        ));
        let client = ChatClient::new(config()).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9/v1/chat/completions");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}],
                      "usage":{"prompt_tokens":12,"completion_tokens":34,"total_tokens":46}}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        let usage = parsed.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 34);
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hello"));
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("one two  three"), 6);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_planner_prompt_carries_context() {
        let client = Arc::new(ChatClient::new(config()).unwrap());
        let stage = LiveStage::new(StageId::Planner, client, Pricing::default());
        let input = StageInput::new(
            WorkflowRequest::new(
                "2026-01-01".parse().unwrap(),
                "2026-01-31".parse().unwrap(),
                "Seattle",
            )
            .unwrap(),
        )
        .with_prior(StageId::DataAnalyst, "487 shipments")
        .with_prior(StageId::CapacityCalc, "4 aircraft")
        .with_prior(StageId::DocResearcher, "compliant");

        let prompt = stage.user_prompt(&input);
        assert!(prompt.contains("487 shipments"));
        assert!(prompt.contains("=== Document Researcher ==="));
    }

    /// Serve one canned chat-completions body per connection
    async fn canned_endpoint(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}/v1", addr)
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_plain_completion_reports_no_tool_usage() {
        let base_url = canned_endpoint(
            r#"{"choices":[{"message":{"role":"assistant","content":"487 shipments analysed"}}],
                "usage":{"prompt_tokens":120,"completion_tokens":80,"total_tokens":200}}"#,
        )
        .await;
        let client = Arc::new(
            ChatClient::new(ModelConfig {
                base_url,
                api_key: Some("sk-test".to_string()),
                ..Default::default()
            })
            .unwrap(),
        );
        let input = StageInput::new(
            WorkflowRequest::new(
                "2026-01-01".parse().unwrap(),
                "2026-01-31".parse().unwrap(),
                "Seattle",
            )
            .unwrap(),
        )
        .with_prior(StageId::DataAnalyst, "487 shipments");

        for id in [StageId::DataAnalyst, StageId::CapacityCalc, StageId::DocResearcher] {
            let stage = LiveStage::new(id, Arc::clone(&client), Pricing::default());
            let result = stage.run(&input).await.unwrap();
            assert_eq!(result.output, "487 shipments analysed");
            assert!(result.tools_used.is_empty(), "{} reported tools", id);
            assert_eq!(result.metrics.tool_calls, 0);
            assert_eq!(result.metrics.input_tokens, 120);
            assert_eq!(result.metrics.output_tokens, 80);
            assert!(result.extras.documents_searched.is_empty());
            assert!(!result.extras.code_executed);
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_stage_error() {
        let client = Arc::new(ChatClient::new(config()).unwrap());
        let stage = LiveStage::new(StageId::DataAnalyst, client, Pricing::default());
        let input = StageInput::new(
            WorkflowRequest::new(
                "2026-01-01".parse().unwrap(),
                "2026-01-02".parse().unwrap(),
                "Seattle",
            )
            .unwrap(),
        );
        let err = stage.run(&input).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Data Analyst stage failed"));
    }
}
