//! Anthropic-style wire protocol: messages API with a separate
//! system prompt slot, distinct from the unified-messages shape every other
//! backend in this crate speaks.

use super::ProviderAdapter;
use crate::config::ProviderConfig;
use crate::cost::{calculate_cost, estimate_tokens};
use crate::error::{Result, RouterError};
use crate::message::{ContentPart, ImageMediaType, ImagePart, Message, MessageContent, Role};
use crate::model::{Capabilities, ComplexityTier, ModelCatalog, ModelDescriptor};
use crate::request::CompletionRequest;
use crate::response::{CompletionResponse, CostBreakdown, FinishReason, ResponseMetadata, Usage};
use crate::retry::CancelToken;
use crate::sse::{SseDecoder, StreamEvent, StreamTransformer};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

fn static_catalog() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor {
            id: "claude-3-5-sonnet-20241022".into(),
            name: "Claude 3.5 Sonnet".into(),
            context_window: 200_000,
            max_output_tokens: 8_192,
            input_cost_per_1k: 0.003,
            output_cost_per_1k: 0.015,
            capabilities: Capabilities {
                vision: true,
                streaming: true,
                functions: true,
            },
            complexity: ComplexityTier::Complex,
            is_default: true,
        },
        ModelDescriptor {
            id: "claude-3-5-haiku-20241022".into(),
            name: "Claude 3.5 Haiku".into(),
            context_window: 200_000,
            max_output_tokens: 8_192,
            input_cost_per_1k: 0.0008,
            output_cost_per_1k: 0.004,
            capabilities: Capabilities {
                vision: true,
                streaming: true,
                functions: true,
            },
            complexity: ComplexityTier::Simple,
            is_default: false,
        },
        ModelDescriptor {
            id: "claude-3-opus-20240229".into(),
            name: "Claude 3 Opus".into(),
            context_window: 200_000,
            max_output_tokens: 4_096,
            input_cost_per_1k: 0.015,
            output_cost_per_1k: 0.075,
            capabilities: Capabilities {
                vision: true,
                streaming: true,
                functions: true,
            },
            complexity: ComplexityTier::Expert,
            is_default: false,
        },
    ]
}

pub struct AnthropicAdapter {
    name: String,
    client: Client,
    base_url: String,
    api_key: String,
    catalog: ModelCatalog,
}

impl AnthropicAdapter {
    pub async fn initialize(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RouterError::authentication_failed(&config.name, "missing API key"))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RouterError::unknown(&config.name, e.to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        debug!(provider = %config.name, %base_url, "initializing anthropic adapter");

        Ok(Self {
            name: config.name.clone(),
            client,
            base_url,
            api_key,
            catalog: ModelCatalog::new(static_catalog()),
        })
    }

    fn resolve_model<'a>(&'a self, request: &CompletionRequest) -> Result<&'a ModelDescriptor> {
        match &request.model {
            Some(id) => self
                .catalog
                .get(id)
                .ok_or_else(|| RouterError::model_not_found(&self.name, id.clone())),
            None => self
                .catalog
                .default_model()
                .ok_or_else(|| RouterError::model_not_found(&self.name, "<none configured>")),
        }
    }

    /// Extract the leading system message(s) into the separate `system` slot required
    /// by this wire protocol, leaving the remaining turns in `messages`.
    fn split_system(messages: &[Message], image_for_last_user: Option<&[ImagePart]>) -> (Option<String>, Vec<Value>) {
        let mut system_parts = Vec::new();
        let mut rest_start = 0;
        for m in messages {
            if m.role == Role::System {
                system_parts.push(m.content.as_flat_text());
                rest_start += 1;
            } else {
                break;
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n"))
        };

        let rest = &messages[rest_start..];
        let last_user_index = rest.iter().rposition(|m| m.role == Role::User);

        let converted = rest
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let images = if Some(i) == last_user_index {
                    image_for_last_user
                } else {
                    None
                };
                message_to_json(m, images)
            })
            .collect();

        (system, converted)
    }

    fn build_body(&self, request: &CompletionRequest, model_id: &str, stream: bool, images: Option<&[ImagePart]>) -> Value {
        let (system, messages) = Self::split_system(&request.messages, images);
        let max_tokens = request.max_tokens.unwrap_or(4_096);

        let mut body = json!({
            "model": model_id,
            "messages": messages,
            "max_tokens": max_tokens,
            "stream": stream,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(stop) = &request.stop_sequences {
            body["stop_sequences"] = json!(stop);
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<(reqwest::StatusCode, String, u64)> {
        let started = Instant::now();
        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&self.name, e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| map_reqwest_error(&self.name, e))?;
        Ok((status, text, started.elapsed().as_millis() as u64))
    }

    fn parse_response(
        &self,
        model: &ModelDescriptor,
        request: &CompletionRequest,
        value: Value,
        latency_ms: u64,
    ) -> Result<CompletionResponse> {
        let content = value
            .get("content")
            .and_then(|c| c.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let finish_reason = value
            .get("stop_reason")
            .and_then(|r| r.as_str())
            .map(translate_stop_reason)
            .unwrap_or(FinishReason::Stop);

        let usage = value
            .get("usage")
            .map(|u| {
                let input = u.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                let output = u.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                Usage::new(input, output)
            })
            .unwrap_or_else(|| {
                let input = estimate_tokens(&request.messages);
                let output = estimate_tokens(&[Message::assistant(content.clone())]);
                Usage::new(input, output)
            });

        let cost = calculate_cost(model, &usage);

        Ok(CompletionResponse {
            content,
            model: model.id.clone(),
            provider: self.name.clone(),
            usage,
            cost,
            latency_ms,
            finish_reason,
            metadata: ResponseMetadata::default(),
        })
    }
}

fn message_to_json(message: &Message, images: Option<&[ImagePart]>) -> Value {
    let role = match message.role {
        Role::Assistant => "assistant",
        _ => "user",
    };

    let mut parts: Vec<Value> = match &message.content {
        MessageContent::Text(text) => vec![json!({"type": "text", "text": text})],
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => json!({"type": "text", "text": text}),
                ContentPart::Image { image } => image_block(image),
            })
            .collect(),
    };

    if let Some(images) = images {
        for image in images {
            parts.push(image_block(image));
        }
    }

    json!({"role": role, "content": parts})
}

fn image_block(image: &ImagePart) -> Value {
    json!({
        "type": "image",
        "source": {
            "type": "base64",
            "media_type": image.media_type.mime_type(),
            "data": image.data,
        }
    })
}

fn translate_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::MaxTokens,
        _ => FinishReason::Stop,
    }
}

fn map_reqwest_error(provider: &str, err: reqwest::Error) -> RouterError {
    if err.is_timeout() {
        RouterError::timeout(provider, err.to_string())
    } else {
        RouterError::network_error(provider, err.to_string())
    }
}

struct AnthropicStreamTransformer {
    accumulated_usage: Option<Usage>,
}

impl StreamTransformer for AnthropicStreamTransformer {
    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn is_end_marker(&self, _data: &str) -> bool {
        false
    }

    fn transform(&mut self, data: &str) -> Result<Vec<StreamEvent>> {
        let value: Value = serde_json::from_str(data)
            .map_err(|e| RouterError::unknown("anthropic", format!("bad stream event: {e}")))?;
        let event_type = value.get("type").and_then(|v| v.as_str()).unwrap_or("");

        match event_type {
            "content_block_delta" => {
                let text = value
                    .get("delta")
                    .and_then(|d| d.get("text"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("");
                if text.is_empty() {
                    Ok(vec![])
                } else {
                    Ok(vec![StreamEvent::Delta(text.to_string())])
                }
            }
            "message_delta" => {
                let output = value
                    .get("usage")
                    .and_then(|u| u.get("output_tokens"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32;
                let input = self.accumulated_usage.map(|u| u.input).unwrap_or(0);
                self.accumulated_usage = Some(Usage::new(input, output));
                let stop_reason = value
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(|v| v.as_str());
                if let Some(reason) = stop_reason {
                    Ok(vec![StreamEvent::Done {
                        usage: self.accumulated_usage,
                        finish_reason: translate_stop_reason(reason),
                    }])
                } else {
                    Ok(vec![])
                }
            }
            "message_start" => {
                let input = value
                    .get("message")
                    .and_then(|m| m.get("usage"))
                    .and_then(|u| u.get("input_tokens"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32;
                self.accumulated_usage = Some(Usage::new(input, 0));
                Ok(vec![])
            }
            "message_stop" => Ok(vec![StreamEvent::Done {
                usage: self.accumulated_usage,
                finish_reason: FinishReason::Stop,
            }]),
            _ => Ok(vec![]),
        }
    }

    fn finalize(&mut self) -> StreamEvent {
        StreamEvent::Done {
            usage: self.accumulated_usage,
            finish_reason: FinishReason::Stop,
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    async fn is_healthy(&self) -> bool {
        let resp = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await;
        matches!(resp, Ok(r) if r.status().is_success())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let model = self.resolve_model(request)?;
        let model_id = model.id.clone();
        let body = self.build_body(request, &model_id, false, None);
        let (status, text, latency_ms) = self.send(&body).await?;
        if !status.is_success() {
            return Err(RouterError::from_http_status(&self.name, status.as_u16(), &text));
        }
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| RouterError::unknown(&self.name, format!("invalid JSON response: {e}")))?;
        let model = self.catalog.get(&model_id).expect("resolved above");
        self.parse_response(model, request, value, latency_ms)
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        on_chunk: &mut (dyn FnMut(&str) + Send),
        cancel: &CancelToken,
    ) -> Result<CompletionResponse> {
        let model = self.resolve_model(request)?;
        let model_id = model.id.clone();
        let body = self.build_body(request, &model_id, true, None);
        let started = Instant::now();

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&self.name, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RouterError::from_http_status(&self.name, status.as_u16(), &text));
        }

        let mut decoder = SseDecoder::new(AnthropicStreamTransformer {
            accumulated_usage: None,
        });
        let mut content = String::new();
        let mut usage = None;
        let mut finish_reason = FinishReason::Stop;
        let mut byte_stream = resp.bytes_stream();

        use futures::StreamExt;
        loop {
            if cancel.is_cancelled() {
                finish_reason = FinishReason::Cancelled;
                break;
            }
            tokio::select! {
                chunk = byte_stream.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            let events = decoder.push(&bytes)?;
                            for event in events {
                                match event {
                                    StreamEvent::Delta(text) => {
                                        content.push_str(&text);
                                        on_chunk(&text);
                                    }
                                    StreamEvent::Done { usage: u, finish_reason: f } => {
                                        usage = u;
                                        finish_reason = f;
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => return Err(map_reqwest_error(&self.name, e)),
                        None => {
                            if let Some(StreamEvent::Done { usage: u, finish_reason: f }) = decoder.close() {
                                usage = u;
                                finish_reason = f;
                            }
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    finish_reason = FinishReason::Cancelled;
                    break;
                }
            }
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        let model = self.catalog.get(&model_id).expect("resolved above");
        let usage = usage.unwrap_or_else(|| {
            let input = estimate_tokens(&request.messages);
            let output = estimate_tokens(&[Message::assistant(content.clone())]);
            Usage::new(input, output)
        });
        let cost = calculate_cost(model, &usage);

        Ok(CompletionResponse {
            content,
            model: model.id.clone(),
            provider: self.name.clone(),
            usage,
            cost: CostBreakdown::new(cost.input, cost.output),
            latency_ms,
            finish_reason,
            metadata: ResponseMetadata::default(),
        })
    }

    async fn complete_with_vision(
        &self,
        request: &CompletionRequest,
        images: &[ImagePart],
    ) -> Result<CompletionResponse> {
        let model = self.resolve_model(request)?;
        if !model.capabilities.vision {
            return Err(super::missing_vision_model(&self.name, &model.id));
        }
        let model_id = model.id.clone();
        let body = self.build_body(request, &model_id, false, Some(images));
        let (status, text, latency_ms) = self.send(&body).await?;
        if !status.is_success() {
            return Err(RouterError::from_http_status(&self.name, status.as_u16(), &text));
        }
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| RouterError::unknown(&self.name, format!("invalid JSON response: {e}")))?;
        let model = self.catalog.get(&model_id).expect("resolved above");
        self.parse_response(model, request, value, latency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    fn config() -> ProviderConfig {
        ProviderConfig::new("anthropic", ProviderKind::Anthropic).with_api_key("sk-ant-test")
    }

    #[tokio::test]
    async fn initialize_fails_without_api_key() {
        let cfg = ProviderConfig::new("anthropic", ProviderKind::Anthropic);
        let result = AnthropicAdapter::initialize(&cfg).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn initialize_succeeds_with_api_key() {
        let adapter = AnthropicAdapter::initialize(&config()).await.unwrap();
        assert_eq!(adapter.name(), "anthropic");
        assert!(adapter.catalog().default_model().is_some());
    }

    #[test]
    fn split_system_extracts_leading_system_messages() {
        let messages = vec![
            Message::system("be concise"),
            Message::user("hello"),
        ];
        let (system, rest) = AnthropicAdapter::split_system(&messages, None);
        assert_eq!(system, Some("be concise".to_string()));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0]["role"], "user");
    }

    #[test]
    fn split_system_handles_no_system_message() {
        let messages = vec![Message::user("hello")];
        let (system, rest) = AnthropicAdapter::split_system(&messages, None);
        assert_eq!(system, None);
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn image_block_uses_inline_base64() {
        let image = ImagePart {
            media_type: ImageMediaType::Jpeg,
            data: "Zm9v".to_string(),
        };
        let block = image_block(&image);
        assert_eq!(block["source"]["type"], "base64");
        assert_eq!(block["source"]["media_type"], "image/jpeg");
    }
}
