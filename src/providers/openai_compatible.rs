//! OpenAI-style wire protocol, reused by three backends that all
//! speak the same unified-messages chat completion shape: OpenAI itself, Groq
//! (OpenAI-compatible), and Ollama's local `/api/chat` endpoint.

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

/// Which backend this instance speaks to; only affects base URL defaults, auth
/// requirements, and which static model table is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiCompatibleKind {
    OpenAi,
    Groq,
    Ollama,
}

impl OpenAiCompatibleKind {
    fn default_base_url(self) -> &'static str {
        match self {
            OpenAiCompatibleKind::OpenAi => "https://api.openai.com/v1",
            OpenAiCompatibleKind::Groq => "https://api.groq.com/openai/v1",
            OpenAiCompatibleKind::Ollama => "http://localhost:11434/v1",
        }
    }

    fn requires_auth(self) -> bool {
        !matches!(self, OpenAiCompatibleKind::Ollama)
    }

    fn static_catalog(self) -> Vec<ModelDescriptor> {
        match self {
            OpenAiCompatibleKind::OpenAi => vec![
                model("gpt-4o", "GPT-4o", 128_000, 16_384, 0.0025, 0.01, true, true, ComplexityTier::Complex, true),
                model("gpt-4o-mini", "GPT-4o mini", 128_000, 16_384, 0.00015, 0.0006, true, false, ComplexityTier::Moderate, false),
                model("gpt-3.5-turbo", "GPT-3.5 Turbo", 16_385, 4_096, 0.0005, 0.0015, false, false, ComplexityTier::Simple, false),
            ],
            OpenAiCompatibleKind::Groq => vec![
                model("llama-3.1-70b-versatile", "Llama 3.1 70B", 131_072, 8_192, 0.00059, 0.00079, false, false, ComplexityTier::Complex, true),
                model("llama-3.1-8b-instant", "Llama 3.1 8B", 131_072, 8_192, 0.00005, 0.00008, false, false, ComplexityTier::Simple, false),
                model("mixtral-8x7b-32768", "Mixtral 8x7B", 32_768, 32_768, 0.00024, 0.00024, false, false, ComplexityTier::Moderate, false),
            ],
            OpenAiCompatibleKind::Ollama => vec![
                model("llama3.1", "Llama 3.1 (local)", 128_000, 4_096, 0.0, 0.0, false, true, ComplexityTier::Moderate, true),
                model("mistral", "Mistral (local)", 32_768, 4_096, 0.0, 0.0, false, true, ComplexityTier::Simple, false),
            ],
        }
    }

    fn label(self) -> &'static str {
        match self {
            OpenAiCompatibleKind::OpenAi => "openai",
            OpenAiCompatibleKind::Groq => "groq",
            OpenAiCompatibleKind::Ollama => "ollama",
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn model(
    id: &str,
    name: &str,
    context_window: u32,
    max_output_tokens: u32,
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
    vision: bool,
    functions: bool,
    complexity: ComplexityTier,
    is_default: bool,
) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        context_window,
        max_output_tokens,
        input_cost_per_1k,
        output_cost_per_1k,
        capabilities: Capabilities {
            vision,
            streaming: true,
            functions,
        },
        complexity,
        is_default,
    }
}

pub struct OpenAiCompatibleAdapter {
    name: String,
    client: Client,
    base_url: String,
    api_key: Option<String>,
    catalog: ModelCatalog,
    timeout: Duration,
}

impl OpenAiCompatibleAdapter {
    pub async fn initialize(config: &ProviderConfig, kind: OpenAiCompatibleKind) -> Result<Self> {
        if kind.requires_auth() && config.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(RouterError::authentication_failed(
                &config.name,
                "missing API key",
            ));
        }

        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RouterError::unknown(&config.name, e.to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| kind.default_base_url().to_string());

        debug!(provider = %config.name, kind = kind.label(), %base_url, "initializing provider adapter");

        Ok(Self {
            name: config.name.clone(),
            client,
            base_url,
            api_key: config.api_key.clone(),
            catalog: ModelCatalog::new(kind.static_catalog()),
            timeout,
        })
    }

    fn auth_header(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
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

    fn build_body(&self, request: &CompletionRequest, model_id: &str, stream: bool) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| message_to_json(m, None))
            .collect();

        let mut body = json!({
            "model": model_id,
            "messages": messages,
            "stream": stream,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(stop) = &request.stop_sequences {
            body["stop"] = json!(stop);
        }
        body
    }

    async fn send_completion(&self, request: &CompletionRequest, model_id: &str) -> Result<(Value, u64)> {
        let body = self.build_body(request, model_id, false);
        let started = Instant::now();
        let resp = self
            .auth_header(self.client.post(format!("{}/chat/completions", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&self.name, e))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| map_reqwest_error(&self.name, e))?;
        let elapsed = started.elapsed().as_millis() as u64;

        if !(200..300).contains(&status) {
            return Err(RouterError::from_http_status(&self.name, status, &text));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| RouterError::unknown(&self.name, format!("invalid JSON response: {e}")))?;
        Ok((value, elapsed))
    }

    fn parse_response(
        &self,
        model: &ModelDescriptor,
        request: &CompletionRequest,
        value: Value,
        latency_ms: u64,
    ) -> Result<CompletionResponse> {
        let choice = value
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .ok_or_else(|| RouterError::unknown(&self.name, "no choices in response"))?;

        let content = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(translate_finish_reason)
            .unwrap_or(FinishReason::Stop);

        // Prefer the server-reported usage; fall back to our own estimate when
        // the backend omits it.
        let usage = value
            .get("usage")
            .map(|u| Usage {
                input: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                output: u.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                total: u.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
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

fn message_to_json(message: &Message, image_override: Option<&[ImagePart]>) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    match (&message.content, image_override) {
        (_, Some(images)) if !images.is_empty() => {
            let text = message.content.as_flat_text();
            let mut parts = vec![json!({"type": "text", "text": text})];
            for image in images {
                parts.push(json!({
                    "type": "image_url",
                    "image_url": { "url": data_url(image) },
                }));
            }
            json!({"role": role, "content": parts})
        }
        (MessageContent::Text(text), None) => json!({"role": role, "content": text}),
        (MessageContent::Parts(parts), None) => {
            let content: Vec<Value> = parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => json!({"type": "text", "text": text}),
                    ContentPart::Image { image } => json!({
                        "type": "image_url",
                        "image_url": { "url": data_url(image) },
                    }),
                })
                .collect();
            json!({"role": role, "content": content})
        }
    }
}

fn data_url(image: &ImagePart) -> String {
    format!("data:{};base64,{}", image.media_type.mime_type(), image.data)
}

fn translate_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::MaxTokens,
        _ => FinishReason::Stop,
    }
}

fn map_reqwest_error(provider: &str, err: reqwest::Error) -> RouterError {
    if err.is_timeout() {
        RouterError::timeout(provider, err.to_string()).with_source(err)
    } else if err.is_connect() {
        RouterError::network_error(provider, err.to_string())
    } else {
        RouterError::network_error(provider, err.to_string())
    }
}

struct ChatCompletionChunkTransformer {
    accumulated_usage: Option<Usage>,
}

impl StreamTransformer for ChatCompletionChunkTransformer {
    fn provider_name(&self) -> &'static str {
        "openai-compatible"
    }

    fn transform(&mut self, data: &str) -> Result<Vec<StreamEvent>> {
        let value: Value = serde_json::from_str(data)
            .map_err(|e| RouterError::unknown("openai-compatible", format!("bad stream chunk: {e}")))?;

        if let Some(usage) = value.get("usage") {
            self.accumulated_usage = Some(Usage {
                input: usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                output: usage.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                total: usage.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            });
        }

        let choice = match value.get("choices").and_then(|c| c.as_array()).and_then(|a| a.first()) {
            Some(c) => c,
            None => return Ok(vec![]),
        };

        let mut events = Vec::new();
        if let Some(text) = choice
            .get("delta")
            .and_then(|d| d.get("content"))
            .and_then(|v| v.as_str())
        {
            if !text.is_empty() {
                events.push(StreamEvent::Delta(text.to_string()));
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
            events.push(StreamEvent::Done {
                usage: self.accumulated_usage,
                finish_reason: translate_finish_reason(reason),
            });
        }

        Ok(events)
    }

    fn finalize(&mut self) -> StreamEvent {
        StreamEvent::Done {
            usage: self.accumulated_usage,
            finish_reason: FinishReason::Stop,
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    async fn is_healthy(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let request = self.auth_header(self.client.get(url)).timeout(self.timeout);
        matches!(request.send().await, Ok(resp) if resp.status().is_success())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let model = self.resolve_model(request)?;
        let model_id = model.id.clone();
        let (value, latency_ms) = self.send_completion(request, &model_id).await?;
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
        let body = self.build_body(request, &model_id, true);
        let started = Instant::now();

        let resp = self
            .auth_header(self.client.post(format!("{}/chat/completions", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&self.name, e))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            return Err(RouterError::from_http_status(&self.name, status, &text));
        }

        let mut decoder = SseDecoder::new(ChatCompletionChunkTransformer {
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
                            if let Some(event) = decoder.close() {
                                if let StreamEvent::Done { usage: u, finish_reason: f } = event {
                                    usage = u;
                                    finish_reason = f;
                                }
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

        let mut messages: Vec<Value> = Vec::with_capacity(request.messages.len());
        for (i, m) in request.messages.iter().enumerate() {
            let is_last_user = i == request.messages.len() - 1 && m.role == Role::User;
            let json_msg = if is_last_user {
                message_to_json(m, Some(images))
            } else {
                message_to_json(m, None)
            };
            messages.push(json_msg);
        }

        let mut body = json!({
            "model": model_id,
            "messages": messages,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let started = Instant::now();
        let resp = self
            .auth_header(self.client.post(format!("{}/chat/completions", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&self.name, e))?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| map_reqwest_error(&self.name, e))?;
        let elapsed = started.elapsed().as_millis() as u64;

        if !(200..300).contains(&status) {
            return Err(RouterError::from_http_status(&self.name, status, &text));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| RouterError::unknown(&self.name, format!("invalid JSON response: {e}")))?;
        let model = self.catalog.get(&model_id).expect("resolved above");
        self.parse_response(model, request, value, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    fn config() -> ProviderConfig {
        ProviderConfig::new("groq", ProviderKind::Groq).with_api_key("gsk-test")
    }

    #[tokio::test]
    async fn initialize_fails_without_api_key_when_auth_required() {
        let mut cfg = ProviderConfig::new("openai", ProviderKind::OpenAi);
        cfg.api_key = None;
        let result = OpenAiCompatibleAdapter::initialize(&cfg, OpenAiCompatibleKind::OpenAi).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn ollama_does_not_require_api_key() {
        let cfg = ProviderConfig::new("ollama", ProviderKind::Ollama);
        let result = OpenAiCompatibleAdapter::initialize(&cfg, OpenAiCompatibleKind::Ollama).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn catalog_has_a_default_model() {
        let adapter = OpenAiCompatibleAdapter::initialize(&config(), OpenAiCompatibleKind::Groq)
            .await
            .unwrap();
        assert!(adapter.catalog().default_model().is_some());
    }

    #[test]
    fn message_to_json_plain_text() {
        let msg = Message::user("hi there");
        let json_value = message_to_json(&msg, None);
        assert_eq!(json_value["role"], "user");
        assert_eq!(json_value["content"], "hi there");
    }

    #[test]
    fn message_to_json_with_image_uses_data_url() {
        let msg = Message::user("describe");
        let image = ImagePart {
            media_type: ImageMediaType::Png,
            data: "Zm9v".to_string(),
        };
        let json_value = message_to_json(&msg, Some(std::slice::from_ref(&image)));
        let content = json_value["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert!(content[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }
}
