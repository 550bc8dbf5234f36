//! Gateway configurations and caller request bodies

use gateway_config::GatewayConfig;
use serde_json::{json, Map, Value};

/// Builds a validated [`GatewayConfig`] from providers and pools
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    providers: Map<String, Value>,
    pools: Map<String, Value>,
    sections: Map<String, Value>,
}

impl ConfigBuilder {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with a single key `main` holding `sk-{id}`
    pub fn provider(self, id: &str, protocol: &str, endpoint: &str) -> Self {
        let auth_mode = match protocol {
            "anthropic-messages" => "x-api-key",
            "gemini" => "goog-api-key",
            _ => "bearer",
        };
        self.provider_with(
            id,
            json!({
                "protocol": protocol,
                "endpoint": endpoint,
                "auth_mode": auth_mode,
                "keys": {"main": {"value": format!("sk-{id}")}}
            }),
        )
    }

    /// Provider from a raw config value
    pub fn provider_with(mut self, id: &str, provider: Value) -> Self {
        self.providers.insert(id.to_string(), provider);
        self
    }

    /// Pool of `(provider, model)` members in retry order, all using key `main`
    pub fn pool(mut self, category: &str, members: &[(&str, &str)]) -> Self {
        let entries: Vec<Value> = members
            .iter()
            .map(|(provider, model)| json!({"provider": provider, "model": model, "key": "main"}))
            .collect();
        self.pools.insert(category.to_string(), Value::Array(entries));
        self
    }

    /// Set a top-level section such as `timeouts` or `compatibility`
    pub fn section(mut self, name: &str, value: Value) -> Self {
        self.sections.insert(name.to_string(), value);
        self
    }

    /// Deserialize and validate
    pub fn build(self) -> GatewayConfig {
        let mut root = self.sections;
        root.insert("providers".into(), Value::Object(self.providers));
        root.insert("pools".into(), Value::Object(self.pools));
        let config: GatewayConfig = serde_json::from_value(Value::Object(root)).expect("config shape");
        config.validate().expect("valid config");
        config
    }
}

/// OpenAI chat request
pub fn openai_chat_request(model: &str, stream: bool) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "Say hello"}],
        "stream": stream
    })
}

/// Anthropic messages request
pub fn anthropic_request(model: &str, stream: bool) -> Value {
    json!({
        "model": model,
        "max_tokens": 256,
        "messages": [{"role": "user", "content": "Say hello"}],
        "stream": stream
    })
}

/// OpenAI Responses request
pub fn responses_request(model: &str, stream: bool) -> Value {
    json!({
        "model": model,
        "input": "Say hello",
        "stream": stream
    })
}

/// Gemini generateContent body
pub fn gemini_request() -> Value {
    json!({
        "contents": [{"role": "user", "parts": [{"text": "Say hello"}]}]
    })
}

/// A request carrying an image part
pub fn openai_vision_request(model: &str) -> Value {
    json!({
        "model": model,
        "messages": [{
            "role": "user",
            "content": [
                {"type": "text", "text": "What is in this picture?"},
                {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}}
            ]
        }]
    })
}

/// A request declaring one tool
pub fn openai_tools_request(model: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "Weather in Paris?"}],
        "tools": [{
            "type": "function",
            "function": {
                "name": "get_weather",
                "description": "Current weather",
                "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
            }
        }]
    })
}
