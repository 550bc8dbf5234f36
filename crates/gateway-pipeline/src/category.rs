//! Routing category resolution.

use gateway_config::RoutingConfig;
use gateway_core::PipelineRequest;
use gateway_protocols::switch::CATEGORY_KEY;
use serde_json::Value;

/// Category for requests containing image parts
pub const VISION: &str = "vision";
/// Category for requests defining tools
pub const TOOLS: &str = "tools";
/// Category for requests asking for reasoning
pub const THINKING: &str = "thinking";
/// Category for prompts above the long context threshold
pub const LONG_CONTEXT: &str = "longcontext";

/// How a category was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategorySource {
    /// `x-route-category` header or `__route_category` body key
    Explicit,
    /// Derived from the request shape
    Inferred,
    /// The requested category has no pool
    Fallback,
}

/// Resolve the category of a request.
///
/// `has_pool` answers whether a category has a configured pool; unknown
/// categories fall back to the configured default.
pub fn resolve_category(
    request: &PipelineRequest,
    routing: &RoutingConfig,
    has_pool: impl Fn(&str) -> bool,
) -> (String, CategorySource) {
    let explicit = request
        .metadata
        .get(CATEGORY_KEY)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let (wanted, source) = match explicit {
        Some(category) => (category.to_string(), CategorySource::Explicit),
        None => (infer_category(request, routing).to_string(), CategorySource::Inferred),
    };

    if has_pool(&wanted) {
        (wanted, source)
    } else {
        (routing.default_category.clone(), CategorySource::Fallback)
    }
}

/// Category implied by the request shape
#[must_use]
pub fn infer_category<'a>(request: &PipelineRequest, routing: &'a RoutingConfig) -> &'a str {
    let data = &request.data;
    if data.has_images() {
        VISION
    } else if data.has_tools() {
        TOOLS
    } else if data.wants_reasoning() {
        THINKING
    } else if data.estimated_tokens() > routing.long_context_threshold {
        LONG_CONTEXT
    } else {
        &routing.default_category
    }
}
