use serde::{Deserialize, Serialize};

/// Limits and settings for a [`Parser`](crate::Parser).
///
/// Every recursive construct in the grammar is bounded by one of these limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum nesting of `$expand` items; the top-level `$expand` is depth 1.
    pub max_expand_depth: usize,
    /// Maximum nesting of expression constructs in `$filter`, `$orderby`,
    /// `$search`, lambda bodies and parameter values.
    pub max_expression_depth: usize,
    /// Maximum number of resource path segments.
    pub max_segments: usize,
    /// Service root stripped from absolute URLs by
    /// [`Parser::parse_url`](crate::Parser::parse_url).
    pub service_root: Option<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_expand_depth: 5,
            max_expression_depth: 64,
            max_segments: 64,
            service_root: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: ParserConfig = serde_json::from_str(r#"{"max_expand_depth": 2}"#).unwrap();
        assert_eq!(config.max_expand_depth, 2);
        assert_eq!(config.max_expression_depth, 64);
        assert_eq!(config.service_root, None);
    }
}
