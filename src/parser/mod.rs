//! The parse pipeline: tokenize, resolve the resource path, parse the query
//! options against the resolved target, validate the combination.

pub(crate) mod expr;
pub(crate) mod key;
pub mod literal;
pub(crate) mod options;
pub(crate) mod path;

use tracing::{debug, debug_span};
use url::Url;

use crate::ast::{AliasValue, PartKind, RequestDescriptor, RequestKind, ResourcePart};
use crate::config::ParserConfig;
use crate::error::{SemanticError, SyntaxError, UriError, ValidationError};
use crate::lexer;
use crate::schema::{EdmType, SchemaAccess};
use crate::validator::{self, HttpMethod};

const DEFAULT_BASE: &str = "http://localhost/";

/// Everything a grammar rule needs besides its input.
#[derive(Clone, Copy)]
pub(crate) struct Context<'a> {
    pub schema: &'a dyn SchemaAccess,
    pub config: &'a ParserConfig,
}

/// What `$it` denotes for the query options of a request.
#[derive(Clone, Debug, Default)]
pub(crate) struct Target {
    pub ty: Option<EdmType>,
    pub collection: bool,
    /// Entity sets addressable by name in a `$crossjoin` expression.
    pub crossjoin: Vec<String>,
}

impl Target {
    pub(crate) fn of(descriptor: &RequestDescriptor) -> Target {
        if descriptor.kind == RequestKind::Crossjoin {
            return Target {
                crossjoin: descriptor.crossjoin.clone(),
                ..Target::default()
            };
        }
        let mut parts = descriptor.resource_path.iter().rev();
        let part = match parts.next() {
            Some(p) if matches!(p.kind, PartKind::Count | PartKind::Ref) => parts.next(),
            Some(p) if matches!(p.kind, PartKind::Value) => None,
            other => other,
        };
        match part {
            Some(p) => Target {
                ty: p.effective_type().cloned(),
                collection: p.collection,
                crossjoin: Vec::new(),
            },
            None => Target::default(),
        }
    }

    /// The target element of a nested `$expand` item.
    pub(crate) fn of_part(part: &ResourcePart) -> Target {
        Target {
            ty: part.effective_type().cloned(),
            collection: part.collection,
            crossjoin: Vec::new(),
        }
    }

    /// A `$it` segment for resolving member paths; `name` is what was being
    /// resolved when there is no instance to resolve it against.
    pub(crate) fn it_part(&self, name: &str) -> Result<ResourcePart, SemanticError> {
        match &self.ty {
            Some(ty) => Ok(ResourcePart::new(PartKind::It, ty.clone(), false)),
            None => Err(SemanticError::UnresolvableSegment {
                name: name.to_string(),
                context: "$it".into(),
            }),
        }
    }
}

/// Parses request URIs against one schema.
///
/// A `Parser` holds no mutable state: it can be shared between threads and
/// used for any number of concurrent parses.
pub struct Parser<'a> {
    schema: &'a (dyn SchemaAccess + Sync),
    config: ParserConfig,
}

impl<'a> Parser<'a> {
    pub fn new(schema: &'a (dyn SchemaAccess + Sync)) -> Self {
        Self::with_config(schema, ParserConfig::default())
    }

    pub fn with_config(schema: &'a (dyn SchemaAccess + Sync), config: ParserConfig) -> Self {
        Parser { schema, config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    fn context(&self) -> Context<'_> {
        Context {
            schema: self.schema,
            config: &self.config,
        }
    }

    /// Parses the percent-encoded resource path (relative to the service
    /// root) and query string of a request.
    pub fn parse(
        &self,
        method: HttpMethod,
        path: &str,
        query: &str,
    ) -> Result<RequestDescriptor, UriError> {
        let span = debug_span!("parse", %method, path);
        let _guard = span.enter();

        let result = self.run(method, path, query);
        match &result {
            Ok(descriptor) => debug!(
                kind = %descriptor.kind,
                segments = descriptor.resource_path.len(),
                "parsed"
            ),
            Err(err) => debug!(kind = ?err.kind(), error = %err, "rejected"),
        }
        result
    }

    fn run(&self, method: HttpMethod, path: &str, query: &str) -> Result<RequestDescriptor, UriError> {
        let ctx = self.context();
        let tokens = lexer::tokenize(path, query)?;
        if tokens.segments.len() > self.config.max_segments {
            return Err(ValidationError::DepthExceeded {
                what: "resource path".into(),
                limit: self.config.max_segments,
            }
            .into());
        }

        let mut descriptor = path::resolve(ctx, &tokens.segments)?;
        descriptor.trailing_slash = tokens.trailing_slash;
        validator::check_path(&descriptor, method)?;
        validator::check_options(&descriptor, method, &options::system_options(&tokens.options)?)?;

        descriptor.options = options::parse(ctx, &Target::of(&descriptor), &tokens.options)?;
        validator::validate(&descriptor, method)?;
        Ok(descriptor)
    }

    /// Parses an absolute or root-relative URL.
    ///
    /// With a configured service root the URL must lie below it and the root
    /// is stripped; without one the whole URL path is the resource path.
    pub fn parse_url(&self, method: HttpMethod, url: &str) -> Result<RequestDescriptor, UriError> {
        let (path, query) = self.split_url(url)?;
        self.parse(method, &path, &query)
    }

    fn split_url(&self, url: &str) -> Result<(String, String), SyntaxError> {
        let invalid = |url: &str| SyntaxError::InvalidUrl {
            url: url.to_string(),
        };
        let root = match &self.config.service_root {
            Some(root) => Some(Url::parse(root).map_err(|_| invalid(root))?),
            None => None,
        };

        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = match &root {
                    Some(root) => root.clone(),
                    None => Url::parse(DEFAULT_BASE).map_err(|_| invalid(DEFAULT_BASE))?,
                };
                base.join(url).map_err(|_| invalid(url))?
            }
            Err(_) => return Err(invalid(url)),
        };

        let path = match &root {
            Some(root) => {
                let prefix = root.path().trim_end_matches('/');
                let rest = parsed
                    .path()
                    .strip_prefix(prefix)
                    .filter(|rest| rest.is_empty() || rest.starts_with('/'))
                    .filter(|_| parsed.origin() == root.origin());
                match rest {
                    Some(rest) => rest.to_string(),
                    None => {
                        return Err(SyntaxError::OutsideServiceRoot {
                            url: url.to_string(),
                            root: root.to_string(),
                        })
                    }
                }
            }
            None => parsed.path().to_string(),
        };
        Ok((path, parsed.query().unwrap_or_default().to_string()))
    }

    /// Resolves the value of alias `name` (with its leading `@`) of a parsed
    /// request.
    ///
    /// JSON arrays and objects are returned as JSON; anything else is parsed
    /// as an expression against the request's target.
    pub fn resolve_alias(
        &self,
        descriptor: &RequestDescriptor,
        name: &str,
    ) -> Result<AliasValue, UriError> {
        let text = descriptor
            .alias_text(name)
            .ok_or_else(|| SemanticError::UnknownAlias {
                name: name.to_string(),
            })?;

        let trimmed = text.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            return serde_json::from_str(text)
                .map(AliasValue::Json)
                .map_err(|_| {
                    SyntaxError::InvalidLiteral {
                        kind: "JSON".into(),
                        text: text.to_string(),
                    }
                    .into()
                });
        }
        let expr = expr::parse_expression(self.context(), &Target::of(descriptor), text)?;
        Ok(AliasValue::Expr(expr))
    }
}
