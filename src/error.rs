//! Error types for URI parsing.
//!
//! A parse call fails with exactly one of three kinds, each its own type so
//! callers can pick a different remediation:
//!
//! - [`SyntaxError`]: the text does not follow the URI grammar
//! - [`SemanticError`]: the text is well formed but does not resolve against the schema
//! - [`ValidationError`]: the request resolves but the combination is not permitted
//!
//! All of them are expected outcomes of processing untrusted input.

use thiserror::Error;

/// Which stage rejected the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Semantic,
    Validation,
}

/// Error returned by every parse entry point.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum UriError {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("semantic error: {0}")]
    Semantic(#[from] SemanticError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl UriError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UriError::Syntax(_) => ErrorKind::Syntax,
            UriError::Semantic(_) => ErrorKind::Semantic,
            UriError::Validation(_) => ErrorKind::Validation,
        }
    }

    pub fn is_syntax(&self) -> bool {
        self.kind() == ErrorKind::Syntax
    }

    pub fn is_semantic(&self) -> bool {
        self.kind() == ErrorKind::Semantic
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

/// The raw text does not conform to the grammar.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("malformed percent-encoding '{text}' at offset {offset}")]
    MalformedPercentEncoding { text: String, offset: usize },

    #[error("character '{ch}' must be percent-encoded (offset {offset})")]
    ForbiddenCharacter { ch: char, offset: usize },

    #[error("decoded text is not valid UTF-8: '{text}'")]
    InvalidUtf8 { text: String },

    #[error("empty path segment at position {position}")]
    EmptySegment { position: usize },

    #[error("malformed path segment '{segment}'")]
    MalformedSegment { segment: String },

    #[error("unbalanced parentheses or quotes in '{text}'")]
    Unbalanced { text: String },

    #[error("unexpected '{found}' at offset {offset} in '{text}'")]
    UnexpectedToken {
        found: String,
        offset: usize,
        text: String,
    },

    #[error("unexpected end of input in '{text}'")]
    UnexpectedEnd { text: String },

    #[error("invalid {kind} literal '{text}'")]
    InvalidLiteral { kind: String, text: String },

    #[error("invalid value '{value}' for query option '{option}'")]
    InvalidOptionValue { option: String, value: String },

    #[error("unknown system query option '{name}'")]
    UnknownSystemOption { name: String },

    #[error("query option '{name}' occurs more than once")]
    DuplicateOption { name: String },

    #[error("malformed query option '{text}'")]
    MalformedQueryOption { text: String },

    #[error("invalid URL '{url}'")]
    InvalidUrl { url: String },

    #[error("URL '{url}' is not below the service root '{root}'")]
    OutsideServiceRoot { url: String, root: String },
}

/// Syntactically valid but not resolvable against the schema.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SemanticError {
    #[error("'{name}' is not an entity set, singleton or operation import")]
    UnknownResource { name: String },

    #[error("'{name}' cannot be resolved on type '{context}'")]
    UnresolvableSegment { name: String, context: String },

    #[error("property '{name}' not found on type '{context}'")]
    UnknownProperty { name: String, context: String },

    #[error("type '{name}' not found")]
    UnknownType { name: String },

    #[error("type '{name}' is not a subtype of '{base}'")]
    NotASubtype { name: String, base: String },

    #[error("type filter '{name}' cannot be applied twice on '{segment}'")]
    TypeFilterNotChainable { name: String, segment: String },

    #[error("no operation '{name}' matches the supplied parameters on '{context}'")]
    NoMatchingOperation { name: String, context: String },

    #[error("operation '{name}' is ambiguous on '{context}'")]
    AmbiguousOperation { name: String, context: String },

    #[error("parameter '{name}' of '{operation}' expects '{expected}' but got '{found}'")]
    ParameterType {
        operation: String,
        name: String,
        expected: String,
        found: String,
    },

    #[error("duplicate parameter '{name}' in call to '{operation}'")]
    DuplicateParameter { operation: String, name: String },

    #[error("positional and named key values cannot be mixed in '{segment}'")]
    MixedKeyForms { segment: String },

    #[error("'{name}' is not a key property of '{context}'")]
    UnknownKeyProperty { name: String, context: String },

    #[error("key property '{name}' given more than once")]
    DuplicateKeyProperty { name: String },

    #[error("type '{context}' expects {expected} key value(s), found {found}")]
    KeyCountMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    #[error("key value '{value}' does not match type '{expected}' of '{name}'")]
    KeyValueType {
        name: String,
        expected: String,
        value: String,
    },

    #[error("type '{context}' has no key properties")]
    NoKeyProperties { context: String },

    #[error("alias '{name}' is not defined")]
    UnknownAlias { name: String },

    #[error("lambda variable '{name}' is not in scope")]
    UnboundVariable { name: String },

    #[error("lambda variable '{name}' shadows an outer variable")]
    DuplicateVariable { name: String },

    #[error("'{segment}' requires a collection but '{context}' is single-valued")]
    NotACollection { segment: String, context: String },

    #[error("operator '{operator}' cannot combine '{left}' and '{right}'")]
    IncompatibleOperands {
        operator: String,
        left: String,
        right: String,
    },

    #[error("operator '{operator}' cannot be applied to '{operand}'")]
    IncompatibleOperand { operator: String, operand: String },

    #[error("unknown method '{name}'")]
    UnknownMethod { name: String },

    #[error("method '{name}' takes {expected} argument(s), found {found}")]
    MethodArity {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("argument {index} of '{name}' cannot be '{found}'")]
    MethodArgument {
        name: String,
        index: usize,
        found: String,
    },

    #[error("{option} must be a Boolean expression, found '{found}'")]
    ExpectedBoolean { option: String, found: String },

    #[error("literal '{text}' does not fit the facets of '{expected}'")]
    LiteralOutOfRange { text: String, expected: String },
}

/// Resolvable, but disallowed by the combination rules.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("system query option '{option}' is not allowed for {target} with {method}")]
    OptionNotAllowed {
        option: String,
        target: String,
        method: String,
    },

    #[error("method {method} is not allowed for {target}")]
    MethodNotAllowed { method: String, target: String },

    #[error("key predicate not allowed on '{segment}'")]
    KeyNotAllowed { segment: String },

    #[error("segment '{segment}' must be the last path segment")]
    NotFinalSegment { segment: String },

    #[error("'{segment}' is only allowed as the first path segment")]
    NotFirstSegment { segment: String },

    #[error("'{option}' is only allowed on collections")]
    RequiresCollection { option: String },

    #[error("system query option '{option}' is required")]
    MissingOption { option: String },

    #[error("{what} nesting exceeds the configured limit of {limit}")]
    DepthExceeded { what: String, limit: usize },
}

pub(crate) fn unexpected(found: impl Into<String>, offset: usize, text: &str) -> SyntaxError {
    SyntaxError::UnexpectedToken {
        found: found.into(),
        offset,
        text: text.to_string(),
    }
}
