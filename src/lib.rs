//! Parses OData request URIs against a service schema.
//!
//! A request goes through four stages, and fails at the first one that
//! rejects it:
//!
//! 1. [`lexer`] splits the path into segments and the query into options,
//!    percent-decoding each piece once.
//! 2. The resource path is resolved segment by segment against the
//!    [`schema`], starting from the entity container.
//! 3. Query options are parsed against the type the path addresses;
//!    `$expand` recurses into the same machinery for each expanded property.
//! 4. [`validator`] checks the combination of path, options and HTTP method.
//!
//! ```no_run
//! use odata_parser::{schema::Document, HttpMethod, Parser};
//!
//! # fn load() -> Document { Document::new() }
//! let doc: Document = load();
//! let parser = Parser::new(&doc);
//! let request = parser.parse(HttpMethod::Get, "/Customers('ALFKI')/Orders", "$top=5")?;
//! assert_eq!(request.options.top, Some(5));
//! # Ok::<(), odata_parser::UriError>(())
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod lexer;
mod parser;
pub mod schema;
pub mod validator;

pub use crate::ast::{
    AliasValue, Expr, ExprKind, ExpandItem, KeyPredicate, KeyValue, Literal, LiteralValue, PartKind,
    QueryOptions, RequestDescriptor, RequestKind, ResourcePart, SelectItem, SystemOption,
};
pub use crate::config::ParserConfig;
pub use crate::error::{ErrorKind, SemanticError, SyntaxError, UriError, ValidationError};
pub use crate::parser::literal::{coerce, literal, resolve_enum};
pub use crate::parser::Parser;
pub use crate::schema::{Document, EdmType, FullName, SchemaAccess};
pub use crate::validator::{classify, validate, HttpMethod, UriType};
