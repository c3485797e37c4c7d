#![allow(dead_code)]

use odata_parser::{Document, HttpMethod, Parser, RequestDescriptor, UriError};

/// Customers keyed by `Id: String` with `Orders` keyed by `OrderId: Int32`,
/// plus a derived customer type, complex and enum properties, a media
/// entity and a handful of operations.
pub fn shop() -> Document {
    serde_json::from_str(include_str!("../fixtures/schema/shop.json")).expect("shop fixture")
}

pub fn get(doc: &Document, path: &str, query: &str) -> Result<RequestDescriptor, UriError> {
    Parser::new(doc).parse(HttpMethod::Get, path, query)
}

pub fn request(
    doc: &Document,
    method: HttpMethod,
    path: &str,
    query: &str,
) -> Result<RequestDescriptor, UriError> {
    Parser::new(doc).parse(method, path, query)
}
