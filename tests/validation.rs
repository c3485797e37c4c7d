mod common;

use common::{get, request, shop};
use odata_parser::{classify, validate, HttpMethod, UriError, UriType, ValidationError};

fn uri_type(path: &str) -> UriType {
    classify(&get(&shop(), path, "").unwrap())
}

#[test]
fn classification() {
    assert_eq!(uri_type("/"), UriType::Service);
    assert_eq!(uri_type("/$metadata"), UriType::Metadata);
    assert_eq!(uri_type("/Customers"), UriType::EntityCollection);
    assert_eq!(uri_type("/Customers('A')"), UriType::Entity);
    assert_eq!(uri_type("/Customers/shop.Vip"), UriType::EntityCollection);
    assert_eq!(uri_type("/Customers/$count"), UriType::EntityCount);
    assert_eq!(uri_type("/Customers('A')/Name"), UriType::Primitive);
    assert_eq!(uri_type("/Customers('A')/Name/$value"), UriType::PrimitiveValue);
    assert_eq!(uri_type("/Customers('A')/Tags"), UriType::PrimitiveCollection);
    assert_eq!(uri_type("/Customers('A')/Tags/$count"), UriType::PrimitiveCollectionCount);
    assert_eq!(uri_type("/Customers('A')/Address"), UriType::Complex);
    assert_eq!(uri_type("/Customers('A')/Addresses"), UriType::ComplexCollection);
    assert_eq!(uri_type("/Customers('A')/BestFriend/$ref"), UriType::Reference);
    assert_eq!(uri_type("/Customers('A')/Orders/$ref"), UriType::ReferenceCollection);
    assert_eq!(uri_type("/Photos(1)/$value"), UriType::MediaValue);
}

#[test]
fn methods_follow_the_addressed_resource() {
    let doc = shop();
    assert_eq!(
        request(&doc, HttpMethod::Delete, "/Customers", "").unwrap_err(),
        ValidationError::MethodNotAllowed {
            method: "DELETE".into(),
            target: "an entity collection".into(),
        }
        .into()
    );
    assert!(request(&doc, HttpMethod::Post, "/Customers", "").is_ok());
    assert!(request(&doc, HttpMethod::Patch, "/Customers('A')", "").is_ok());
    assert!(request(&doc, HttpMethod::Put, "/Photos(1)/$value", "").is_ok());
    assert!(request(&doc, HttpMethod::Post, "/Customers/$count", "")
        .unwrap_err()
        .is_validation());
    assert!(request(&doc, HttpMethod::Put, "/$metadata", "")
        .unwrap_err()
        .is_validation());
}

#[test]
fn functions_are_read_only_and_actions_post_only() {
    let doc = shop();
    assert!(matches!(
        request(&doc, HttpMethod::Post, "/Customers('A')/shop.Score()", "").unwrap_err(),
        UriError::Validation(ValidationError::MethodNotAllowed { .. })
    ));
    assert!(matches!(
        get(&doc, "/Customers('A')/shop.Promote", "").unwrap_err(),
        UriError::Validation(ValidationError::MethodNotAllowed { .. })
    ));
}

#[test]
fn batch_requires_post() {
    let doc = shop();
    assert!(request(&doc, HttpMethod::Post, "/$batch", "").is_ok());
    assert!(get(&doc, "/$batch", "").unwrap_err().is_validation());
}

#[test]
fn options_follow_the_addressed_resource() {
    let doc = shop();
    assert!(get(&doc, "/$metadata", "$format=xml").is_ok());
    assert_eq!(
        get(&doc, "/$metadata", "$top=1").unwrap_err(),
        ValidationError::OptionNotAllowed {
            option: "$top".into(),
            target: "the metadata document".into(),
            method: "GET".into(),
        }
        .into()
    );
    assert!(get(&doc, "/Customers('A')", "$select=Name&$expand=Orders").is_ok());
    assert!(matches!(
        get(&doc, "/Customers('A')", "$top=1").unwrap_err(),
        UriError::Validation(ValidationError::OptionNotAllowed { .. })
    ));
    assert!(get(&doc, "/Customers/$count", "$filter=Age%20gt%201").is_ok());
    assert!(get(&doc, "/Customers/$count", "$top=1").unwrap_err().is_validation());
}

#[test]
fn options_are_checked_before_their_values() {
    let doc = shop();
    // An unparseable value on a disallowed option reports the combination.
    assert!(matches!(
        get(&doc, "/Customers('A')", "$filter=((").unwrap_err(),
        UriError::Validation(ValidationError::OptionNotAllowed { .. })
    ));
}

#[test]
fn writes_take_select_and_expand_only() {
    let doc = shop();
    assert!(request(&doc, HttpMethod::Patch, "/Customers('A')", "$select=Name").is_ok());
    assert!(matches!(
        request(&doc, HttpMethod::Patch, "/Customers('A')", "$filter=true").unwrap_err(),
        UriError::Validation(ValidationError::OptionNotAllowed { .. })
    ));
    assert!(request(&doc, HttpMethod::Delete, "/Customers('A')", "$format=json").is_ok());
}

#[test]
fn search_needs_a_collection() {
    let doc = shop();
    assert!(get(&doc, "/Customers", "$search=blue").is_ok());
    assert_eq!(
        get(&doc, "/Customers('A')", "$search=blue").unwrap_err(),
        ValidationError::RequiresCollection {
            option: "$search".into()
        }
        .into()
    );
}

#[test]
fn deleting_a_reference_from_a_collection_needs_an_id() {
    let doc = shop();
    assert_eq!(
        request(&doc, HttpMethod::Delete, "/Customers('A')/Orders/$ref", "").unwrap_err(),
        ValidationError::MissingOption {
            option: "$id".into()
        }
        .into()
    );
    let d = request(
        &doc,
        HttpMethod::Delete,
        "/Customers('A')/Orders/$ref",
        "$id=Orders(1)",
    )
    .unwrap();
    assert_eq!(d.options.id.as_deref(), Some("Orders(1)"));
}

#[test]
fn validate_can_be_rerun_for_another_method() {
    let doc = shop();
    let d = get(&doc, "/Customers('A')", "$select=Name").unwrap();
    assert!(validate(&d, HttpMethod::Put).is_ok());
    assert!(matches!(
        validate(&d, HttpMethod::Post),
        Err(ValidationError::MethodNotAllowed { .. })
    ));
}

#[test]
fn method_names() {
    assert_eq!("delete".parse::<HttpMethod>(), Ok(HttpMethod::Delete));
    assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
}
