mod common;

use common::{get, shop};
use odata_parser::ast::{Levels, SearchExpr};
use odata_parser::{
    AliasValue, EdmType, ExprKind, FullName, LiteralValue, Parser, PartKind, SemanticError,
    SyntaxError, UriError, ValidationError,
};

#[test]
fn negative_top_is_a_syntax_error() {
    let doc = shop();
    assert_eq!(
        get(&doc, "/Customers", "$top=-1").unwrap_err(),
        SyntaxError::InvalidOptionValue {
            option: "$top".into(),
            value: "-1".into(),
        }
        .into()
    );
}

#[test]
fn paging_and_count() {
    let doc = shop();
    let d = get(&doc, "/Customers", "$top=5&$skip=10&$count=true").unwrap();
    assert_eq!(d.options.top, Some(5));
    assert_eq!(d.options.skip, Some(10));
    assert_eq!(d.options.count, Some(true));

    assert!(get(&doc, "/Customers", "$skip=ten").unwrap_err().is_syntax());
    assert!(get(&doc, "/Customers", "$count=TRUE").unwrap_err().is_syntax());
}

#[test]
fn system_options_are_case_insensitive_but_not_repeatable() {
    let doc = shop();
    let d = get(&doc, "/Customers", "$TOP=1").unwrap();
    assert_eq!(d.options.top, Some(1));

    assert_eq!(
        get(&doc, "/Customers", "$top=1&$top=2").unwrap_err(),
        SyntaxError::DuplicateOption {
            name: "$top".into()
        }
        .into()
    );
    assert_eq!(
        get(&doc, "/Customers", "$frobnicate=1").unwrap_err(),
        SyntaxError::UnknownSystemOption {
            name: "$frobnicate".into()
        }
        .into()
    );
}

#[test]
fn custom_options_keep_their_order() {
    let doc = shop();
    let d = get(&doc, "/Customers", "b=2&a=1&debug").unwrap();
    assert_eq!(
        d.options.custom,
        vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
            ("debug".to_string(), String::new()),
        ]
    );
}

#[test]
fn opaque_options() {
    let doc = shop();
    let d = get(&doc, "/Customers", "$skiptoken=abc%3D%3D&$format=json").unwrap();
    assert_eq!(d.options.skip_token.as_deref(), Some("abc=="));
    assert_eq!(d.options.format.as_deref(), Some("json"));
    assert!(get(&doc, "/Customers", "$format=").unwrap_err().is_syntax());

    let d = get(&doc, "/Customers", "$deltatoken=42").unwrap();
    assert_eq!(d.options.delta_token.as_deref(), Some("42"));
}

#[test]
fn select_items() {
    let doc = shop();
    let d = get(&doc, "/Customers", "$select=Name,Address/City,*").unwrap();
    let items = d.options.select.unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(
        items[0].path[0].kind,
        PartKind::PrimitiveProperty {
            name: "Name".into()
        }
    );
    assert_eq!(items[1].path.len(), 2);
    assert!(items[2].star);
}

#[test]
fn select_with_type_filter_and_operations() {
    let doc = shop();
    let d = get(&doc, "/Customers", "$select=shop.Vip/Level,S.*,shop.Score").unwrap();
    let items = d.options.select.unwrap();
    assert_eq!(
        items[0].start_type_filter,
        Some(EdmType::Entity(FullName::new("shop", "Vip")))
    );
    assert_eq!(items[0].path.len(), 1);
    assert_eq!(items[1].all_operations.as_deref(), Some("shop"));
    assert!(matches!(&items[2].path[0].kind, PartKind::Function { .. }));

    assert!(matches!(
        get(&doc, "/Customers", "$select=Nope").unwrap_err(),
        UriError::Semantic(SemanticError::UnknownProperty { .. })
    ));
}

#[test]
fn expand_with_nested_options() {
    let doc = shop();
    let d = get(
        &doc,
        "/Customers",
        "$expand=Orders($filter=Amount%20gt%2010;$top=2;$select=Amount),BestFriend",
    )
    .unwrap();
    let items = d.options.expand.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(
        items[0].path[0].kind,
        PartKind::Navigation {
            name: "Orders".into()
        }
    );
    assert_eq!(items[0].options.top, Some(2));
    assert!(items[0].options.filter.is_some());
    assert_eq!(items[0].options.select.as_ref().map(Vec::len), Some(1));
    assert_eq!(items[1].options.top, None);
}

#[test]
fn expand_ref_count_star_and_levels() {
    let doc = shop();
    let d = get(&doc, "/Customers", "$expand=Orders/$ref,BestFriend($levels=max),*").unwrap();
    let items = d.options.expand.unwrap();
    assert!(items[0].is_ref);
    assert_eq!(items[1].options.levels, Some(Levels::Max));
    assert!(items[2].star);

    let d = get(&doc, "/Customers", "$expand=Orders/$count").unwrap();
    assert!(d.options.expand.unwrap()[0].is_count);
}

#[test]
fn expand_targets_navigation_only() {
    let doc = shop();
    assert!(matches!(
        get(&doc, "/Customers", "$expand=Name").unwrap_err(),
        UriError::Semantic(SemanticError::UnresolvableSegment { .. })
    ));
    assert!(matches!(
        get(&doc, "/Customers", "$expand=Orders($format=json)").unwrap_err(),
        UriError::Validation(ValidationError::OptionNotAllowed { .. })
    ));
}

fn nested_expand(levels: usize) -> String {
    let mut value = String::from("BestFriend");
    for _ in 1..levels {
        value = format!("BestFriend($expand={})", value);
    }
    format!("$expand={}", value)
}

#[test]
fn expand_depth_is_bounded() {
    let doc = shop();
    assert!(get(&doc, "/Customers", &nested_expand(5)).is_ok());
    assert_eq!(
        get(&doc, "/Customers", &nested_expand(6)).unwrap_err(),
        ValidationError::DepthExceeded {
            what: "$expand".into(),
            limit: 5,
        }
        .into()
    );
}

#[test]
fn levels_only_inside_expand() {
    let doc = shop();
    assert!(matches!(
        get(&doc, "/Customers", "$levels=2").unwrap_err(),
        UriError::Validation(ValidationError::OptionNotAllowed { .. })
    ));
}

#[test]
fn orderby_items() {
    let doc = shop();
    let d = get(&doc, "/Customers", "$orderby=Name%20desc,Age,Address/City%20asc").unwrap();
    let items = d.options.orderby.unwrap();
    assert_eq!(items.len(), 3);
    assert!(items[0].descending);
    assert!(!items[1].descending);
    assert!(!items[2].descending);
}

#[test]
fn search_expressions() {
    let doc = shop();
    let d = get(&doc, "/Customers", "$search=blue%20OR%20%22light%20green%22").unwrap();
    assert_eq!(
        d.options.search,
        Some(SearchExpr::Or(
            Box::new(SearchExpr::Term("blue".into())),
            Box::new(SearchExpr::Phrase("light green".into())),
        ))
    );
}

#[test]
fn aliases_are_stored_raw_and_resolved_lazily() {
    let doc = shop();
    let parser = Parser::new(&doc);
    let d = parser
        .parse(
            odata_parser::HttpMethod::Get,
            "/Customers",
            "$filter=Age%20gt%20@min&@min=21&@list=[1,2]",
        )
        .unwrap();
    assert_eq!(d.alias_text("@min"), Some("21"));

    let first = parser.resolve_alias(&d, "@min").unwrap();
    let second = parser.resolve_alias(&d, "@min").unwrap();
    assert_eq!(first, second);
    match first {
        AliasValue::Expr(expr) => match expr.kind {
            ExprKind::Literal(lit) => assert_eq!(lit.value, LiteralValue::Integer(21)),
            other => panic!("unexpected expression {:?}", other),
        },
        other => panic!("unexpected alias value {:?}", other),
    }

    assert_eq!(
        parser.resolve_alias(&d, "@list").unwrap(),
        AliasValue::Json(serde_json::json!([1, 2]))
    );
    assert_eq!(
        parser.resolve_alias(&d, "@nope").unwrap_err(),
        SemanticError::UnknownAlias {
            name: "@nope".into()
        }
        .into()
    );
}

#[test]
fn alias_names_must_be_identifiers() {
    let doc = shop();
    assert!(matches!(
        get(&doc, "/Customers", "@1x=1").unwrap_err(),
        UriError::Syntax(SyntaxError::MalformedQueryOption { .. })
    ));
    assert!(matches!(
        get(&doc, "/Customers", "@a=1&@a=2").unwrap_err(),
        UriError::Syntax(SyntaxError::DuplicateOption { .. })
    ));
}

#[test]
fn entity_id_requests() {
    let doc = shop();
    let d = get(&doc, "/$entity", "$id=Customers('A')&$select=Name").unwrap_err();
    // `$select` needs a type to resolve against, given by a cast segment.
    assert!(d.is_semantic());

    let d = get(&doc, "/$entity/shop.Customer", "$id=Customers('A')&$select=Name").unwrap();
    assert_eq!(d.options.id.as_deref(), Some("Customers('A')"));
    assert_eq!(d.options.select.map(|s| s.len()), Some(1));

    assert_eq!(
        get(&doc, "/$entity", "").unwrap_err(),
        ValidationError::MissingOption {
            option: "$id".into()
        }
        .into()
    );
}
