mod common;

use common::{get, shop};
use odata_parser::schema::property::Property;
use odata_parser::{
    AliasValue, Document, EdmType, ExprKind, KeyValue, LiteralValue, Parser, PartKind,
    ResourcePart, SchemaAccess, SemanticError, UriError, ValidationError,
};
use proptest::prelude::*;

fn key_text() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9]{1,12}").unwrap()
}

/// Paths mixing keys, both type filter slots, function segments with
/// parameters and trailing pseudo segments.
fn resource_path() -> impl Strategy<Value = String> {
    (key_text(), any::<i32>(), any::<i32>(), 0i32..1000, 0usize..7).prop_map(
        |(id, order, line, n, shape)| match shape {
            0 => format!("Customers('{}')/Orders({})/Items({})", id, order, line),
            1 => format!("Customers/shop.Vip('{}')/Orders({})", id, order),
            2 => format!("Customers('{}')/shop.Vip/Level", id),
            3 => format!("TopCustomers(count={})('{}')/Name", n, id),
            4 => format!("Customers('{}')/Orders/$count", id),
            5 => format!("Customers('{}')/Orders({})/Items/$ref", id, order),
            _ => format!("Customers('{}')/shop.Score(weight={}.5)", id, n),
        },
    )
}

fn entity_path() -> impl Strategy<Value = String> {
    let start = prop_oneof![
        key_text().prop_map(|id| format!("Customers('{}')", id)),
        key_text().prop_map(|id| format!("Customers/shop.Vip('{}')", id)),
        key_text().prop_map(|id| format!("Customers('{}')/shop.Vip", id)),
        Just("Boss".to_string()),
    ];
    let rest = prop_oneof![
        Just(String::new()),
        Just("/Name".to_string()),
        Just("/Tags".to_string()),
        Just("/Address/City".to_string()),
        Just("/BestFriend/Name".to_string()),
        Just("/Orders/$count".to_string()),
        Just("/shop.Score()".to_string()),
        Just("/Orders/shop.MostRecent()/Amount".to_string()),
        (any::<i32>(), any::<i32>())
            .prop_map(|(order, line)| format!("/Orders({})/Items({})/Quantity", order, line)),
    ];
    (start, rest).prop_map(|(start, rest)| format!("/{}{}", start, rest))
}

fn filters_are_subtypes(doc: &Document, part: &ResourcePart) -> bool {
    let declared = match &part.ty {
        Some(ty) => ty,
        None => return true,
    };
    [&part.type_filter_on_collection, &part.type_filter_on_entry]
        .into_iter()
        .flatten()
        .all(|filter| doc.is_subtype(filter, declared))
}

/// Whether `part` is declared on the type `prev` leaves the path at.
fn follows(doc: &Document, prev: &ResourcePart, part: &ResourcePart) -> bool {
    let from = match prev.effective_type() {
        Some(ty) => ty,
        None => return false,
    };
    let many = part.collection || part.has_keys();
    match &part.kind {
        PartKind::Navigation { name }
        | PartKind::PrimitiveProperty { name }
        | PartKind::ComplexProperty { name } => match doc.property(from, name) {
            Some(Property::Structural(s)) => {
                part.ty == Some(s.kind.edm_type()) && many == s.collection
            }
            Some(Property::Navigation(n)) => {
                part.ty == Some(EdmType::Entity(n.kind.clone())) && many == n.collection
            }
            None => false,
        },
        PartKind::Function { name, .. } => doc.functions(name).iter().any(|f| {
            let bound = f.is_bound
                && f.parameters.first().map_or(false, |binding| {
                    doc.is_subtype(from, &binding.kind) && binding.collection == prev.collection
                });
            bound && part.ty.as_ref() == Some(&f.return_type.kind)
        }),
        PartKind::Count => prev.collection,
        PartKind::Value | PartKind::Ref => true,
        _ => false,
    }
}

fn starts_in_container(doc: &Document, part: &ResourcePart) -> bool {
    let declared = match &part.kind {
        PartKind::EntitySet { name } => doc.entity_set(name).map(|s| s.kind.clone()),
        PartKind::Singleton { name } => doc.singleton(name).map(|s| s.kind.clone()),
        _ => None,
    };
    matches!(declared, Some(kind) if part.ty == Some(EdmType::Entity(kind.clone())))
}

fn nested_expand(levels: usize) -> String {
    let mut value = String::from("BestFriend");
    for _ in 1..levels {
        value = format!("BestFriend($expand={})", value);
    }
    format!("$expand={}", value)
}

proptest! {
    #[test]
    fn positional_and_named_keys_agree(id in key_text()) {
        let doc = shop();
        let positional = get(&doc, &format!("/Customers('{}')", id), "").unwrap();
        let named = get(&doc, &format!("/Customers(Id='{}')", id), "").unwrap();
        prop_assert_eq!(&positional.resource_path, &named.resource_path);
        match &positional.resource_path[0].keys[0].value {
            KeyValue::Literal(lit) => prop_assert_eq!(&lit.value, &LiteralValue::String(id.clone())),
            other => prop_assert!(false, "unexpected key {:?}", other),
        }
    }

    #[test]
    fn key_forms_do_not_mix(order in 0i32..1000, line in 0i32..1000) {
        let doc = shop();
        let err = get(&doc, &format!("/OrderItems({},Line={})", order, line), "").unwrap_err();
        prop_assert_eq!(
            err,
            UriError::from(SemanticError::MixedKeyForms { segment: "OrderItems".into() })
        );
    }

    #[test]
    fn resource_paths_reparse_to_themselves(path in resource_path()) {
        let doc = shop();
        let first = get(&doc, &format!("/{}", path), "").unwrap();
        let text = first.resource_path_text();
        let second = get(&doc, &format!("/{}", text), "").unwrap();
        prop_assert_eq!(&first.resource_path, &second.resource_path);
        prop_assert_eq!(second.resource_path_text(), text);
    }

    #[test]
    fn accepted_paths_chain_through_the_schema(path in entity_path()) {
        let doc = shop();
        let d = get(&doc, &path, "").unwrap();
        prop_assert!(starts_in_container(&doc, &d.resource_path[0]), "{}", path);
        for part in &d.resource_path {
            prop_assert!(filters_are_subtypes(&doc, part), "{}", path);
        }
        for pair in d.resource_path.windows(2) {
            prop_assert!(follows(&doc, &pair[0], &pair[1]), "{} at {}", path, pair[1].segment_name());
        }
    }

    #[test]
    fn expand_depth_is_bounded(levels in 1usize..10) {
        let doc = shop();
        let result = get(&doc, "/Customers", &nested_expand(levels));
        if levels <= 5 {
            prop_assert!(result.is_ok());
        } else {
            prop_assert_eq!(
                result.unwrap_err(),
                UriError::from(ValidationError::DepthExceeded { what: "$expand".into(), limit: 5 })
            );
        }
    }

    #[test]
    fn top_accepts_any_unsigned(top in any::<u32>()) {
        let doc = shop();
        let d = get(&doc, "/Customers", &format!("$top={}", top)).unwrap();
        prop_assert_eq!(d.options.top, Some(u64::from(top)));
    }

    #[test]
    fn alias_resolution_is_idempotent(n in any::<i32>()) {
        let doc = shop();
        let parser = Parser::new(&doc);
        let d = get(&doc, "/Customers", &format!("$filter=Age%20eq%20@n&@n={}", n)).unwrap();
        let first = parser.resolve_alias(&d, "@n").unwrap();
        let second = parser.resolve_alias(&d, "@n").unwrap();
        prop_assert_eq!(&first, &second);
        match first {
            AliasValue::Expr(expr) => match expr.kind {
                ExprKind::Literal(lit) => prop_assert_eq!(lit.value, LiteralValue::Integer(i64::from(n))),
                other => prop_assert!(false, "unexpected expression {:?}", other),
            },
            other => prop_assert!(false, "unexpected alias value {:?}", other),
        }
    }
}
