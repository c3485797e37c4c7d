//! Key predicates, function parameters and operation overload resolution.

use std::collections::BTreeSet;

use super::{expr, literal, path, Context, Target};
use crate::ast::{
    Expr, ExprKind, KeyPredicate, KeyValue, LiteralValue, Parameter, ParameterValue, ResourcePart,
};
use crate::error::{SemanticError, SyntaxError, UriError, ValidationError};
use crate::lexer;
use crate::schema::property::{ReferentialConstraint, Structural};
use crate::schema::{self, Action, EdmType, FullName, Function};

fn is_alias(text: &str) -> bool {
    match text.strip_prefix('@') {
        Some(name) => matches!(literal::identifier(name), Ok(("", _))),
        None => false,
    }
}

//* keyPredicate     = simpleKey / compoundKey / keyPathSegments
//* simpleKey        = OPEN ( parameterAlias / keyPropertyValue ) CLOSE
//* compoundKey      = OPEN keyValuePair *( COMMA keyValuePair ) CLOSE
//* keyValuePair     = ( primitiveKeyProperty / keyPropertyAlias ) EQ ( parameterAlias / keyPropertyValue )
/// Applies the key text `text` (without parentheses) to the collection
/// `part`, addressing a single entity.
///
/// `constraints` are the referential constraints of the navigation property
/// that led to `part`; key properties they determine may be left out.
pub(crate) fn apply(
    ctx: Context<'_>,
    part: &mut ResourcePart,
    text: &str,
    constraints: &[ReferentialConstraint],
) -> Result<(), UriError> {
    let segment = part.segment_name();
    let ty = match part.effective_type() {
        Some(ty) if part.collection && !part.has_keys() => ty.clone(),
        _ => return Err(ValidationError::KeyNotAllowed { segment }.into()),
    };
    let context = ty.to_string();
    let keys = ctx.schema.key_properties(&ty);
    if keys.is_empty() {
        return Err(SemanticError::NoKeyProperties { context }.into());
    }

    let referenced = |key: &Structural| {
        constraints
            .iter()
            .find(|c| c.referenced_property == key.name)
            .map(|c| c.property.clone())
    };

    let items = if text.trim().is_empty() {
        Vec::new()
    } else {
        lexer::split_top_level(text, ',')?
    };
    let mut named = Vec::new();
    let mut positional = Vec::new();
    for item in &items {
        match lexer::find_top_level(item, '=') {
            Some(idx) => named.push((item[..idx].trim(), item[idx + 1..].trim())),
            None => positional.push(item.trim()),
        }
    }
    if !named.is_empty() && !positional.is_empty() {
        return Err(SemanticError::MixedKeyForms { segment }.into());
    }

    let mut predicates = Vec::with_capacity(keys.len());
    if named.is_empty() {
        // Values address the key properties not implied by the navigation,
        // in declaration order, or all of them when every one is given.
        let open: Vec<&Structural> = keys.iter().copied().filter(|k| referenced(k).is_none()).collect();
        let open = if positional.len() == keys.len() { keys.clone() } else { open };
        if positional.len() != open.len() {
            return Err(SemanticError::KeyCountMismatch {
                context,
                expected: open.len(),
                found: positional.len(),
            }
            .into());
        }
        for key in &keys {
            let value = match open.iter().position(|k| k.name == key.name) {
                Some(idx) => key_value(ctx, key, positional[idx])?,
                None => match referenced(key) {
                    Some(property) => KeyValue::Referenced(property),
                    None => {
                        return Err(SemanticError::KeyCountMismatch {
                            context,
                            expected: open.len(),
                            found: positional.len(),
                        }
                        .into())
                    }
                },
            };
            predicates.push(KeyPredicate {
                name: key.name.clone(),
                value,
            });
        }
    } else {
        let mut seen = BTreeSet::new();
        for (name, _) in &named {
            if !keys.iter().any(|k| k.name == *name) {
                return Err(SemanticError::UnknownKeyProperty {
                    name: name.to_string(),
                    context,
                }
                .into());
            }
            if !seen.insert(*name) {
                return Err(SemanticError::DuplicateKeyProperty {
                    name: name.to_string(),
                }
                .into());
            }
        }
        for key in &keys {
            let given = named.iter().find(|(name, _)| *name == key.name);
            let value = match (given, referenced(key)) {
                (Some((_, value)), _) => key_value(ctx, key, value)?,
                (None, Some(property)) => KeyValue::Referenced(property),
                (None, None) => {
                    return Err(SemanticError::KeyCountMismatch {
                        context,
                        expected: keys.len(),
                        found: named.len(),
                    }
                    .into())
                }
            };
            predicates.push(KeyPredicate {
                name: key.name.clone(),
                value,
            });
        }
    }

    part.keys = predicates;
    part.collection = false;
    Ok(())
}

fn key_value(ctx: Context<'_>, key: &Structural, text: &str) -> Result<KeyValue, UriError> {
    if text.starts_with('@') {
        if !is_alias(text) {
            return Err(SyntaxError::InvalidLiteral {
                kind: "alias".into(),
                text: text.to_string(),
            }
            .into());
        }
        return Ok(KeyValue::Alias(text.to_string()));
    }

    let expected = key.kind.edm_type();
    let mismatch = || SemanticError::KeyValueType {
        name: key.name.clone(),
        expected: expected.to_string(),
        value: text.to_string(),
    };
    let lit = literal::literal(text)?;
    if lit.value == LiteralValue::Null {
        return Err(mismatch().into());
    }
    match literal::coerce(ctx.schema, lit, &expected, &key.facets)? {
        Some(lit) => Ok(KeyValue::Literal(lit)),
        None => Err(mismatch().into()),
    }
}

//* functionParameters = OPEN [ functionParameter *( COMMA functionParameter ) ] CLOSE
//* functionParameter  = parameterName EQ ( parameterAlias / primitiveLiteral / ... )
/// Parses the parameter list of a call to `operation`; values are checked
/// against the declaration once the overload is known.
pub(crate) fn parameters(
    ctx: Context<'_>,
    operation: &str,
    text: &str,
    depth: usize,
) -> Result<Vec<Parameter>, UriError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut out: Vec<Parameter> = Vec::new();
    for item in lexer::split_top_level(text, ',')? {
        let (name, value) = match lexer::find_top_level(item, '=') {
            Some(idx) => (item[..idx].trim(), item[idx + 1..].trim()),
            None => {
                return Err(SyntaxError::MalformedSegment {
                    segment: format!("{}({})", operation, text),
                }
                .into())
            }
        };
        if !matches!(literal::identifier(name), Ok(("", _))) {
            return Err(SyntaxError::MalformedSegment {
                segment: format!("{}({})", operation, text),
            }
            .into());
        }
        if out.iter().any(|p| p.name == name) {
            return Err(SemanticError::DuplicateParameter {
                operation: operation.to_string(),
                name: name.to_string(),
            }
            .into());
        }
        let value = if is_alias(value) {
            ParameterValue::Alias(value.to_string())
        } else {
            let expr = expr::parse_expression_at(ctx, &Target::default(), value, depth)?;
            ParameterValue::Expr {
                text: value.to_string(),
                expr,
            }
        };
        out.push(Parameter {
            name: name.to_string(),
            value,
        });
    }
    Ok(out)
}

/// Whether an operation with binding parameter `declared` can be called on a
/// segment of type `binding` (`None` at the service root).
pub(crate) fn binds(
    ctx: Context<'_>,
    declared: Option<&schema::Parameter>,
    is_bound: bool,
    binding: Option<(&EdmType, bool)>,
) -> bool {
    match (binding, declared) {
        (None, _) => !is_bound,
        (Some((ty, collection)), Some(param)) => {
            is_bound && param.collection == collection && ctx.schema.is_subtype(ty, &param.kind)
        }
        (Some(_), None) => false,
    }
}

fn accepts(declared: &[schema::Parameter], names: &BTreeSet<&str>) -> bool {
    names.iter().all(|n| declared.iter().any(|p| p.name == *n))
        && declared
            .iter()
            .filter(|p| !p.nullable)
            .all(|p| names.contains(p.name.as_str()))
}

fn binding_context(binding: Option<(&EdmType, bool)>) -> String {
    match binding {
        Some((ty, true)) => format!("Collection({})", ty),
        Some((ty, false)) => ty.to_string(),
        None => "service root".into(),
    }
}

/// Narrows a set of applicable overloads to one: overloads whose declared
/// parameter names match the supplied ones exactly win, then the one with
/// the most derived binding type.
fn most_specific<'s, T>(
    ctx: Context<'_>,
    name: &FullName,
    context: String,
    mut candidates: Vec<&'s T>,
    exact: impl Fn(&T) -> bool,
    binding_of: impl Fn(&T) -> Option<&EdmType>,
) -> Result<&'s T, SemanticError> {
    if candidates.len() > 1 && candidates.iter().any(|c| exact(c)) {
        candidates.retain(|c| exact(c));
    }
    if candidates.len() > 1 {
        let all = candidates.clone();
        candidates.retain(|c| {
            all.iter().all(|other| match (binding_of(c), binding_of(other)) {
                (Some(a), Some(b)) => ctx.schema.is_subtype(a, b),
                _ => true,
            })
        });
    }
    match candidates.as_slice() {
        [] => Err(SemanticError::NoMatchingOperation {
            name: name.to_string(),
            context,
        }),
        [one] => Ok(*one),
        _ => Err(SemanticError::AmbiguousOperation {
            name: name.to_string(),
            context,
        }),
    }
}

/// Picks the function overload a call resolves to.
pub(crate) fn resolve_function<'s>(
    ctx: Context<'s>,
    name: &FullName,
    binding: Option<(&EdmType, bool)>,
    supplied: &[Parameter],
) -> Result<&'s Function, SemanticError> {
    let names: BTreeSet<&str> = supplied.iter().map(|p| p.name.as_str()).collect();
    let candidates: Vec<&'s Function> = ctx
        .schema
        .functions(name)
        .into_iter()
        .filter(|f| binds(ctx, f.binding(), f.is_bound, binding))
        .filter(|f| accepts(f.call_parameters(), &names))
        .collect();
    most_specific(
        ctx,
        name,
        binding_context(binding),
        candidates,
        |f| f.call_parameters().len() == names.len(),
        |f| f.binding().map(|p| &p.kind),
    )
}

/// Picks the action overload for a binding; actions take no URI parameters.
pub(crate) fn resolve_action<'s>(
    ctx: Context<'s>,
    name: &FullName,
    binding: Option<(&EdmType, bool)>,
) -> Result<&'s Action, SemanticError> {
    let candidates: Vec<&'s Action> = ctx
        .schema
        .actions(name)
        .into_iter()
        .filter(|a| binds(ctx, a.binding(), a.is_bound, binding))
        .collect();
    most_specific(
        ctx,
        name,
        binding_context(binding),
        candidates,
        |_| true,
        |a| a.binding().map(|p| &p.kind),
    )
}

/// Checks the supplied values against the declared parameters, converting
/// literals to the declared types.
pub(crate) fn check_parameters(
    ctx: Context<'_>,
    operation: &str,
    declared: &[schema::Parameter],
    supplied: &mut [Parameter],
) -> Result<(), SemanticError> {
    for param in supplied.iter_mut() {
        let decl = match declared.iter().find(|d| d.name == param.name) {
            Some(decl) => decl,
            None => continue,
        };
        let expr = match &mut param.value {
            ParameterValue::Expr { expr, .. } => expr,
            ParameterValue::Alias(_) => continue,
        };
        let mismatch = |found: String| SemanticError::ParameterType {
            operation: operation.to_string(),
            name: decl.name.clone(),
            expected: if decl.collection {
                format!("Collection({})", decl.kind)
            } else {
                decl.kind.to_string()
            },
            found,
        };
        if let ExprKind::Literal(lit) = &expr.kind {
            if lit.value == LiteralValue::Null {
                if !decl.nullable {
                    return Err(mismatch("null".into()));
                }
                continue;
            }
            if decl.collection {
                return Err(mismatch(lit.text.clone()));
            }
            match literal::coerce(ctx.schema, lit.clone(), &decl.kind, &decl.facets)? {
                Some(lit) => {
                    let ty = lit.ty.clone();
                    *expr = Expr::new(ExprKind::Literal(lit), ty, false);
                }
                None => return Err(mismatch(lit.text.clone())),
            }
            continue;
        }
        if let Some(ty) = &expr.ty {
            let compatible = expr.collection == decl.collection
                && (ctx.schema.is_subtype(ty, &decl.kind)
                    || matches!(
                        (ty.as_primitive(), decl.kind.as_primitive()),
                        (Some(a), Some(b)) if a.can_promote_to(b)
                    ));
            if !compatible {
                return Err(mismatch(path::type_label(ty, expr.collection)));
            }
        }
    }
    Ok(())
}
