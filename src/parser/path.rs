//! Resource path resolution.
//!
//! Each segment is resolved against the type reached by the segments before
//! it; the first one against the entity container.

use tracing::trace;

use super::{key, Context};
use crate::ast::{PartKind, RequestDescriptor, RequestKind, ResourcePart};
use crate::error::{SemanticError, SyntaxError, UriError, ValidationError};
use crate::lexer::{self, Segment};
use crate::schema::property::{Property, ReferentialConstraint, Type};
use crate::schema::{Action, EdmType, FullName, Function, Primitive};
use crate::validator;

pub(crate) fn type_label(ty: &EdmType, collection: bool) -> String {
    if collection {
        format!("Collection({})", ty)
    } else {
        ty.to_string()
    }
}

/// Type of `part` as shown in error messages.
pub(crate) fn context_name(part: &ResourcePart) -> String {
    match part.effective_type() {
        Some(ty) => type_label(ty, part.collection),
        None => "void".into(),
    }
}

fn malformed(text: &str) -> UriError {
    SyntaxError::MalformedSegment {
        segment: text.to_string(),
    }
    .into()
}

fn is_pseudo(name: &str) -> bool {
    matches!(name, "$value" | "$count" | "$ref")
}

//* odataRelativeUri = '$batch'
//*                  / '$entity' "?" entityOptions
//*                  / '$entity' "/" optionallyQualifiedEntityTypeName "?" entityCastOptions
//*                  / '$metadata' [ "?" format ]
//*                  / resourcePath [ "?" queryOptions ]
/// Resolves decoded path segments into a descriptor without query options.
pub(crate) fn resolve(ctx: Context<'_>, segments: &[String]) -> Result<RequestDescriptor, UriError> {
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => return Ok(RequestDescriptor::new(RequestKind::Service)),
    };
    let head = lexer::segment(first)?;
    let kind = match head.name {
        "$metadata" => RequestKind::Metadata,
        "$batch" => RequestKind::Batch,
        "$all" => RequestKind::All,
        "$entity" => RequestKind::EntityId,
        "$crossjoin" => RequestKind::Crossjoin,
        _ => return resource_path(ctx, &head, first, rest),
    };

    let mut descriptor = RequestDescriptor::new(kind);
    if kind == RequestKind::Crossjoin {
        descriptor.crossjoin = crossjoin(ctx, &head, first)?;
    } else if !head.groups.is_empty() {
        return Err(malformed(first));
    }
    match rest {
        [] => {}
        [cast] if matches!(kind, RequestKind::All | RequestKind::EntityId) => {
            let ty = ctx
                .schema
                .resolve_type_name(cast)
                .filter(EdmType::is_entity)
                .ok_or_else(|| SemanticError::UnknownType { name: cast.clone() })?;
            descriptor.resource_path.push(ResourcePart::new(
                PartKind::TypeCast,
                ty,
                kind == RequestKind::All,
            ));
        }
        _ => {
            return Err(ValidationError::NotFinalSegment {
                segment: head.name.to_string(),
            }
            .into())
        }
    }
    Ok(descriptor)
}

//* crossjoin = '$crossjoin' OPEN entitySetName *( COMMA entitySetName ) CLOSE
fn crossjoin(ctx: Context<'_>, head: &Segment<'_>, text: &str) -> Result<Vec<String>, UriError> {
    let list = match head.groups.as_slice() {
        [list] if !list.trim().is_empty() => *list,
        _ => return Err(malformed(text)),
    };
    list.split(',')
        .map(str::trim)
        .map(|name| {
            if ctx.schema.entity_set(name).is_some() {
                Ok(name.to_string())
            } else {
                Err(UriError::from(SemanticError::UnknownResource {
                    name: name.to_string(),
                }))
            }
        })
        .collect()
}

fn resource_path(
    ctx: Context<'_>,
    head: &Segment<'_>,
    text: &str,
    rest: &[String],
) -> Result<RequestDescriptor, UriError> {
    let mut descriptor = RequestDescriptor::new(RequestKind::Resource);
    let first = root(ctx, head, text, 0)?;
    trace!(segment = text, kind = first.kind.label(), "resolved");
    descriptor.resource_path.push(first);

    for text in rest {
        let segment = lexer::segment(text)?;
        next(ctx, &mut descriptor.resource_path, &segment, text)?;
        if let Some(part) = descriptor.resource_path.last() {
            trace!(segment = text.as_str(), kind = part.kind.label(), "resolved");
        }
    }
    Ok(descriptor)
}

fn call_groups<'s>(head: &Segment<'s>, text: &str) -> Result<(&'s str, Option<&'s str>), UriError> {
    match head.groups.as_slice() {
        [params] => Ok((*params, None)),
        [params, keys] => Ok((*params, Some(*keys))),
        _ => Err(malformed(text)),
    }
}

fn function_part(
    name: FullName,
    import: Option<String>,
    parameters: Vec<crate::ast::Parameter>,
    function: &Function,
) -> ResourcePart {
    ResourcePart::new(
        PartKind::Function {
            name,
            import,
            parameters,
            composable: function.is_composable,
        },
        function.return_type.kind.clone(),
        function.return_type.collection,
    )
}

fn action_part(name: FullName, import: Option<String>, action: &Action) -> ResourcePart {
    let kind = PartKind::Action { name, import };
    match &action.return_type {
        Some(ret) => ResourcePart::new(kind, ret.kind.clone(), ret.collection),
        None => ResourcePart::untyped(kind),
    }
}

//* resourcePath = entitySetName [ collectionNavigation ]
//*              / singletonEntity [ singleNavigation ]
//*              / actionImportCall
//*              / entityColFunctionImportCall [ collectionNavigation ]
//*              / ...
/// Resolves the first segment of a resource path (or of a `$root/...`
/// member path) against the entity container.
pub(crate) fn root(
    ctx: Context<'_>,
    head: &Segment<'_>,
    text: &str,
    depth: usize,
) -> Result<ResourcePart, UriError> {
    let name = head.name;

    if let Some(set) = ctx.schema.entity_set(name) {
        let mut part = ResourcePart::new(
            PartKind::EntitySet { name: name.into() },
            EdmType::Entity(set.kind.clone()),
            true,
        );
        match head.groups.as_slice() {
            [] => {}
            [keys] => key::apply(ctx, &mut part, keys, &[])?,
            _ => return Err(malformed(text)),
        }
        return Ok(part);
    }

    if let Some(singleton) = ctx.schema.singleton(name) {
        if !head.groups.is_empty() {
            return Err(ValidationError::KeyNotAllowed {
                segment: name.into(),
            }
            .into());
        }
        return Ok(ResourcePart::new(
            PartKind::Singleton { name: name.into() },
            EdmType::Entity(singleton.kind.clone()),
            false,
        ));
    }

    if let Some(import) = ctx.schema.function_import(name) {
        let (params, keys) = call_groups(head, text)?;
        let qualified = ctx
            .schema
            .normalize(&import.function)
            .unwrap_or_else(|| import.function.clone());
        let mut parameters = key::parameters(ctx, name, params, depth)?;
        let function = key::resolve_function(ctx, &qualified, None, &parameters)?;
        key::check_parameters(ctx, name, function.call_parameters(), &mut parameters)?;
        let mut part = function_part(qualified, Some(name.into()), parameters, function);
        if let Some(keys) = keys {
            key::apply(ctx, &mut part, keys, &[])?;
        }
        return Ok(part);
    }

    if let Some(import) = ctx.schema.action_import(name) {
        if !head.groups.is_empty() {
            return Err(malformed(text));
        }
        let qualified = ctx
            .schema
            .normalize(&import.action)
            .unwrap_or_else(|| import.action.clone());
        let action = key::resolve_action(ctx, &qualified, None)?;
        return Ok(action_part(qualified, Some(name.into()), action));
    }

    Err(SemanticError::UnknownResource { name: name.into() }.into())
}

/// Resolves a path segment after the first one.
fn next(
    ctx: Context<'_>,
    parts: &mut Vec<ResourcePart>,
    segment: &Segment<'_>,
    text: &str,
) -> Result<(), UriError> {
    let name = segment.name;
    if let Some(prev) = parts.last() {
        if validator::ends_path(prev, is_pseudo(name)) {
            return Err(ValidationError::NotFinalSegment {
                segment: prev.segment_name(),
            }
            .into());
        }
    }

    match name {
        "$value" | "$count" | "$ref" => {
            if !segment.groups.is_empty() {
                return Err(malformed(text));
            }
            let part = pseudo(ctx, parts, name)?;
            parts.push(part);
            Ok(())
        }
        "$metadata" | "$batch" | "$all" | "$entity" | "$crossjoin" => {
            Err(ValidationError::NotFirstSegment {
                segment: name.into(),
            }
            .into())
        }
        _ => step(ctx, parts, name, &segment.groups, 0),
    }
}

/// Resolves `$value`, `$count` or `$ref` after `parts`.
pub(crate) fn pseudo(
    ctx: Context<'_>,
    parts: &[ResourcePart],
    name: &str,
) -> Result<ResourcePart, UriError> {
    let prev = parts.last().ok_or_else(|| SemanticError::UnknownResource {
        name: name.to_string(),
    })?;
    let context = context_name(prev);
    let ty = prev.effective_type().cloned();

    let part = match (name, ty) {
        ("$count", _) if prev.collection => ResourcePart::new(
            PartKind::Count,
            EdmType::Primitive(Primitive::Int64),
            false,
        ),
        ("$count", _) => {
            return Err(SemanticError::NotACollection {
                segment: name.into(),
                context,
            }
            .into())
        }
        ("$ref", Some(ty @ EdmType::Entity(_))) => ResourcePart::new(PartKind::Ref, ty, prev.collection),
        ("$value", Some(ty)) if !prev.collection && ctx.schema.is_media_entity(&ty) => {
            ResourcePart::new(PartKind::Value, EdmType::Primitive(Primitive::Stream), false)
        }
        ("$value", Some(ty @ (EdmType::Primitive(_) | EdmType::Enum(_)))) if !prev.collection => {
            ResourcePart::new(PartKind::Value, ty, false)
        }
        _ => {
            return Err(SemanticError::UnresolvableSegment {
                name: name.into(),
                context,
            }
            .into())
        }
    };
    Ok(part)
}

/// Resolves one named segment (property, type cast or bound operation)
/// against the last of `parts` and appends it.
///
/// `groups` are the parenthesized groups that followed the name; `depth` is
/// the expression nesting the segment occurs at.
pub(crate) fn step(
    ctx: Context<'_>,
    parts: &mut Vec<ResourcePart>,
    name: &str,
    groups: &[&str],
    depth: usize,
) -> Result<(), UriError> {
    let (ty, collection, context) = match parts.last() {
        Some(prev) => (prev.effective_type().cloned(), prev.collection, context_name(prev)),
        None => return Err(SemanticError::UnknownResource { name: name.into() }.into()),
    };

    if !name.contains('.') {
        return property(ctx, parts, name, groups, ty, collection, context);
    }
    if let Some(target) = ctx.schema.resolve_type_name(name) {
        return cast(ctx, parts, target, name, groups);
    }

    let qualified = FullName::parse(name).and_then(|n| ctx.schema.normalize(&n));
    if let (Some(qualified), Some(binding)) = (qualified, ty) {
        if !ctx.schema.functions(&qualified).is_empty() {
            let (params, keys) = match groups {
                [params] => (*params, None),
                [params, keys] => (*params, Some(*keys)),
                _ => return Err(malformed(name)),
            };
            let mut parameters = key::parameters(ctx, name, params, depth)?;
            let function =
                key::resolve_function(ctx, &qualified, Some((&binding, collection)), &parameters)?;
            key::check_parameters(ctx, name, function.call_parameters(), &mut parameters)?;
            let mut part = function_part(qualified, None, parameters, function);
            if let Some(keys) = keys {
                key::apply(ctx, &mut part, keys, &[])?;
            }
            parts.push(part);
            return Ok(());
        }
        if !ctx.schema.actions(&qualified).is_empty() {
            if !groups.is_empty() {
                return Err(malformed(name));
            }
            let action = key::resolve_action(ctx, &qualified, Some((&binding, collection)))?;
            parts.push(action_part(qualified, None, action));
            return Ok(());
        }
    }

    Err(SemanticError::UnresolvableSegment {
        name: name.into(),
        context,
    }
    .into())
}

fn property(
    ctx: Context<'_>,
    parts: &mut Vec<ResourcePart>,
    name: &str,
    groups: &[&str],
    ty: Option<EdmType>,
    collection: bool,
    context: String,
) -> Result<(), UriError> {
    let found = ty
        .as_ref()
        .filter(|t| t.is_structured())
        .and_then(|t| ctx.schema.property(t, name));
    let property = match found {
        Some(property) => property,
        None => return Err(SemanticError::UnknownProperty { name: name.into(), context }.into()),
    };
    if collection {
        return Err(SemanticError::UnresolvableSegment { name: name.into(), context }.into());
    }

    let part = match property {
        Property::Structural(s) => {
            if !groups.is_empty() {
                return Err(ValidationError::KeyNotAllowed { segment: name.into() }.into());
            }
            let kind = match s.kind {
                Type::Complex(_) => PartKind::ComplexProperty { name: name.into() },
                _ => PartKind::PrimitiveProperty { name: name.into() },
            };
            ResourcePart::new(kind, s.kind.edm_type(), s.collection)
        }
        Property::Navigation(n) => {
            let mut part = ResourcePart::new(
                PartKind::Navigation { name: name.into() },
                EdmType::Entity(n.kind.clone()),
                n.collection,
            );
            match groups {
                [] => {}
                [keys] => key::apply(ctx, &mut part, keys, &n.referential_constraints)?,
                _ => return Err(malformed(name)),
            }
            part
        }
    };
    parts.push(part);
    Ok(())
}

/// Referential constraints of the navigation property `parts` ends with.
fn navigation_constraints(ctx: Context<'_>, parts: &[ResourcePart]) -> Vec<ReferentialConstraint> {
    let (source, last) = match parts {
        [.., source, last] => (source, last),
        _ => return Vec::new(),
    };
    let name = match &last.kind {
        PartKind::Navigation { name } => name,
        _ => return Vec::new(),
    };
    match source.effective_type().and_then(|t| ctx.schema.property(t, name)) {
        Some(Property::Navigation(n)) => n.referential_constraints.clone(),
        _ => Vec::new(),
    }
}

//* qualifiedEntityTypeName / qualifiedComplexTypeName as a path segment
/// Applies a type cast. Segments with type filter slots take the cast into
/// the collection slot (before a key) or the entry slot (after a key, or on
/// a single-valued segment); each slot can be filled once.
fn cast(
    ctx: Context<'_>,
    parts: &mut Vec<ResourcePart>,
    target: EdmType,
    name: &str,
    groups: &[&str],
) -> Result<(), UriError> {
    let constraints = navigation_constraints(ctx, parts);
    let prev = match parts.last_mut() {
        Some(prev) => prev,
        None => return Err(SemanticError::UnknownResource { name: name.into() }.into()),
    };
    let base = prev.effective_type().cloned();
    match &base {
        Some(base) if ctx.schema.is_subtype(&target, base) => {}
        _ => {
            return Err(SemanticError::NotASubtype {
                name: target.to_string(),
                base: base.as_ref().map_or_else(|| "void".into(), |b| b.to_string()),
            }
            .into())
        }
    }

    if !prev.accepts_type_filter() {
        let mut part = ResourcePart::new(PartKind::TypeCast, target, prev.collection);
        match groups {
            [] => {}
            [keys] => key::apply(ctx, &mut part, keys, &[])?,
            _ => return Err(malformed(name)),
        }
        parts.push(part);
        return Ok(());
    }

    let segment = prev.segment_name();
    let chained = || SemanticError::TypeFilterNotChainable {
        name: name.into(),
        segment: segment.clone(),
    };
    if prev.collection {
        if prev.type_filter_on_collection.is_some() {
            return Err(chained().into());
        }
        prev.type_filter_on_collection = Some(target);
        match groups {
            [] => {}
            [keys] => key::apply(ctx, prev, keys, &constraints)?,
            _ => return Err(malformed(name)),
        }
    } else {
        if prev.type_filter_on_entry.is_some() {
            return Err(chained().into());
        }
        if !groups.is_empty() {
            return Err(ValidationError::KeyNotAllowed { segment: name.into() }.into());
        }
        prev.type_filter_on_entry = Some(target);
    }
    Ok(())
}

/// Appends a bound operation named without parameters, as `$select` items
/// refer to them.
pub(crate) fn operation_reference(
    ctx: Context<'_>,
    parts: &mut Vec<ResourcePart>,
    name: &str,
) -> Result<(), UriError> {
    let (ty, collection, context) = match parts.last() {
        Some(prev) => (prev.effective_type().cloned(), prev.collection, context_name(prev)),
        None => return Err(SemanticError::UnknownResource { name: name.into() }.into()),
    };
    let unresolvable = || SemanticError::UnresolvableSegment {
        name: name.into(),
        context: context.clone(),
    };
    let qualified = FullName::parse(name)
        .and_then(|n| ctx.schema.normalize(&n))
        .ok_or_else(unresolvable)?;
    let binding = ty.ok_or_else(unresolvable)?;
    let binding = Some((&binding, collection));

    if let Some(function) = ctx
        .schema
        .functions(&qualified)
        .into_iter()
        .find(|f| key::binds(ctx, f.binding(), f.is_bound, binding))
    {
        parts.push(function_part(qualified, None, Vec::new(), function));
        return Ok(());
    }
    if let Some(action) = ctx
        .schema
        .actions(&qualified)
        .into_iter()
        .find(|a| key::binds(ctx, a.binding(), a.is_bound, binding))
    {
        parts.push(action_part(qualified, None, action));
        return Ok(());
    }
    Err(SemanticError::NoMatchingOperation {
        name: name.into(),
        context,
    }
    .into())
}
