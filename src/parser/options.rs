//! System query options, aliases and custom options.

use std::str::FromStr;

use nom::{
    character::complete::digit1,
    combinator::{all_consuming, map_res},
    IResult,
};
use tracing::trace;

use super::{expr, literal, path, Context, Target};
use crate::ast::{ExpandItem, Levels, PartKind, QueryOptions, SelectItem, SystemOption};
use crate::error::{SemanticError, SyntaxError, UriError, ValidationError};
use crate::lexer::{self, split_top_level, QueryPair};

/// Options an `$expand` item may carry in parentheses.
const NESTED: [SystemOption; 9] = [
    SystemOption::Filter,
    SystemOption::Select,
    SystemOption::Expand,
    SystemOption::OrderBy,
    SystemOption::Top,
    SystemOption::Skip,
    SystemOption::Count,
    SystemOption::Search,
    SystemOption::Levels,
];

fn malformed(text: &str) -> UriError {
    SyntaxError::MalformedSegment {
        segment: text.to_string(),
    }
    .into()
}

fn duplicate(name: &str) -> SyntaxError {
    SyntaxError::DuplicateOption {
        name: name.to_string(),
    }
}

/// The system options of a query, by name only, so they can be checked
/// against the request before their values are parsed.
pub(crate) fn system_options(pairs: &[QueryPair]) -> Result<Vec<SystemOption>, SyntaxError> {
    let mut seen = Vec::new();
    for pair in pairs.iter().filter(|p| p.name.starts_with('$')) {
        let option = SystemOption::from_name(&pair.name).ok_or_else(|| SyntaxError::UnknownSystemOption {
            name: pair.name.clone(),
        })?;
        if seen.contains(&option) {
            return Err(duplicate(option.name()));
        }
        seen.push(option);
    }
    Ok(seen)
}

/// Parses all query pairs against the request's target.
pub(crate) fn parse(ctx: Context<'_>, target: &Target, pairs: &[QueryPair]) -> Result<QueryOptions, UriError> {
    let mut options = QueryOptions::default();
    for pair in pairs {
        if let Some(alias) = pair.name.strip_prefix('@') {
            if all_consuming(literal::identifier)(alias).is_err() {
                return Err(SyntaxError::MalformedQueryOption {
                    text: pair.name.clone(),
                }
                .into());
            }
            if options
                .aliases
                .insert(pair.name.clone(), pair.value.clone())
                .is_some()
            {
                return Err(duplicate(&pair.name).into());
            }
        } else if pair.name.starts_with('$') {
            let option = SystemOption::from_name(&pair.name).ok_or_else(|| SyntaxError::UnknownSystemOption {
                name: pair.name.clone(),
            })?;
            apply(ctx, target, &mut options, option, &pair.value, 1)?;
        } else {
            options.custom.push((pair.name.clone(), pair.value.clone()));
        }
    }
    Ok(options)
}

//* top  = ( "$top" / "top" ) EQ 1*DIGIT
//* skip = ( "$skip" / "skip" ) EQ 1*DIGIT
fn unsigned<T: FromStr>(value: &str) -> Option<T> {
    let parsed: IResult<&str, T> = all_consuming(map_res(digit1, str::parse::<T>))(value);
    parsed.ok().map(|(_, n)| n)
}

/// Parses one system option into `options`. `depth` is the `$expand`
/// nesting the option occurs at, 1 for the top level.
fn apply(
    ctx: Context<'_>,
    target: &Target,
    options: &mut QueryOptions,
    option: SystemOption,
    value: &str,
    depth: usize,
) -> Result<(), UriError> {
    if options.present().contains(&option) {
        return Err(duplicate(option.name()).into());
    }
    let invalid = || SyntaxError::InvalidOptionValue {
        option: option.name().into(),
        value: value.to_string(),
    };
    let text = || Some(value.to_string()).filter(|v| !v.is_empty());

    match option {
        SystemOption::Filter => options.filter = Some(expr::parse_filter(ctx, target, value)?),
        SystemOption::OrderBy => options.orderby = Some(expr::parse_orderby(ctx, target, value)?),
        SystemOption::Search => {
            options.search = Some(expr::parse_search(value, ctx.config.max_expression_depth)?)
        }
        SystemOption::Select => options.select = Some(select(ctx, target, value)?),
        SystemOption::Expand => options.expand = Some(expand(ctx, target, value, depth)?),
        SystemOption::Top => options.top = Some(unsigned(value).ok_or_else(invalid)?),
        SystemOption::Skip => options.skip = Some(unsigned(value).ok_or_else(invalid)?),
        SystemOption::Count => {
            options.count = Some(match value {
                "true" => true,
                "false" => false,
                _ => return Err(invalid().into()),
            })
        }
        SystemOption::Levels => {
            options.levels = Some(if value.eq_ignore_ascii_case("max") {
                Levels::Max
            } else {
                Levels::Number(unsigned(value).ok_or_else(invalid)?)
            })
        }
        SystemOption::Format => options.format = Some(text().ok_or_else(invalid)?),
        SystemOption::Id => options.id = Some(text().ok_or_else(invalid)?),
        SystemOption::SkipToken => options.skip_token = Some(value.to_string()),
        SystemOption::DeltaToken => options.delta_token = Some(value.to_string()),
    }
    trace!(%option, depth, "option");
    Ok(())
}

//* select     = ( "$select" / "select" ) EQ selectItem *( COMMA selectItem )
//* selectItem = STAR
//*            / allOperationsInSchema
//*            / [ qualifiedEntityTypeName "/" ] ( selectProperty / qualifiedActionName / qualifiedFunctionName )
fn select(ctx: Context<'_>, target: &Target, value: &str) -> Result<Vec<SelectItem>, UriError> {
    split_top_level(value, ',')?
        .into_iter()
        .map(|item| select_item(ctx, target, item.trim()))
        .collect()
}

fn select_item(ctx: Context<'_>, target: &Target, text: &str) -> Result<SelectItem, UriError> {
    if text == "*" {
        return Ok(SelectItem {
            star: true,
            ..SelectItem::default()
        });
    }
    if let Some(qualifier) = text.strip_suffix(".*") {
        let namespace = ctx
            .schema
            .namespace_of(qualifier)
            .ok_or_else(|| SemanticError::UnknownType { name: text.into() })?;
        return Ok(SelectItem {
            all_operations: Some(namespace.to_string()),
            ..SelectItem::default()
        });
    }

    let mut parts = vec![target.it_part(text)?];
    for raw in split_top_level(text, '/')? {
        let segment = lexer::segment(raw)?;
        if !segment.groups.is_empty() {
            return Err(malformed(raw));
        }
        let name = segment.name;
        if name.contains('.') && ctx.schema.resolve_type_name(name).is_none() {
            path::operation_reference(ctx, &mut parts, name)?;
        } else {
            path::step(ctx, &mut parts, name, &[], 0)?;
        }
    }
    parts.remove(0);

    let mut item = SelectItem::default();
    if matches!(parts.first(), Some(p) if matches!(p.kind, PartKind::TypeCast)) {
        item.start_type_filter = parts.remove(0).ty;
    }
    item.path = parts;
    Ok(item)
}

//* expand     = ( "$expand" / "expand" ) EQ expandItem *( COMMA expandItem )
//* expandItem = STAR [ ref / OPEN levels CLOSE ]
//*            / [ qualifiedEntityTypeName "/" ] expandPath
//*              [ ref   [ OPEN expandRefOption   *( SEMI expandRefOption   ) CLOSE ]
//*              / count [ OPEN expandCountOption *( SEMI expandCountOption ) CLOSE ]
//*              /         OPEN expandOption      *( SEMI expandOption      ) CLOSE
//*              ]
fn expand(ctx: Context<'_>, target: &Target, value: &str, depth: usize) -> Result<Vec<ExpandItem>, UriError> {
    let limit = ctx.config.max_expand_depth;
    if depth > limit {
        return Err(ValidationError::DepthExceeded {
            what: "$expand".into(),
            limit,
        }
        .into());
    }
    split_top_level(value, ',')?
        .into_iter()
        .map(|item| expand_item(ctx, target, item.trim(), depth))
        .collect()
}

fn expand_item(ctx: Context<'_>, target: &Target, text: &str, depth: usize) -> Result<ExpandItem, UriError> {
    let raw = split_top_level(text, '/')?;
    let last = raw.len() - 1;
    let mut item = ExpandItem::default();
    let mut parts = vec![target.it_part(text)?];
    let mut nested = None;

    for (position, raw_segment) in raw.iter().enumerate() {
        let segment = lexer::segment(raw_segment)?;
        match segment.groups.as_slice() {
            [] => {}
            [options] if position == last => nested = Some(*options),
            _ => return Err(malformed(raw_segment)),
        }
        match segment.name {
            "*" if position == 0 => item.star = true,
            "$ref" if position == last && position > 0 => item.is_ref = true,
            "$count" if position == last && position > 0 && !item.star => item.is_count = true,
            "*" | "$ref" | "$count" => return Err(malformed(raw_segment)),
            _ if item.star => return Err(malformed(raw_segment)),
            name => path::step(ctx, &mut parts, name, &[], 0)?,
        }
    }
    parts.remove(0);
    if matches!(parts.first(), Some(p) if matches!(p.kind, PartKind::TypeCast)) {
        item.start_type_filter = parts.remove(0).ty;
    }

    let nested_target = if item.star {
        Target::default()
    } else {
        match parts.last() {
            Some(part) if matches!(part.kind, PartKind::Navigation { .. }) => Target::of_part(part),
            Some(part) => {
                return Err(SemanticError::UnresolvableSegment {
                    name: text.to_string(),
                    context: path::context_name(part),
                }
                .into())
            }
            None => return Err(malformed(text)),
        }
    };
    item.path = parts;

    if let Some(group) = nested {
        item.options = nested_options(ctx, &nested_target, group, depth)?;
    }
    Ok(item)
}

//* expandOption = filter / search / orderby / skip / top / inlinecount / select / expand / levels
fn nested_options(ctx: Context<'_>, target: &Target, text: &str, depth: usize) -> Result<QueryOptions, UriError> {
    let mut options = QueryOptions::default();
    for piece in split_top_level(text, ';')? {
        let piece = piece.trim();
        let (name, value) = piece.split_once('=').ok_or_else(|| SyntaxError::MalformedQueryOption {
            text: piece.to_string(),
        })?;
        let option = match SystemOption::from_name(name) {
            Some(option) => option,
            None if name.starts_with('$') => {
                return Err(SyntaxError::UnknownSystemOption { name: name.into() }.into())
            }
            None => {
                return Err(SyntaxError::MalformedQueryOption {
                    text: piece.to_string(),
                }
                .into())
            }
        };
        if !NESTED.contains(&option) {
            return Err(ValidationError::OptionNotAllowed {
                option: option.name().into(),
                target: "expand item".into(),
                method: "GET".into(),
            }
            .into());
        }
        apply(ctx, target, &mut options, option, value, depth + 1)?;
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(name: &str, value: &str) -> QueryPair {
        QueryPair {
            name: name.into(),
            value: value.into(),
        }
    }

    #[test]
    fn system_option_names_are_case_insensitive() {
        let found = system_options(&[pair("$TOP", "1"), pair("x", "y"), pair("$filter", "")]).unwrap();
        assert_eq!(found, vec![SystemOption::Top, SystemOption::Filter]);
    }

    #[test]
    fn repeated_and_unknown_system_options() {
        assert_eq!(
            system_options(&[pair("$top", "1"), pair("$Top", "2")]),
            Err(SyntaxError::DuplicateOption {
                name: "$top".into()
            })
        );
        assert!(matches!(
            system_options(&[pair("$nope", "1")]),
            Err(SyntaxError::UnknownSystemOption { .. })
        ));
    }

    #[test]
    fn unsigned_values() {
        assert_eq!(unsigned::<u64>("42"), Some(42));
        assert_eq!(unsigned::<u64>("-1"), None);
        assert_eq!(unsigned::<u64>("1e3"), None);
        assert_eq!(unsigned::<u64>(""), None);
        assert_eq!(unsigned::<u32>("99999999999"), None);
    }
}
