//! Primitive literals.
//!
//! The grammar recognizes a literal and infers its type from its lexical
//! form; [`coerce`] then converts it to a declared type where one is known
//! (key properties, function parameters, comparisons with typed members).

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_while, take_while_m_n},
    character::complete::{char as pchar, digit1, one_of, satisfy, space0, space1},
    combinator::{all_consuming, consumed, map, map_opt, map_res, not, opt, recognize, value, verify},
    multi::{many0, many1, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ast::{Geo, Literal, LiteralValue, Polygon, Position, Shape};
use crate::error::{SemanticError, SyntaxError};
use crate::schema::property::Facets;
use crate::schema::{EdmType, FullName, Primitive, SchemaAccess};

// Nesting bound for geography/geometry collections.
const MAX_GEO_DEPTH: usize = 8;

type Typed = (Option<EdmType>, LiteralValue);

pub(crate) fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

//* odataIdentifier = identifierLeadingCharacter *127identifierCharacter
pub(crate) fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_ident_start), take_while(is_ident_char)))(input)
}

//* qualifiedName = namespace "." odataIdentifier
//* namespace     = namespacePart *( "." namespacePart )
pub(crate) fn qualified_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(identifier, many1(pair(pchar('.'), identifier))))(input)
}

fn boundary(input: &str) -> IResult<&str, ()> {
    not(satisfy(is_ident_char))(input)
}

fn typed<'a, F>(mut f: F) -> impl FnMut(&'a str) -> IResult<&'a str, Typed>
where
    F: FnMut(&'a str) -> IResult<&'a str, LiteralValue>,
{
    move |input| {
        let (input, value) = f(input)?;
        Ok((input, (value_type(&value), value)))
    }
}

fn value_type(value: &LiteralValue) -> Option<EdmType> {
    let primitive = match value {
        LiteralValue::Null | LiteralValue::Enum(_) | LiteralValue::Geo(_) => return None,
        LiteralValue::Boolean(_) => Primitive::Boolean,
        LiteralValue::Integer(v) if i32::try_from(*v).is_ok() => Primitive::Int32,
        LiteralValue::Integer(_) => Primitive::Int64,
        LiteralValue::Decimal(_) => Primitive::Decimal,
        LiteralValue::Double(_) => Primitive::Double,
        LiteralValue::String(_) => Primitive::String,
        LiteralValue::Guid(_) => Primitive::Guid,
        LiteralValue::Date(_) => Primitive::Date,
        LiteralValue::DateTimeOffset(_) => Primitive::DateTimeOffset,
        LiteralValue::TimeOfDay(_) => Primitive::TimeOfDay,
        LiteralValue::Duration(_) => Primitive::Duration,
        LiteralValue::Binary(_) => Primitive::Binary,
    };
    Some(EdmType::Primitive(primitive))
}

/// Parses one complete literal.
pub fn literal(text: &str) -> Result<Literal, SyntaxError> {
    match all_consuming(literal_prefix)(text) {
        Ok((_, lit)) => Ok(lit),
        Err(_) => Err(SyntaxError::InvalidLiteral {
            kind: "primitive".into(),
            text: text.to_string(),
        }),
    }
}

//*
//* primitiveLiteral = nullValue
//*                  / booleanValue
//*                  / guidValue
//*                  / dateTimeOffsetValueInUrl
//*                  / dateValue
//*                  / timeOfDayValueInUrl
//*                  / duration
//*                  / binary
//*                  / geographyLiteral / geometryLiteral
//*                  / enum
//*                  / string
//*                  / decimalValue / doubleValue / int64Value
/// Recognizes a literal at the start of `input`.
pub(crate) fn literal_prefix(input: &str) -> IResult<&str, Literal> {
    let (rest, (text, (ty, value))) = consumed(alt((
        terminated(typed(null_value), boundary),
        terminated(typed(boolean_value), boundary),
        terminated(typed(map(guid_value, LiteralValue::Guid)), boundary),
        terminated(
            typed(map(date_time_offset_value, LiteralValue::DateTimeOffset)),
            boundary,
        ),
        terminated(typed(map(date_value, LiteralValue::Date)), boundary),
        terminated(typed(map(time_of_day_value, LiteralValue::TimeOfDay)), boundary),
        typed(duration),
        typed(binary),
        geo_literal,
        enum_literal,
        typed(map(string, LiteralValue::String)),
        terminated(typed(number), boundary),
    )))(input)?;
    Ok((
        rest,
        Literal {
            text: text.to_string(),
            ty,
            value,
        },
    ))
}

//* nullValue = 'null'
fn null_value(input: &str) -> IResult<&str, LiteralValue> {
    value(LiteralValue::Null, tag("null"))(input)
}

//* booleanValue = "true" / "false"
fn boolean_value(input: &str) -> IResult<&str, LiteralValue> {
    alt((
        value(LiteralValue::Boolean(true), tag_no_case("true")),
        value(LiteralValue::Boolean(false), tag_no_case("false")),
    ))(input)
}

fn hex(n: usize) -> impl Fn(&str) -> IResult<&str, &str> {
    move |input| take_while_m_n(n, n, |c: char| c.is_ascii_hexdigit())(input)
}

//* guidValue = 8HEXDIG "-" 4HEXDIG "-" 4HEXDIG "-" 4HEXDIG "-" 12HEXDIG
fn guid_value(input: &str) -> IResult<&str, Uuid> {
    map_res(
        recognize(tuple((
            hex(8),
            pchar('-'),
            hex(4),
            pchar('-'),
            hex(4),
            pchar('-'),
            hex(4),
            pchar('-'),
            hex(12),
        ))),
        Uuid::parse_str,
    )(input)
}

fn digits(n: usize) -> impl Fn(&str) -> IResult<&str, u32> {
    move |input| map_res(take_while_m_n(n, n, |c: char| c.is_ascii_digit()), u32::from_str)(input)
}

//* dateValue = year "-" month "-" day
fn date_value(input: &str) -> IResult<&str, NaiveDate> {
    map_opt(
        tuple((digits(4), pchar('-'), digits(2), pchar('-'), digits(2))),
        |(year, _, month, _, day)| NaiveDate::from_ymd_opt(year as i32, month, day),
    )(input)
}

fn nanos(fraction: Option<&str>) -> u32 {
    match fraction {
        Some(f) => {
            let significant = &f[..f.len().min(9)];
            format!("{:0<9}", significant).parse().unwrap_or(0)
        }
        None => 0,
    }
}

//* timeOfDayValue = hour ":" minute [ ":" second [ "." fractionalSeconds ] ]
//* fractionalSeconds = 1*12DIGIT
fn time_of_day_value(input: &str) -> IResult<&str, NaiveTime> {
    map_opt(
        tuple((
            digits(2),
            preceded(pchar(':'), digits(2)),
            opt(pair(
                preceded(pchar(':'), digits(2)),
                opt(preceded(
                    pchar('.'),
                    take_while_m_n(1, 12, |c: char| c.is_ascii_digit()),
                )),
            )),
        )),
        |(hour, minute, rest)| {
            let (second, fraction) = rest.unwrap_or((0, None));
            NaiveTime::from_hms_nano_opt(hour, minute, second, nanos(fraction))
        },
    )(input)
}

//* timeZone = "Z" / SIGN hour ":" minute
fn time_zone(input: &str) -> IResult<&str, FixedOffset> {
    alt((
        map_opt(tag_no_case("Z"), |_| FixedOffset::east_opt(0)),
        map_opt(
            tuple((one_of("+-"), digits(2), pchar(':'), digits(2))),
            |(sign, hour, _, minute)| {
                let seconds = (hour * 3600 + minute * 60) as i32;
                FixedOffset::east_opt(if sign == '-' { -seconds } else { seconds })
            },
        ),
    ))(input)
}

//* dateTimeOffsetValue = year "-" month "-" day "T" timeOfDayValue timeZone
fn date_time_offset_value(input: &str) -> IResult<&str, DateTime<FixedOffset>> {
    map_opt(
        tuple((date_value, tag_no_case("T"), time_of_day_value, time_zone)),
        |(date, _, time, zone)| zone.from_local_datetime(&date.and_time(time)).single(),
    )(input)
}

//* durationValue = [ SIGN ] "P" [ 1*DIGIT "D" ] [ "T" [ 1*DIGIT "H" ] [ 1*DIGIT "M" ] [ 1*DIGIT [ "." 1*DIGIT ] "S" ] ]
fn duration_value(input: &str) -> IResult<&str, &str> {
    verify(
        recognize(tuple((
            opt(one_of("+-")),
            tag_no_case("P"),
            opt(pair(digit1, tag_no_case("D"))),
            opt(tuple((
                tag_no_case("T"),
                opt(pair(digit1, tag_no_case("H"))),
                opt(pair(digit1, tag_no_case("M"))),
                opt(tuple((
                    digit1,
                    opt(pair(pchar('.'), digit1)),
                    tag_no_case("S"),
                ))),
            ))),
        ))),
        |s: &str| !matches!(s.chars().last(), Some('P' | 'p' | 'T' | 't')),
    )(input)
}

fn is_duration(text: &str) -> bool {
    all_consuming(duration_value)(text).is_ok()
}

//* duration = "duration" SQUOTE durationValue SQUOTE
fn duration(input: &str) -> IResult<&str, LiteralValue> {
    map(
        preceded(
            tag_no_case("duration"),
            delimited(pchar('\''), duration_value, pchar('\'')),
        ),
        |d: &str| LiteralValue::Duration(d.to_string()),
    )(input)
}

fn is_base64char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

//* binary      = "binary" SQUOTE binaryValue SQUOTE
//* binaryValue = *(4base64char) [ base64b16  / base64b8 ]
fn binary(input: &str) -> IResult<&str, LiteralValue> {
    map(
        preceded(
            tag_no_case("binary"),
            delimited(
                pchar('\''),
                verify(
                    pair(take_while(is_base64char), opt(alt((tag("=="), tag("="))))),
                    |(data, padding): &(&str, Option<&str>)| match padding {
                        Some(p) => (data.len() + p.len()) % 4 == 0,
                        None => data.len() % 4 != 1,
                    },
                ),
                pchar('\''),
            ),
        ),
        |(data, padding)| {
            LiteralValue::Binary(format!("{}{}", data, padding.unwrap_or_default()))
        },
    )(input)
}

//* string           = SQUOTE *( SQUOTE-in-string / pchar-no-SQUOTE ) SQUOTE
//* SQUOTE-in-string = SQUOTE SQUOTE
pub(crate) fn string(input: &str) -> IResult<&str, String> {
    delimited(
        pchar('\''),
        map(recognize(many0(alt((tag("''"), is_not("'"))))), |s: &str| {
            s.replace("''", "'")
        }),
        pchar('\''),
    )(input)
}

//* nanInfinity = 'NaN' / '-INF' / 'INF'
fn nan_infinity(input: &str) -> IResult<&str, f64> {
    alt((
        value(f64::NAN, tag("NaN")),
        value(f64::NEG_INFINITY, tag("-INF")),
        value(f64::INFINITY, tag("INF")),
    ))(input)
}

//* decimalValue = [ SIGN ] 1*DIGIT [ "." 1*DIGIT ] [ "e" [ SIGN ] 1*DIGIT ]
fn decimal_text(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(one_of("+-")),
        digit1,
        opt(pair(pchar('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)
}

// Integers are Int32/Int64 by range, falling back to Decimal; a fractional
// part makes a Decimal and an exponent a Double.
fn number_value(text: &str) -> Result<LiteralValue, std::num::ParseFloatError> {
    let unsigned = text.strip_prefix('+').unwrap_or(text);
    if unsigned.contains(['e', 'E']) {
        return unsigned.parse().map(LiteralValue::Double);
    }
    if !unsigned.contains('.') {
        if let Ok(v) = unsigned.parse::<i64>() {
            return Ok(LiteralValue::Integer(v));
        }
    }
    match Decimal::from_str(unsigned) {
        Ok(d) => Ok(LiteralValue::Decimal(d)),
        Err(_) => unsigned.parse().map(LiteralValue::Double),
    }
}

fn number(input: &str) -> IResult<&str, LiteralValue> {
    alt((
        map(nan_infinity, LiteralValue::Double),
        map_res(decimal_text, number_value),
    ))(input)
}

//* enum            = qualifiedEnumTypeName SQUOTE enumValue SQUOTE
//* enumValue       = singleEnumValue *( COMMA singleEnumValue )
//* singleEnumValue = enumerationMember / enumMemberValue
fn enum_literal(input: &str) -> IResult<&str, Typed> {
    map_opt(
        pair(
            qualified_name,
            delimited(
                pchar('\''),
                separated_list1(
                    pchar(','),
                    alt((identifier, recognize(pair(opt(pchar('-')), digit1)))),
                ),
                pchar('\''),
            ),
        ),
        |(name, members): (&str, Vec<&str>)| {
            let ty = EdmType::Enum(FullName::parse(name)?);
            let members = members.into_iter().map(String::from).collect();
            Some((Some(ty), LiteralValue::Enum(members)))
        },
    )(input)
}

fn comma(input: &str) -> IResult<&str, ()> {
    value((), pair(pchar(','), space0))(input)
}

fn parens<'a, O, F>(f: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(pchar('('), f, pchar(')'))
}

//* positionLiteral = doubleValue SP doubleValue
fn position(input: &str) -> IResult<&str, Position> {
    map(
        separated_pair(
            map_res(decimal_text, f64::from_str),
            space1,
            map_res(decimal_text, f64::from_str),
        ),
        |(x, y)| Position { x, y },
    )(input)
}

//* lineStringData = OPEN positionLiteral 1*( COMMA positionLiteral ) CLOSE
fn line_data(input: &str) -> IResult<&str, Vec<Position>> {
    verify(parens(separated_list1(comma, position)), |p: &Vec<Position>| {
        p.len() >= 2
    })(input)
}

//* ringLiteral = OPEN positionLiteral *( COMMA positionLiteral ) CLOSE
//*             ; Within each ringLiteral, the first and last positionLiteral elements MUST be an exact syntactic match to each other.
fn ring(input: &str) -> IResult<&str, Vec<Position>> {
    verify(parens(separated_list1(comma, position)), |p: &Vec<Position>| {
        p.len() >= 4 && p.first() == p.last()
    })(input)
}

//* polygonData = OPEN ringLiteral *( COMMA ringLiteral ) CLOSE
fn polygon_data(input: &str) -> IResult<&str, Polygon> {
    parens(separated_list1(comma, ring))(input)
}

fn point_data(input: &str) -> IResult<&str, Position> {
    parens(position)(input)
}

//* pointLiteral           = "Point" pointData
//* lineStringLiteral      = "LineString" lineStringData
//* polygonLiteral         = "Polygon" polygonData
//* multiPointLiteral      = "MultiPoint(" [ pointData *( COMMA pointData ) ] CLOSE
//* multiLineStringLiteral = "MultiLineString(" [ lineStringData *( COMMA lineStringData ) ] CLOSE
//* multiPolygonLiteral    = "MultiPolygon(" [ polygonData *( COMMA polygonData ) ] CLOSE
//* collectionLiteral      = "Collection(" geoLiteral *( COMMA geoLiteral ) CLOSE
fn shape(input: &str, depth: usize) -> IResult<&str, Shape> {
    alt((
        map(preceded(tag_no_case("Point"), point_data), Shape::Point),
        map(preceded(tag_no_case("LineString"), line_data), Shape::LineString),
        map(preceded(tag_no_case("Polygon"), polygon_data), Shape::Polygon),
        map(
            preceded(tag_no_case("MultiPoint"), parens(separated_list0(comma, point_data))),
            Shape::MultiPoint,
        ),
        map(
            preceded(
                tag_no_case("MultiLineString"),
                parens(separated_list0(comma, line_data)),
            ),
            Shape::MultiLineString,
        ),
        map(
            preceded(
                tag_no_case("MultiPolygon"),
                parens(separated_list0(comma, polygon_data)),
            ),
            Shape::MultiPolygon,
        ),
        map(
            preceded(
                verify(tag_no_case("Collection"), |_: &str| depth < MAX_GEO_DEPTH),
                parens(separated_list1(comma, |i| shape(i, depth + 1))),
            ),
            Shape::Collection,
        ),
    ))(input)
}

//* sridLiteral = "SRID" EQ 1*5DIGIT SEMI
fn srid(input: &str) -> IResult<&str, u32> {
    delimited(
        tag_no_case("SRID="),
        map_res(take_while_m_n(1, 5, |c: char| c.is_ascii_digit()), u32::from_str),
        pchar(';'),
    )(input)
}

fn shape_kind(shape: &Shape, geography: bool) -> Primitive {
    use Primitive::*;
    let (a, b) = match shape {
        Shape::Point(_) => (GeographyPoint, GeometryPoint),
        Shape::LineString(_) => (GeographyLineString, GeometryLineString),
        Shape::Polygon(_) => (GeographyPolygon, GeometryPolygon),
        Shape::MultiPoint(_) => (GeographyMultiPoint, GeometryMultiPoint),
        Shape::MultiLineString(_) => (GeographyMultiLineString, GeometryMultiLineString),
        Shape::MultiPolygon(_) => (GeographyMultiPolygon, GeometryMultiPolygon),
        Shape::Collection(_) => (GeographyCollection, GeometryCollection),
    };
    if geography {
        a
    } else {
        b
    }
}

//* geographyLiteral = "geography" SQUOTE [ sridLiteral ] geoLiteral SQUOTE
//* geometryLiteral  = "geometry" SQUOTE [ sridLiteral ] geoLiteral SQUOTE
fn geo_literal(input: &str) -> IResult<&str, Typed> {
    let (input, geography) = alt((
        value(true, tag_no_case("geography")),
        value(false, tag_no_case("geometry")),
    ))(input)?;
    let (input, (srid, shape)) = delimited(
        pchar('\''),
        pair(opt(srid), |i| shape(i, 0)),
        pchar('\''),
    )(input)?;
    let kind = shape_kind(&shape, geography);
    Ok((
        input,
        (
            Some(EdmType::Primitive(kind)),
            LiteralValue::Geo(Geo { srid, shape }),
        ),
    ))
}

fn fits(v: i64, p: Primitive) -> bool {
    match p {
        Primitive::Byte => u8::try_from(v).is_ok(),
        Primitive::SByte => i8::try_from(v).is_ok(),
        Primitive::Int16 => i16::try_from(v).is_ok(),
        Primitive::Int32 => i32::try_from(v).is_ok(),
        _ => true,
    }
}

fn decimal_fits(d: &Decimal, facets: &Facets) -> bool {
    let scale = d.scale();
    if matches!(facets.scale, Some(s) if scale > s) {
        return false;
    }
    let digits = d.mantissa().unsigned_abs().to_string().len() as u32;
    let integral = digits.saturating_sub(scale);
    match facets.precision {
        Some(p) => digits.max(scale) <= p && integral <= p.saturating_sub(facets.scale.unwrap_or(0)),
        None => true,
    }
}

/// Converts `literal` to the declared type `expected`.
///
/// Returns `Ok(None)` when the literal cannot denote a value of that type and
/// an error when it can, but violates the declared facets.
pub fn coerce(
    schema: &dyn SchemaAccess,
    literal: Literal,
    expected: &EdmType,
    facets: &Facets,
) -> Result<Option<Literal>, SemanticError> {
    match expected {
        EdmType::Primitive(p) => coerce_primitive(literal, *p, facets),
        EdmType::Enum(name) => Ok(coerce_enum(schema, literal, name)),
        _ => Ok(None),
    }
}

fn coerce_primitive(
    literal: Literal,
    target: Primitive,
    facets: &Facets,
) -> Result<Option<Literal>, SemanticError> {
    use LiteralValue as V;

    let out_of_range = |text: &str| SemanticError::LiteralOutOfRange {
        text: text.to_string(),
        expected: target.name().to_string(),
    };
    let ty = Some(EdmType::Primitive(target));
    let Literal { text, value, ty: found } = literal;

    let value = match (value, target) {
        (V::Null, _) => {
            return Ok(Some(Literal {
                text,
                ty: found,
                value: V::Null,
            }))
        }
        (V::Integer(v), t) if t.is_integral() => {
            if !fits(v, t) {
                return Err(out_of_range(&text));
            }
            V::Integer(v)
        }
        (V::Integer(v), Primitive::Decimal) => {
            let d = Decimal::from(v);
            if !decimal_fits(&d, facets) {
                return Err(out_of_range(&text));
            }
            V::Decimal(d)
        }
        (V::Integer(v), Primitive::Single | Primitive::Double) => V::Double(v as f64),
        (V::Decimal(d), Primitive::Decimal) => {
            if !decimal_fits(&d, facets) {
                return Err(out_of_range(&text));
            }
            V::Decimal(d)
        }
        (V::Decimal(d), Primitive::Single | Primitive::Double) => match d.to_f64() {
            Some(f) => V::Double(f),
            None => return Err(out_of_range(&text)),
        },
        (V::Double(f), Primitive::Single | Primitive::Double) => V::Double(f),
        (V::String(s), Primitive::String) => {
            if matches!(facets.max_length, Some(max) if s.chars().count() > max as usize) {
                return Err(out_of_range(&text));
            }
            V::String(s)
        }
        (V::String(s), Primitive::Duration) if is_duration(&s) => V::Duration(s),
        (V::Geo(g), t) if t.is_spatial() => {
            let kind = found.as_ref().and_then(EdmType::as_primitive);
            if !matches!(kind, Some(k) if k.can_promote_to(t)) {
                return Ok(None);
            }
            if let (Some(declared), Some(given)) = (facets.srid, g.srid) {
                if declared != given {
                    return Err(out_of_range(&text));
                }
            }
            return Ok(Some(Literal {
                text,
                ty: found,
                value: V::Geo(g),
            }));
        }
        (value, _) if found == ty => value,
        _ => return Ok(None),
    };
    Ok(Some(Literal { text, ty, value }))
}

fn coerce_enum(schema: &dyn SchemaAccess, literal: Literal, name: &FullName) -> Option<Literal> {
    let Literal { text, ty, value } = literal;
    let members = match (&ty, value) {
        (_, LiteralValue::Null) => {
            return Some(Literal {
                text,
                ty: None,
                value: LiteralValue::Null,
            })
        }
        (Some(EdmType::Enum(given)), LiteralValue::Enum(members)) => {
            if schema.normalize(given).as_ref() != Some(name) {
                return None;
            }
            members
        }
        (_, LiteralValue::String(s)) => s.split(',').map(String::from).collect(),
        _ => return None,
    };
    let enumeration = schema.enum_type(name)?;
    if members.len() > 1 && !enumeration.is_flags {
        return None;
    }
    let known = members.iter().all(|m| {
        enumeration.members.contains_key(m)
            || m.parse::<i64>()
                .map(|v| enumeration.members.values().any(|x| *x == v))
                .unwrap_or(false)
    });
    if !known {
        return None;
    }
    Some(Literal {
        text,
        ty: Some(EdmType::Enum(name.clone())),
        value: LiteralValue::Enum(members),
    })
}

/// Resolves the type of an enum literal written in an expression, where no
/// declared type is known.
pub fn resolve_enum(schema: &dyn SchemaAccess, literal: Literal) -> Result<Literal, SemanticError> {
    let given = match &literal.ty {
        Some(EdmType::Enum(given)) => given.clone(),
        _ => return Ok(literal),
    };
    let name = schema
        .normalize(&given)
        .filter(|n| schema.enum_type(n).is_some())
        .ok_or_else(|| SemanticError::UnknownType {
            name: given.to_string(),
        })?;
    let text = literal.text.clone();
    coerce_enum(schema, literal, &name).ok_or(SemanticError::LiteralOutOfRange {
        text,
        expected: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::kind::Enumeration;
    use crate::schema::{map, Document, Schema};

    fn value_of(text: &str) -> LiteralValue {
        literal(text).unwrap().value
    }

    fn type_of(text: &str) -> Option<EdmType> {
        literal(text).unwrap().ty
    }

    #[test]
    fn numbers_are_typed_by_form_and_range() {
        assert_eq!(value_of("42"), LiteralValue::Integer(42));
        assert_eq!(type_of("42"), Some(EdmType::Primitive(Primitive::Int32)));
        assert_eq!(type_of("3000000000"), Some(EdmType::Primitive(Primitive::Int64)));
        assert_eq!(
            value_of("1.50"),
            LiteralValue::Decimal(Decimal::from_str("1.50").unwrap())
        );
        assert_eq!(value_of("-2.5e3"), LiteralValue::Double(-2500.0));
        assert_eq!(value_of("-INF"), LiteralValue::Double(f64::NEG_INFINITY));
        assert!(literal("12abc").is_err());
    }

    #[test]
    fn strings_unescape_quotes() {
        assert_eq!(value_of("'O''Neil'"), LiteralValue::String("O'Neil".into()));
        assert_eq!(value_of("''"), LiteralValue::String(String::new()));
        assert!(literal("'unterminated").is_err());
    }

    #[test]
    fn keywords_need_a_boundary() {
        assert_eq!(value_of("null"), LiteralValue::Null);
        assert_eq!(value_of("true"), LiteralValue::Boolean(true));
        assert!(literal_prefix("nullable").is_err());
        let (rest, lit) = literal_prefix("false)").unwrap();
        assert_eq!(rest, ")");
        assert_eq!(lit.text, "false");
    }

    #[test]
    fn temporal_literals() {
        assert_eq!(
            value_of("2024-02-29"),
            LiteralValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert!(literal("2023-02-29").is_err());
        assert_eq!(
            value_of("13:05"),
            LiteralValue::TimeOfDay(NaiveTime::from_hms_opt(13, 5, 0).unwrap())
        );
        match value_of("2012-12-03T07:16:23.5+01:00") {
            LiteralValue::DateTimeOffset(dt) => {
                assert_eq!(dt.offset().local_minus_utc(), 3600);
                assert_eq!(dt.timestamp_subsec_millis(), 500);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            type_of("2012-12-03T07:16Z"),
            Some(EdmType::Primitive(Primitive::DateTimeOffset))
        );
        assert_eq!(value_of("duration'P1DT2H'"), LiteralValue::Duration("P1DT2H".into()));
        assert!(literal("duration'PT'").is_err());
    }

    #[test]
    fn guid_and_binary() {
        let id = "01234567-89ab-cdef-0123-456789abcdef";
        assert_eq!(value_of(id), LiteralValue::Guid(Uuid::parse_str(id).unwrap()));
        assert_eq!(value_of("binary'T0RhdGE'"), LiteralValue::Binary("T0RhdGE".into()));
        assert!(literal("binary'T'").is_err());
    }

    #[test]
    fn geo_literals() {
        let lit = literal("geography'SRID=4326;Point(-122.1 47.6)'").unwrap();
        assert_eq!(lit.ty, Some(EdmType::Primitive(Primitive::GeographyPoint)));
        assert_eq!(
            lit.value,
            LiteralValue::Geo(Geo {
                srid: Some(4326),
                shape: Shape::Point(Position { x: -122.1, y: 47.6 }),
            })
        );

        let polygon = literal("geometry'Polygon((0 0,1 0,1 1,0 0))'").unwrap();
        assert_eq!(polygon.ty, Some(EdmType::Primitive(Primitive::GeometryPolygon)));
        assert!(literal("geometry'Polygon((0 0,1 0,1 1,2 2))'").is_err());

        let collection = literal("geography'Collection(Point(1 2),LineString(1 2,3 4))'").unwrap();
        match collection.value {
            LiteralValue::Geo(Geo {
                shape: Shape::Collection(items),
                ..
            }) => assert_eq!(items.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            type_of("geography'MultiPoint()'"),
            Some(EdmType::Primitive(Primitive::GeographyMultiPoint))
        );
    }

    #[test]
    fn nested_geo_collections_are_bounded() {
        let mut text = String::from("Point(1 2)");
        for _ in 0..MAX_GEO_DEPTH + 1 {
            text = format!("Collection({})", text);
        }
        assert!(literal(&format!("geometry'{}'", text)).is_err());
    }

    fn colors() -> Document {
        let mut doc = Document::new();
        doc.schemas = map(&[Schema {
            namespace: "paint".into(),
            alias: Some("P".into()),
            enum_types: map(&[Enumeration {
                name: "Color".into(),
                is_flags: true,
                members: [("Red".to_string(), 1), ("Blue".to_string(), 2)]
                    .into_iter()
                    .collect(),
                ..Enumeration::default()
            }]),
            ..Schema::default()
        }]);
        doc
    }

    #[test]
    fn enum_literals_resolve_through_the_schema() {
        let doc = colors();
        let lit = resolve_enum(&doc, literal("P.Color'Red,Blue'").unwrap()).unwrap();
        assert_eq!(lit.ty, Some(EdmType::Enum(FullName::new("paint", "Color"))));
        assert_eq!(
            lit.value,
            LiteralValue::Enum(vec!["Red".into(), "Blue".into()])
        );
        assert!(resolve_enum(&doc, literal("paint.Color'Green'").unwrap()).is_err());
        assert_eq!(
            resolve_enum(&doc, literal("paint.Shade'Red'").unwrap()),
            Err(SemanticError::UnknownType {
                name: "paint.Shade".into()
            })
        );
    }

    #[test]
    fn coercion_checks_ranges_and_facets() {
        let doc = Document::new();
        let none = Facets::default();
        let byte = EdmType::Primitive(Primitive::Byte);
        assert!(coerce(&doc, literal("255").unwrap(), &byte, &none)
            .unwrap()
            .is_some());
        assert!(coerce(&doc, literal("256").unwrap(), &byte, &none).is_err());

        let money = Facets {
            precision: Some(5),
            scale: Some(2),
            ..Facets::default()
        };
        let decimal = EdmType::Primitive(Primitive::Decimal);
        let ok = coerce(&doc, literal("123.45").unwrap(), &decimal, &money).unwrap();
        assert_eq!(ok.unwrap().ty, Some(decimal.clone()));
        assert!(coerce(&doc, literal("1.234").unwrap(), &decimal, &money).is_err());
        assert!(coerce(&doc, literal("123456").unwrap(), &decimal, &money).is_err());
        assert!(coerce(&doc, literal("1234").unwrap(), &decimal, &money).is_err());
        assert!(coerce(&doc, literal("1234.5").unwrap(), &decimal, &money).is_err());
        assert!(coerce(&doc, literal("999").unwrap(), &decimal, &money)
            .unwrap()
            .is_some());
        assert!(coerce(&doc, literal("-0.05").unwrap(), &decimal, &money)
            .unwrap()
            .is_some());

        let string = EdmType::Primitive(Primitive::String);
        assert_eq!(coerce(&doc, literal("5").unwrap(), &string, &none).unwrap(), None);
        let duration = EdmType::Primitive(Primitive::Duration);
        assert!(coerce(&doc, literal("'PT5M'").unwrap(), &duration, &none)
            .unwrap()
            .is_some());
    }
}
