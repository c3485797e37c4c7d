//! The fully resolved, validated description of a request.
//!
//! Everything here is plain owned data: a [`RequestDescriptor`] is built once
//! per parse and can be shared read-only afterwards.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::{EdmType, FullName};

// Characters that cannot appear raw inside a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum RequestKind {
    Resource,
    Metadata,
    Service,
    Batch,
    Crossjoin,
    All,
    EntityId,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestKind::Resource => "resource",
            RequestKind::Metadata => "metadata",
            RequestKind::Service => "service",
            RequestKind::Batch => "batch",
            RequestKind::Crossjoin => "crossjoin",
            RequestKind::All => "all",
            RequestKind::EntityId => "entityId",
        })
    }
}

/// Result of a successful parse.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestDescriptor {
    pub kind: RequestKind,
    pub resource_path: Vec<ResourcePart>,
    /// Entity set names of a `$crossjoin(...)` request.
    pub crossjoin: Vec<String>,
    pub options: QueryOptions,
    pub trailing_slash: bool,
}

impl RequestDescriptor {
    pub(crate) fn new(kind: RequestKind) -> Self {
        RequestDescriptor {
            kind,
            resource_path: Vec::new(),
            crossjoin: Vec::new(),
            options: QueryOptions::default(),
            trailing_slash: false,
        }
    }

    pub fn last_part(&self) -> Option<&ResourcePart> {
        self.resource_path.last()
    }

    /// Raw text of an alias, `name` including the leading `@`.
    pub fn alias_text(&self, name: &str) -> Option<&str> {
        self.options.aliases.get(name).map(String::as_str)
    }

    /// Renders the resource path back to URI text.
    ///
    /// Keys are always written in the named form, the collection type filter
    /// before and the entry type filter after them; keys implied by
    /// referential constraints are left out.
    pub fn resource_path_text(&self) -> String {
        let mut segments = Vec::new();
        for part in &self.resource_path {
            part.write_segments(&mut segments);
        }
        if self.trailing_slash {
            segments.push(String::new());
        }
        segments
            .iter()
            .map(|s| utf8_percent_encode(s, SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// One resolved resource path segment.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourcePart {
    pub kind: PartKind,
    /// Declared type of the segment, before any type filter. `None` only for
    /// actions without a return type.
    pub ty: Option<EdmType>,
    pub collection: bool,
    pub keys: Vec<KeyPredicate>,
    /// Cast applied to the single entry, after the key (or to a single-valued
    /// segment).
    pub type_filter_on_entry: Option<EdmType>,
    /// Cast applied to the whole collection, before the key.
    pub type_filter_on_collection: Option<EdmType>,
}

impl ResourcePart {
    pub fn new(kind: PartKind, ty: EdmType, collection: bool) -> Self {
        ResourcePart {
            kind,
            ty: Some(ty),
            collection,
            keys: Vec::new(),
            type_filter_on_entry: None,
            type_filter_on_collection: None,
        }
    }

    /// A segment without a type, i.e. a void action.
    pub fn untyped(kind: PartKind) -> Self {
        ResourcePart {
            kind,
            ty: None,
            collection: false,
            keys: Vec::new(),
            type_filter_on_entry: None,
            type_filter_on_collection: None,
        }
    }

    /// The type the next segment resolves against.
    pub fn effective_type(&self) -> Option<&EdmType> {
        self.type_filter_on_entry
            .as_ref()
            .or(self.type_filter_on_collection.as_ref())
            .or(self.ty.as_ref())
    }

    pub fn has_keys(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Whether this kind of segment has type filter slots at all.
    pub fn accepts_type_filter(&self) -> bool {
        matches!(
            self.kind,
            PartKind::EntitySet { .. }
                | PartKind::Singleton { .. }
                | PartKind::Navigation { .. }
                | PartKind::ComplexProperty { .. }
                | PartKind::Function { .. }
        ) && matches!(&self.ty, Some(t) if t.is_structured())
    }

    /// Segment text as written in a URI, without keys or casts.
    pub fn segment_name(&self) -> String {
        match &self.kind {
            PartKind::EntitySet { name }
            | PartKind::Singleton { name }
            | PartKind::Navigation { name }
            | PartKind::PrimitiveProperty { name }
            | PartKind::ComplexProperty { name }
            | PartKind::LambdaVariable { name } => name.clone(),
            PartKind::Action { name, import } => {
                import.clone().unwrap_or_else(|| name.to_string())
            }
            PartKind::Function { name, import, .. } => {
                import.clone().unwrap_or_else(|| name.to_string())
            }
            PartKind::Value => "$value".into(),
            PartKind::Count => "$count".into(),
            PartKind::Ref => "$ref".into(),
            PartKind::It => "$it".into(),
            PartKind::LambdaAll { .. } => "all".into(),
            PartKind::LambdaAny { .. } => "any".into(),
            PartKind::TypeCast => self.ty.as_ref().map(|t| t.to_string()).unwrap_or_default(),
        }
    }

    fn write_segments(&self, out: &mut Vec<String>) {
        let mut head = match &self.kind {
            PartKind::Function { parameters, .. } => {
                let params: Vec<String> = parameters.iter().map(|p| p.to_string()).collect();
                format!("{}({})", self.segment_name(), params.join(","))
            }
            PartKind::LambdaAll {
                variable,
                expression,
            } => format!("all({}:{})", variable, expression),
            PartKind::LambdaAny {
                variable: Some(variable),
                expression: Some(expression),
            } => format!("any({}:{})", variable, expression),
            PartKind::LambdaAny { .. } => "any()".into(),
            _ => self.segment_name(),
        };
        if let Some(cast) = &self.type_filter_on_collection {
            out.push(head);
            head = cast.to_string();
        }
        let keys: Vec<String> = self
            .keys
            .iter()
            .filter(|k| !matches!(k.value, KeyValue::Referenced(_)))
            .map(|k| k.to_string())
            .collect();
        if self.has_keys() {
            head.push('(');
            head.push_str(&keys.join(","));
            head.push(')');
        }
        out.push(head);
        if let Some(cast) = &self.type_filter_on_entry {
            out.push(cast.to_string());
        }
    }
}

impl fmt::Display for ResourcePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut segments = Vec::new();
        self.write_segments(&mut segments);
        f.write_str(&segments.join("/"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum PartKind {
    EntitySet { name: String },
    Singleton { name: String },
    Navigation { name: String },
    PrimitiveProperty { name: String },
    ComplexProperty { name: String },
    Action {
        name: FullName,
        import: Option<String>,
    },
    Function {
        name: FullName,
        import: Option<String>,
        parameters: Vec<Parameter>,
        composable: bool,
    },
    Value,
    Count,
    Ref,
    /// `$it`, the instance an expression is evaluated against.
    It,
    LambdaVariable { name: String },
    LambdaAll {
        variable: String,
        expression: Box<Expr>,
    },
    /// `any()` without arguments tests for a non-empty collection.
    LambdaAny {
        variable: Option<String>,
        expression: Option<Box<Expr>>,
    },
    TypeCast,
}

impl PartKind {
    pub fn label(&self) -> &'static str {
        match self {
            PartKind::EntitySet { .. } => "entitySet",
            PartKind::Singleton { .. } => "singleton",
            PartKind::Navigation { .. } => "navigationProperty",
            PartKind::PrimitiveProperty { .. } => "primitiveProperty",
            PartKind::ComplexProperty { .. } => "complexProperty",
            PartKind::Action { .. } => "action",
            PartKind::Function { .. } => "function",
            PartKind::Value => "value",
            PartKind::Count => "count",
            PartKind::Ref => "ref",
            PartKind::It => "it",
            PartKind::LambdaVariable { .. } => "lambdaVariable",
            PartKind::LambdaAll { .. } => "lambdaAll",
            PartKind::LambdaAny { .. } => "lambdaAny",
            PartKind::TypeCast => "typeCast",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeyPredicate {
    pub name: String,
    pub value: KeyValue,
}

impl fmt::Display for KeyPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            KeyValue::Literal(lit) => write!(f, "{}={}", self.name, lit.text),
            KeyValue::Alias(alias) => write!(f, "{}={}", self.name, alias),
            KeyValue::Referenced(property) => write!(f, "{}=[{}]", self.name, property),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum KeyValue {
    Literal(Literal),
    /// `@name`, substituted from the alias map on demand.
    Alias(String),
    /// Implied by a referential constraint: the value of this property of the
    /// previous segment.
    Referenced(String),
}

/// A function parameter as written in the URI.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub value: ParameterValue,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            ParameterValue::Alias(alias) => write!(f, "{}={}", self.name, alias),
            ParameterValue::Expr { text, .. } => write!(f, "{}={}", self.name, text),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ParameterValue {
    Alias(String),
    Expr { text: String, expr: Expr },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Literal {
    /// Source text, e.g. `'ALFKI'` with its quotes.
    pub text: String,
    /// `None` for `null`.
    pub ty: Option<EdmType>,
    pub value: LiteralValue,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
    String(String),
    Guid(Uuid),
    Date(NaiveDate),
    DateTimeOffset(DateTime<FixedOffset>),
    TimeOfDay(NaiveTime),
    /// ISO 8601 duration text, validated.
    Duration(String),
    /// base64url text, validated.
    Binary(String),
    Enum(Vec<String>),
    Geo(Geo),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Geo {
    pub srid: Option<u32>,
    pub shape: Shape,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Rings of a polygon; the first is the exterior.
pub type Polygon = Vec<Vec<Position>>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Shape {
    Point(Position),
    LineString(Vec<Position>),
    Polygon(Polygon),
    MultiPoint(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    MultiPolygon(Vec<Polygon>),
    Collection(Vec<Shape>),
}

/// An expression tree node with its resolved type.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    /// `None` when the type is unknown until an alias is substituted, or for
    /// `null`.
    pub ty: Option<EdmType>,
    pub collection: bool,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Option<EdmType>, collection: bool) -> Self {
        Expr {
            kind,
            ty,
            collection,
        }
    }

    /// The lambda segment of a `LambdaAny`/`LambdaAll` expression.
    pub fn lambda(&self) -> Option<&ResourcePart> {
        match &self.kind {
            ExprKind::LambdaAny(path) | ExprKind::LambdaAll(path) => path.last(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ExprKind {
    Literal(Literal),
    Member(Vec<ResourcePart>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Method(Method, Vec<Expr>),
    /// Member path whose last segment is a [`PartKind::LambdaAll`].
    LambdaAll(Vec<ResourcePart>),
    /// Member path whose last segment is a [`PartKind::LambdaAny`].
    LambdaAny(Vec<ResourcePart>),
    /// `@name`, recorded unresolved.
    Alias(String),
    TypeLiteral(EdmType),
    /// Right-hand side of `in`.
    List(Vec<Expr>),
}

fn write_path(f: &mut fmt::Formatter<'_>, path: &[ResourcePart]) -> fmt::Result {
    let mut segments = Vec::new();
    for part in path {
        part.write_segments(&mut segments);
    }
    f.write_str(&segments.join("/"))
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(lit) => lit.fmt(f),
            ExprKind::Member(path) | ExprKind::LambdaAll(path) | ExprKind::LambdaAny(path) => {
                write_path(f, path)
            }
            ExprKind::Unary(UnaryOp::Not, operand) => write!(f, "not {}", operand),
            ExprKind::Unary(UnaryOp::Minus, operand) => write!(f, "-{}", operand),
            ExprKind::Binary(op, left, right) => write!(f, "({} {} {})", left, op, right),
            ExprKind::Method(method, args) => {
                write!(f, "{}(", method.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    arg.fmt(f)?;
                }
                f.write_str(")")
            }
            ExprKind::Alias(name) => f.write_str(name),
            ExprKind::TypeLiteral(ty) => ty.fmt(f),
            ExprKind::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOp {
    Not,
    Minus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Has,
    In,
    Add,
    Sub,
    Mul,
    Div,
    DivBy,
    Mod,
}

impl BinaryOp {
    pub fn from_keyword(word: &str) -> Option<BinaryOp> {
        use BinaryOp::*;
        Some(match word {
            "or" => Or,
            "and" => And,
            "eq" => Eq,
            "ne" => Ne,
            "gt" => Gt,
            "ge" => Ge,
            "lt" => Lt,
            "le" => Le,
            "has" => Has,
            "in" => In,
            "add" => Add,
            "sub" => Sub,
            "mul" => Mul,
            "div" => Div,
            "divby" => DivBy,
            "mod" => Mod,
            _ => return None,
        })
    }

    pub fn keyword(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Or => "or",
            And => "and",
            Eq => "eq",
            Ne => "ne",
            Gt => "gt",
            Ge => "ge",
            Lt => "lt",
            Le => "le",
            Has => "has",
            In => "in",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            DivBy => "divby",
            Mod => "mod",
        }
    }

    pub fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(self, Eq | Ne | Gt | Ge | Lt | Le | Has | In)
    }

    pub fn is_arithmetic(self) -> bool {
        use BinaryOp::*;
        matches!(self, Add | Sub | Mul | Div | DivBy | Mod)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Built-in expression methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Method {
    Contains,
    StartsWith,
    EndsWith,
    Length,
    IndexOf,
    Substring,
    ToLower,
    ToUpper,
    Trim,
    Concat,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    FractionalSeconds,
    TotalSeconds,
    Date,
    Time,
    TotalOffsetMinutes,
    MinDateTime,
    MaxDateTime,
    Now,
    Round,
    Floor,
    Ceiling,
    GeoDistance,
    GeoLength,
    GeoIntersects,
    Cast,
    IsOf,
}

const METHODS: [Method; 32] = [
    Method::Contains,
    Method::StartsWith,
    Method::EndsWith,
    Method::Length,
    Method::IndexOf,
    Method::Substring,
    Method::ToLower,
    Method::ToUpper,
    Method::Trim,
    Method::Concat,
    Method::Year,
    Method::Month,
    Method::Day,
    Method::Hour,
    Method::Minute,
    Method::Second,
    Method::FractionalSeconds,
    Method::TotalSeconds,
    Method::Date,
    Method::Time,
    Method::TotalOffsetMinutes,
    Method::MinDateTime,
    Method::MaxDateTime,
    Method::Now,
    Method::Round,
    Method::Floor,
    Method::Ceiling,
    Method::GeoDistance,
    Method::GeoLength,
    Method::GeoIntersects,
    Method::Cast,
    Method::IsOf,
];

impl Method {
    pub fn name(self) -> &'static str {
        use Method::*;
        match self {
            Contains => "contains",
            StartsWith => "startswith",
            EndsWith => "endswith",
            Length => "length",
            IndexOf => "indexof",
            Substring => "substring",
            ToLower => "tolower",
            ToUpper => "toupper",
            Trim => "trim",
            Concat => "concat",
            Year => "year",
            Month => "month",
            Day => "day",
            Hour => "hour",
            Minute => "minute",
            Second => "second",
            FractionalSeconds => "fractionalseconds",
            TotalSeconds => "totalseconds",
            Date => "date",
            Time => "time",
            TotalOffsetMinutes => "totaloffsetminutes",
            MinDateTime => "mindatetime",
            MaxDateTime => "maxdatetime",
            Now => "now",
            Round => "round",
            Floor => "floor",
            Ceiling => "ceiling",
            GeoDistance => "geo.distance",
            GeoLength => "geo.length",
            GeoIntersects => "geo.intersects",
            Cast => "cast",
            IsOf => "isof",
        }
    }

    pub fn from_name(name: &str) -> Option<Method> {
        METHODS.iter().copied().find(|m| m.name() == name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderByItem {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SelectItem {
    pub star: bool,
    /// Namespace of a `Namespace.*` item.
    pub all_operations: Option<String>,
    pub start_type_filter: Option<EdmType>,
    pub path: Vec<ResourcePart>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExpandItem {
    pub star: bool,
    pub is_ref: bool,
    pub is_count: bool,
    pub start_type_filter: Option<EdmType>,
    pub path: Vec<ResourcePart>,
    pub options: QueryOptions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Levels {
    Max,
    Number(u32),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SearchExpr {
    Term(String),
    Phrase(String),
    Not(Box<SearchExpr>),
    And(Box<SearchExpr>, Box<SearchExpr>),
    Or(Box<SearchExpr>, Box<SearchExpr>),
}

/// System query options, in the order the rule table lists them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SystemOption {
    Filter,
    Format,
    Id,
    Count,
    OrderBy,
    Search,
    Select,
    Skip,
    SkipToken,
    DeltaToken,
    Top,
    Expand,
    Levels,
}

const SYSTEM_OPTIONS: [SystemOption; 13] = [
    SystemOption::Filter,
    SystemOption::Format,
    SystemOption::Id,
    SystemOption::Count,
    SystemOption::OrderBy,
    SystemOption::Search,
    SystemOption::Select,
    SystemOption::Skip,
    SystemOption::SkipToken,
    SystemOption::DeltaToken,
    SystemOption::Top,
    SystemOption::Expand,
    SystemOption::Levels,
];

impl SystemOption {
    pub fn name(self) -> &'static str {
        use SystemOption::*;
        match self {
            Filter => "$filter",
            Format => "$format",
            Id => "$id",
            Count => "$count",
            OrderBy => "$orderby",
            Search => "$search",
            Select => "$select",
            Skip => "$skip",
            SkipToken => "$skiptoken",
            DeltaToken => "$deltatoken",
            Top => "$top",
            Expand => "$expand",
            Levels => "$levels",
        }
    }

    /// Matches `$name` case-insensitively.
    pub fn from_name(name: &str) -> Option<SystemOption> {
        SYSTEM_OPTIONS
            .iter()
            .copied()
            .find(|o| o.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SystemOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryOptions {
    pub select: Option<Vec<SelectItem>>,
    pub expand: Option<Vec<ExpandItem>>,
    pub filter: Option<Expr>,
    pub orderby: Option<Vec<OrderByItem>>,
    pub top: Option<u64>,
    pub skip: Option<u64>,
    pub count: Option<bool>,
    pub levels: Option<Levels>,
    pub format: Option<String>,
    pub skip_token: Option<String>,
    pub delta_token: Option<String>,
    pub search: Option<SearchExpr>,
    pub id: Option<String>,
    /// `@name` to raw value text.
    pub aliases: BTreeMap<String, String>,
    /// Options without `$` or `@` prefix, in request order.
    pub custom: Vec<(String, String)>,
}

impl QueryOptions {
    /// The system options that are set.
    pub fn present(&self) -> Vec<SystemOption> {
        let mut present = Vec::new();
        let mut mark = |set: bool, option: SystemOption| {
            if set {
                present.push(option);
            }
        };
        mark(self.filter.is_some(), SystemOption::Filter);
        mark(self.format.is_some(), SystemOption::Format);
        mark(self.id.is_some(), SystemOption::Id);
        mark(self.count.is_some(), SystemOption::Count);
        mark(self.orderby.is_some(), SystemOption::OrderBy);
        mark(self.search.is_some(), SystemOption::Search);
        mark(self.select.is_some(), SystemOption::Select);
        mark(self.skip.is_some(), SystemOption::Skip);
        mark(self.skip_token.is_some(), SystemOption::SkipToken);
        mark(self.delta_token.is_some(), SystemOption::DeltaToken);
        mark(self.top.is_some(), SystemOption::Top);
        mark(self.expand.is_some(), SystemOption::Expand);
        mark(self.levels.is_some(), SystemOption::Levels);
        present
    }
}

/// A lazily resolved alias value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum AliasValue {
    Json(serde_json::Value),
    Expr(Expr),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Primitive;

    fn string_literal(text: &str, value: &str) -> Literal {
        Literal {
            text: text.into(),
            ty: Some(EdmType::Primitive(Primitive::String)),
            value: LiteralValue::String(value.into()),
        }
    }

    #[test]
    fn path_text_escapes_reserved_characters_in_keys() {
        let customer = EdmType::Entity(FullName::new("ns", "Customer"));
        let mut part = ResourcePart::new(
            PartKind::EntitySet {
                name: "Customers".into(),
            },
            customer.clone(),
            false,
        );
        part.keys.push(KeyPredicate {
            name: "Id".into(),
            value: KeyValue::Literal(string_literal("'A/B C'", "A/B C")),
        });
        part.type_filter_on_entry = Some(EdmType::Entity(FullName::new("ns", "Vip")));

        let mut descriptor = RequestDescriptor::new(RequestKind::Resource);
        descriptor.resource_path.push(part);
        assert_eq!(
            descriptor.resource_path_text(),
            "Customers(Id='A%2FB%20C')/ns.Vip"
        );
    }

    #[test]
    fn present_lists_only_set_options() {
        let options = QueryOptions {
            top: Some(3),
            format: Some("json".into()),
            ..QueryOptions::default()
        };
        assert_eq!(
            options.present(),
            vec![SystemOption::Format, SystemOption::Top]
        );
    }

    #[test]
    fn system_option_names_are_case_insensitive() {
        assert_eq!(SystemOption::from_name("$TOP"), Some(SystemOption::Top));
        assert_eq!(SystemOption::from_name("$orderBy"), Some(SystemOption::OrderBy));
        assert_eq!(SystemOption::from_name("$apply"), None);
    }
}
