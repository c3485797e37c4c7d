//! Common expressions (`$filter`, `$orderby`, lambda bodies, parameter
//! values) and the `$search` grammar.
//!
//! Expressions are tokenized first and parsed by precedence climbing:
//! `or`, `and`, `not`, comparison, additive, multiplicative, unary minus,
//! primary. Every nested construct counts towards the configured depth.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_till1},
    character::complete::{char as pchar, none_of, space0, space1},
    combinator::{all_consuming, map, opt, peek, recognize, value, verify},
    error::{Error as NomError, ErrorKind},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use tracing::trace;

use super::{literal, path, Context, Target};
use crate::ast::{
    BinaryOp, Expr, ExprKind, Method, OrderByItem, PartKind, ResourcePart, SearchExpr, UnaryOp,
};
use crate::error::{unexpected, SemanticError, SyntaxError, UriError, ValidationError};
use crate::lexer::Segment;
use crate::schema::property::Facets;
use crate::schema::{EdmType, Primitive};

#[derive(Clone, Debug, PartialEq)]
enum Tok<'s> {
    Literal(crate::ast::Literal),
    /// Identifiers, qualified names, `$it`/`$root`/`$count` and keywords.
    Word(&'s str),
    /// `@name`, including the `@`.
    Alias(&'s str),
    Open,
    Close,
    Comma,
    Slash,
    Colon,
    Minus,
    /// Only meaningful inside key and parameter groups.
    Equals,
    End,
}

struct Token<'s> {
    tok: Tok<'s>,
    offset: usize,
}

fn describe(tok: &Tok<'_>) -> String {
    match tok {
        Tok::Literal(lit) => lit.text.clone(),
        Tok::Word(w) | Tok::Alias(w) => w.to_string(),
        Tok::Open => "(".into(),
        Tok::Close => ")".into(),
        Tok::Comma => ",".into(),
        Tok::Slash => "/".into(),
        Tok::Colon => ":".into(),
        Tok::Minus => "-".into(),
        Tok::Equals => "=".into(),
        Tok::End => "end of input".into(),
    }
}

//* word = odataIdentifier *( "." odataIdentifier )
fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        literal::identifier,
        many0(pair(pchar('.'), literal::identifier)),
    ))(input)
}

fn is_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn tokenize(text: &str) -> Result<Vec<Token<'_>>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut rest = text;
    loop {
        rest = rest.trim_start_matches(is_space);
        let offset = text.len() - rest.len();
        let c = match rest.chars().next() {
            Some(c) => c,
            None => break,
        };
        let (remaining, tok) = match c {
            '(' => (&rest[1..], Tok::Open),
            ')' => (&rest[1..], Tok::Close),
            ',' => (&rest[1..], Tok::Comma),
            '/' => (&rest[1..], Tok::Slash),
            ':' => (&rest[1..], Tok::Colon),
            '=' => (&rest[1..], Tok::Equals),
            '@' | '$' => match literal::identifier(&rest[1..]) {
                Ok((remaining, name)) => {
                    let whole = &rest[..1 + name.len()];
                    let tok = if c == '@' {
                        Tok::Alias(whole)
                    } else {
                        Tok::Word(whole)
                    };
                    (remaining, tok)
                }
                Err(_) => return Err(unexpected(c.to_string(), offset, text)),
            },
            _ => {
                if let Ok((remaining, lit)) = literal::literal_prefix(rest) {
                    (remaining, Tok::Literal(lit))
                } else if c == '-' {
                    (&rest[1..], Tok::Minus)
                } else if let Ok((remaining, w)) = word(rest) {
                    (remaining, Tok::Word(w))
                } else {
                    return Err(unexpected(c.to_string(), offset, text));
                }
            }
        };
        tokens.push(Token { tok, offset });
        rest = remaining;
    }
    tokens.push(Token {
        tok: Tok::End,
        offset: text.len(),
    });
    Ok(tokens)
}

/// A lambda variable in scope, linked to the scopes enclosing it.
struct Scope<'p> {
    name: &'p str,
    ty: EdmType,
    parent: Option<&'p Scope<'p>>,
}

impl<'p> Scope<'p> {
    fn find(scope: Option<&'p Scope<'p>>, name: &str) -> Option<&'p Scope<'p>> {
        let mut current = scope;
        while let Some(s) = current {
            if s.name == name {
                return Some(s);
            }
            current = s.parent;
        }
        None
    }
}

fn boolean() -> Option<EdmType> {
    Some(EdmType::Primitive(Primitive::Boolean))
}

fn primitive(e: &Expr) -> Option<Primitive> {
    if e.collection {
        None
    } else {
        e.ty.as_ref().and_then(EdmType::as_primitive)
    }
}

fn type_name(e: &Expr) -> String {
    match (&e.kind, &e.ty) {
        (_, Some(ty)) => path::type_label(ty, e.collection),
        (ExprKind::Alias(name), None) => name.clone(),
        (ExprKind::TypeLiteral(ty), None) => ty.to_string(),
        (_, None) => "null".into(),
    }
}

fn is_boolean(e: &Expr) -> bool {
    e.ty.is_none() || (!e.collection && e.ty == boolean())
}

fn incompatible(op: BinaryOp, left: &Expr, right: &Expr) -> SemanticError {
    SemanticError::IncompatibleOperands {
        operator: op.keyword().into(),
        left: type_name(left),
        right: type_name(right),
    }
}

fn comparable_types(op: BinaryOp, left: Option<&EdmType>, right: Option<&EdmType>) -> bool {
    let (left, right) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        _ => return true,
    };
    match (left, right) {
        (EdmType::Primitive(a), EdmType::Primitive(b)) => {
            let ordering = !matches!(op, BinaryOp::Eq | BinaryOp::Ne);
            let unordered = |p: &Primitive| p.is_spatial() || *p == Primitive::Stream;
            if ordering && (unordered(a) || unordered(b)) {
                return false;
            }
            a == b
                || (a.is_numeric() && b.is_numeric())
                || a.can_promote_to(*b)
                || b.can_promote_to(*a)
        }
        (EdmType::Enum(a), EdmType::Enum(b)) => a == b,
        _ => false,
    }
}

fn comparable(op: BinaryOp, left: &Expr, right: &Expr) -> bool {
    !left.collection && !right.collection && comparable_types(op, left.ty.as_ref(), right.ty.as_ref())
}

fn wider(a: Primitive, b: Primitive) -> Primitive {
    use Primitive::{Decimal, Double, Int64, Single};
    if matches!(a, Double | Single) || matches!(b, Double | Single) {
        Double
    } else if a == Decimal || b == Decimal {
        Decimal
    } else if a.can_promote_to(b) {
        b
    } else if b.can_promote_to(a) {
        a
    } else {
        Int64
    }
}

fn arithmetic_type(op: BinaryOp, a: Primitive, b: Primitive) -> Option<Primitive> {
    use Primitive::{Date, DateTimeOffset, Decimal, Double, Duration, Single};
    if a.is_numeric() && b.is_numeric() {
        return Some(match op {
            BinaryOp::DivBy if matches!(a, Double | Single) || matches!(b, Double | Single) => Double,
            BinaryOp::DivBy => Decimal,
            _ => wider(a, b),
        });
    }
    let additive = matches!(op, BinaryOp::Add | BinaryOp::Sub);
    match (a, b) {
        (DateTimeOffset, Duration) if additive => Some(DateTimeOffset),
        (Date, Duration) if additive => Some(Date),
        (Duration, Duration) if additive => Some(Duration),
        (DateTimeOffset, DateTimeOffset) | (Date, Date) if op == BinaryOp::Sub => Some(Duration),
        _ => None,
    }
}

#[derive(Clone, Copy)]
enum Arg {
    Text,
    Integer,
    DateLike,
    TimeLike,
    Timestamp,
    Span,
    Numeric,
    Point,
    Line,
    Area,
}

enum Returns {
    Fixed(Primitive),
    SameAsFirst,
}

fn accepts(arg: Arg, e: &Expr) -> bool {
    if e.ty.is_none() && !matches!(e.kind, ExprKind::TypeLiteral(_)) {
        return true;
    }
    let p = match primitive(e) {
        Some(p) => p,
        None => return false,
    };
    match arg {
        Arg::Text => p == Primitive::String,
        Arg::Integer => p.is_integral(),
        Arg::DateLike => matches!(p, Primitive::Date | Primitive::DateTimeOffset),
        Arg::TimeLike => matches!(p, Primitive::TimeOfDay | Primitive::DateTimeOffset),
        Arg::Timestamp => p == Primitive::DateTimeOffset,
        Arg::Span => p == Primitive::Duration,
        Arg::Numeric => p.is_numeric(),
        Arg::Point => matches!(p, Primitive::GeographyPoint | Primitive::GeometryPoint),
        Arg::Line => matches!(p, Primitive::GeographyLineString | Primitive::GeometryLineString),
        Arg::Area => matches!(p, Primitive::GeographyPolygon | Primitive::GeometryPolygon),
    }
}

/// Parameter kinds, minimum arity and result of the built-in methods other
/// than `cast` and `isof`.
fn signature(method: Method) -> (&'static [Arg], usize, Returns) {
    use Method::*;
    use Returns::{Fixed, SameAsFirst};
    match method {
        Contains | StartsWith | EndsWith => (&[Arg::Text, Arg::Text], 2, Fixed(Primitive::Boolean)),
        Length => (&[Arg::Text], 1, Fixed(Primitive::Int32)),
        IndexOf => (&[Arg::Text, Arg::Text], 2, Fixed(Primitive::Int32)),
        Substring => (&[Arg::Text, Arg::Integer, Arg::Integer], 2, Fixed(Primitive::String)),
        ToLower | ToUpper | Trim => (&[Arg::Text], 1, Fixed(Primitive::String)),
        Concat => (&[Arg::Text, Arg::Text], 2, Fixed(Primitive::String)),
        Year | Month | Day => (&[Arg::DateLike], 1, Fixed(Primitive::Int32)),
        Hour | Minute | Second => (&[Arg::TimeLike], 1, Fixed(Primitive::Int32)),
        FractionalSeconds => (&[Arg::TimeLike], 1, Fixed(Primitive::Decimal)),
        TotalSeconds => (&[Arg::Span], 1, Fixed(Primitive::Decimal)),
        Date => (&[Arg::Timestamp], 1, Fixed(Primitive::Date)),
        Time => (&[Arg::Timestamp], 1, Fixed(Primitive::TimeOfDay)),
        TotalOffsetMinutes => (&[Arg::Timestamp], 1, Fixed(Primitive::Int32)),
        MinDateTime | MaxDateTime | Now => (&[], 0, Fixed(Primitive::DateTimeOffset)),
        Round | Floor | Ceiling => (&[Arg::Numeric], 1, SameAsFirst),
        GeoDistance => (&[Arg::Point, Arg::Point], 2, Fixed(Primitive::Double)),
        GeoLength => (&[Arg::Line], 1, Fixed(Primitive::Double)),
        GeoIntersects => (&[Arg::Point, Arg::Area], 2, Fixed(Primitive::Boolean)),
        Cast | IsOf => (&[], 0, Fixed(Primitive::Boolean)),
    }
}

fn method_expr(method: Method, args: Vec<Expr>) -> Result<Expr, SemanticError> {
    let name = method.name();
    let arity = |expected: String, found: usize| SemanticError::MethodArity {
        name: name.into(),
        expected,
        found,
    };
    let argument = |index: usize, arg: &Expr| SemanticError::MethodArgument {
        name: name.into(),
        index,
        found: type_name(arg),
    };

    if matches!(method, Method::Cast | Method::IsOf) {
        let target = match args.as_slice() {
            [only] | [_, only] => match &only.kind {
                ExprKind::TypeLiteral(ty) => ty.clone(),
                _ => return Err(argument(args.len() - 1, only)),
            },
            _ => return Err(arity("1..2".into(), args.len())),
        };
        if let [first, _] = args.as_slice() {
            if matches!(first.kind, ExprKind::TypeLiteral(_)) {
                return Err(argument(0, first));
            }
        }
        let ty = if method == Method::Cast {
            Some(target)
        } else {
            boolean()
        };
        return Ok(Expr::new(ExprKind::Method(method, args), ty, false));
    }

    let (params, min, returns) = signature(method);
    if args.len() < min || args.len() > params.len() {
        let expected = if min == params.len() {
            min.to_string()
        } else {
            format!("{}..{}", min, params.len())
        };
        return Err(arity(expected, args.len()));
    }
    for (index, (arg, kind)) in args.iter().zip(params).enumerate() {
        if !accepts(*kind, arg) {
            return Err(argument(index, arg));
        }
    }
    let ty = match returns {
        Returns::Fixed(p) => Some(EdmType::Primitive(p)),
        Returns::SameAsFirst => args.first().and_then(|a| a.ty.clone()),
    };
    Ok(Expr::new(ExprKind::Method(method, args), ty, false))
}

struct ExprParser<'c, 's> {
    ctx: Context<'c>,
    target: &'s Target,
    text: &'s str,
    tokens: Vec<Token<'s>>,
    pos: usize,
}

impl<'c, 's> ExprParser<'c, 's> {
    fn new(ctx: Context<'c>, target: &'s Target, text: &'s str) -> Result<Self, SyntaxError> {
        Ok(ExprParser {
            ctx,
            target,
            text,
            tokens: tokenize(text)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &Tok<'s> {
        &self.tokens[self.pos].tok
    }

    fn advance(&mut self) -> Tok<'s> {
        let tok = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(self.peek(), Tok::Word(w) if *w == word)
    }

    fn error_at(&self, index: usize) -> SyntaxError {
        let token = &self.tokens[index];
        match &token.tok {
            Tok::End => SyntaxError::UnexpectedEnd {
                text: self.text.to_string(),
            },
            tok => unexpected(describe(tok), token.offset, self.text),
        }
    }

    fn unexpected(&self) -> SyntaxError {
        self.error_at(self.pos)
    }

    fn expect(&mut self, tok: Tok<'static>) -> Result<(), SyntaxError> {
        if *self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_end(&self) -> Result<(), SyntaxError> {
        match self.peek() {
            Tok::End => Ok(()),
            _ => Err(self.unexpected()),
        }
    }

    fn enter(&self, depth: usize) -> Result<usize, ValidationError> {
        let limit = self.ctx.config.max_expression_depth;
        if depth >= limit {
            return Err(ValidationError::DepthExceeded {
                what: "expression".into(),
                limit,
            });
        }
        Ok(depth + 1)
    }

    fn operator(&mut self, ops: &[BinaryOp]) -> Option<BinaryOp> {
        let op = match self.peek() {
            Tok::Word(w) => BinaryOp::from_keyword(w),
            _ => None,
        }
        .filter(|op| ops.contains(op))?;
        self.advance();
        Some(op)
    }

    /// Raw text of the parenthesized groups following the current token,
    /// e.g. the key of `Orders(5)`.
    fn groups(&mut self) -> Result<Vec<&'s str>, SyntaxError> {
        let mut groups = Vec::new();
        while *self.peek() == Tok::Open {
            let start = self.tokens[self.pos].offset + 1;
            let mut depth = 0usize;
            loop {
                match self.advance() {
                    Tok::Open => depth += 1,
                    Tok::Close => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    Tok::End => {
                        return Err(SyntaxError::Unbalanced {
                            text: self.text.to_string(),
                        })
                    }
                    _ => {}
                }
            }
            let end = self.tokens[self.pos - 1].offset;
            groups.push(&self.text[start..end]);
        }
        Ok(groups)
    }

    fn or_expr(&mut self, depth: usize, scope: Option<&Scope<'_>>) -> Result<Expr, UriError> {
        let mut left = self.and_expr(depth, scope)?;
        while let Some(op) = self.operator(&[BinaryOp::Or]) {
            let right = self.and_expr(depth, scope)?;
            left = logical(op, left, right)?;
        }
        Ok(left)
    }

    fn and_expr(&mut self, depth: usize, scope: Option<&Scope<'_>>) -> Result<Expr, UriError> {
        let mut left = self.not_expr(depth, scope)?;
        while let Some(op) = self.operator(&[BinaryOp::And]) {
            let right = self.not_expr(depth, scope)?;
            left = logical(op, left, right)?;
        }
        Ok(left)
    }

    //* notExpr = "not" RWS boolCommonExpr
    fn not_expr(&mut self, depth: usize, scope: Option<&Scope<'_>>) -> Result<Expr, UriError> {
        if !self.is_word("not") {
            return self.comparison(depth, scope);
        }
        self.advance();
        let depth = self.enter(depth)?;
        let operand = self.not_expr(depth, scope)?;
        if !is_boolean(&operand) {
            return Err(SemanticError::IncompatibleOperand {
                operator: "not".into(),
                operand: type_name(&operand),
            }
            .into());
        }
        Ok(Expr::new(
            ExprKind::Unary(UnaryOp::Not, Box::new(operand)),
            boolean(),
            false,
        ))
    }

    fn comparison(&mut self, depth: usize, scope: Option<&Scope<'_>>) -> Result<Expr, UriError> {
        use BinaryOp::*;
        let mut left = self.additive(depth, scope)?;
        while let Some(op) = self.operator(&[Eq, Ne, Gt, Ge, Lt, Le, Has, In]) {
            let right = if op == In {
                self.in_operand(depth, scope)?
            } else {
                self.additive(depth, scope)?
            };
            left = self.compare(op, left, right)?;
        }
        Ok(left)
    }

    fn additive(&mut self, depth: usize, scope: Option<&Scope<'_>>) -> Result<Expr, UriError> {
        let mut left = self.multiplicative(depth, scope)?;
        while let Some(op) = self.operator(&[BinaryOp::Add, BinaryOp::Sub]) {
            let right = self.multiplicative(depth, scope)?;
            left = self.arithmetic(op, left, right)?;
        }
        Ok(left)
    }

    fn multiplicative(&mut self, depth: usize, scope: Option<&Scope<'_>>) -> Result<Expr, UriError> {
        use BinaryOp::*;
        let mut left = self.unary(depth, scope)?;
        while let Some(op) = self.operator(&[Mul, Div, DivBy, Mod]) {
            let right = self.unary(depth, scope)?;
            left = self.arithmetic(op, left, right)?;
        }
        Ok(left)
    }

    //* negateExpr = "-" BWS commonExpr
    fn unary(&mut self, depth: usize, scope: Option<&Scope<'_>>) -> Result<Expr, UriError> {
        if *self.peek() != Tok::Minus {
            return self.primary(depth, scope);
        }
        self.advance();
        let depth = self.enter(depth)?;
        let operand = self.unary(depth, scope)?;
        let signed = operand.ty.is_none()
            || matches!(primitive(&operand), Some(p) if p.is_numeric() || p == Primitive::Duration);
        if !signed {
            return Err(SemanticError::IncompatibleOperand {
                operator: "-".into(),
                operand: type_name(&operand),
            }
            .into());
        }
        let ty = operand.ty.clone();
        Ok(Expr::new(
            ExprKind::Unary(UnaryOp::Minus, Box::new(operand)),
            ty,
            false,
        ))
    }

    fn primary(&mut self, depth: usize, scope: Option<&Scope<'_>>) -> Result<Expr, UriError> {
        let index = self.pos;
        match self.advance() {
            Tok::Literal(lit) => {
                let lit = literal::resolve_enum(self.ctx.schema, lit)?;
                let ty = lit.ty.clone();
                Ok(Expr::new(ExprKind::Literal(lit), ty, false))
            }
            Tok::Alias(name) => Ok(Expr::new(ExprKind::Alias(name.to_string()), None, false)),
            Tok::Open => {
                let depth = self.enter(depth)?;
                let inner = self.or_expr(depth, scope)?;
                self.expect(Tok::Close)?;
                Ok(inner)
            }
            Tok::Word(w) => self.word(w, index, depth, scope),
            _ => Err(self.error_at(index).into()),
        }
    }

    fn is_member_name(&self, name: &str, scope: Option<&Scope<'_>>) -> bool {
        Scope::find(scope, name).is_some()
            || self.target.crossjoin.iter().any(|s| s == name)
            || self
                .target
                .ty
                .as_ref()
                .map_or(false, |ty| self.ctx.schema.property(ty, name).is_some())
    }

    fn word(
        &mut self,
        word: &'s str,
        index: usize,
        depth: usize,
        scope: Option<&Scope<'_>>,
    ) -> Result<Expr, UriError> {
        if *self.peek() == Tok::Open {
            if let Some(method) = Method::from_name(word) {
                return self.method_call(method, depth, scope);
            }
            if !word.contains('.') && !word.starts_with('$') && !self.is_member_name(word, scope) {
                return Err(SemanticError::UnknownMethod { name: word.into() }.into());
            }
        }
        self.member(word, index, depth, scope)
    }

    /// `Edm.String` or `Namespace.Type` as the last argument of `cast`/`isof`.
    fn type_literal(&mut self) -> Option<Expr> {
        let name = match self.peek() {
            Tok::Word(w) if w.contains('.') => *w,
            _ => return None,
        };
        let follows = &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].tok;
        if !matches!(follows, Tok::Close | Tok::Comma) {
            return None;
        }
        let ty = self.ctx.schema.resolve_type_name(name)?;
        self.advance();
        Some(Expr::new(ExprKind::TypeLiteral(ty), None, false))
    }

    fn method_call(
        &mut self,
        method: Method,
        depth: usize,
        scope: Option<&Scope<'_>>,
    ) -> Result<Expr, UriError> {
        let depth = self.enter(depth)?;
        self.expect(Tok::Open)?;
        let mut args = Vec::new();
        if *self.peek() != Tok::Close {
            loop {
                let typed = match method {
                    Method::Cast | Method::IsOf => self.type_literal(),
                    _ => None,
                };
                let arg = match typed {
                    Some(arg) => arg,
                    None => self.or_expr(depth, scope)?,
                };
                args.push(arg);
                if *self.peek() != Tok::Comma {
                    break;
                }
                self.advance();
            }
        }
        self.expect(Tok::Close)?;
        Ok(method_expr(method, args)?)
    }

    //* memberExpr = [ qualifiedEntityTypeName "/" ]
    //*              ( propertyPathExpr / boundFunctionExpr / annotationExpr )
    //* rootExpr   = '$root/' ( entitySetName keyPredicate / singletonEntity ) [ singleNavigationExpr ]
    fn member(
        &mut self,
        first: &'s str,
        index: usize,
        depth: usize,
        scope: Option<&Scope<'_>>,
    ) -> Result<Expr, UriError> {
        let mut parts: Vec<ResourcePart> = Vec::new();
        let mut implicit = false;

        match first {
            "$it" => parts.push(self.target.it_part(first)?),
            "$root" => {
                self.expect(Tok::Slash)?;
                let at = self.pos;
                let name = match self.advance() {
                    Tok::Word(w) if !w.starts_with('$') => w,
                    _ => return Err(self.error_at(at).into()),
                };
                let head = Segment {
                    name,
                    groups: self.groups()?,
                };
                parts.push(path::root(self.ctx, &head, name, depth + 1)?);
            }
            _ if first.starts_with('$') => return Err(self.error_at(index).into()),
            _ => {
                if let Some(var) = Scope::find(scope, first) {
                    parts.push(ResourcePart::new(
                        PartKind::LambdaVariable { name: first.into() },
                        var.ty.clone(),
                        false,
                    ));
                } else if self.target.crossjoin.iter().any(|s| s == first) {
                    let head = Segment {
                        name: first,
                        groups: self.groups()?,
                    };
                    parts.push(path::root(self.ctx, &head, first, depth + 1)?);
                } else {
                    implicit = true;
                    let groups = self.groups()?;
                    let resolved = self
                        .target
                        .it_part(first)
                        .map_err(UriError::from)
                        .and_then(|it| {
                            parts.push(it);
                            path::step(self.ctx, &mut parts, first, &groups, depth + 1)
                        });
                    if let Err(err) = resolved {
                        // `x/...` with an unknown `x` reads as a lambda
                        // variable used outside its lambda.
                        let unknown = matches!(
                            err,
                            UriError::Semantic(
                                SemanticError::UnknownProperty { .. }
                                    | SemanticError::UnresolvableSegment { .. }
                            )
                        );
                        if unknown && *self.peek() == Tok::Slash && !first.contains('.') {
                            return Err(SemanticError::UnboundVariable { name: first.into() }.into());
                        }
                        return Err(err);
                    }
                }
            }
        }

        while *self.peek() == Tok::Slash {
            self.advance();
            let at = self.pos;
            let name = match self.advance() {
                Tok::Word(w) => w,
                _ => return Err(self.error_at(at).into()),
            };
            match name {
                "any" | "all" if *self.peek() == Tok::Open => {
                    return self.lambda(parts, name == "all", implicit, depth, scope);
                }
                "$count" => {
                    let part = path::pseudo(self.ctx, &parts, name)?;
                    parts.push(part);
                }
                _ if name.starts_with('$') => return Err(self.error_at(at).into()),
                _ => {
                    let groups = self.groups()?;
                    path::step(self.ctx, &mut parts, name, &groups, depth + 1)?;
                }
            }
        }

        if implicit {
            parts.remove(0);
        }
        let (ty, collection) = match parts.last() {
            Some(last) => (last.effective_type().cloned(), last.collection),
            None => (None, false),
        };
        Ok(Expr::new(ExprKind::Member(parts), ty, collection))
    }

    //* anyExpr = "any" OPEN BWS [ lambdaVariableExpr BWS COLON BWS lambdaPredicateExpr ] BWS CLOSE
    //* allExpr = "all" OPEN BWS   lambdaVariableExpr BWS COLON BWS lambdaPredicateExpr   BWS CLOSE
    fn lambda(
        &mut self,
        mut parts: Vec<ResourcePart>,
        all: bool,
        implicit: bool,
        depth: usize,
        scope: Option<&Scope<'_>>,
    ) -> Result<Expr, UriError> {
        let keyword = if all { "all" } else { "any" };
        let depth = self.enter(depth)?;
        let (element, context) = match parts.last() {
            Some(prev) if prev.collection => (prev.effective_type().cloned(), path::context_name(prev)),
            Some(prev) => {
                return Err(SemanticError::NotACollection {
                    segment: keyword.into(),
                    context: path::context_name(prev),
                }
                .into())
            }
            None => return Err(self.unexpected().into()),
        };
        self.expect(Tok::Open)?;

        let kind = if !all && *self.peek() == Tok::Close {
            self.advance();
            PartKind::LambdaAny {
                variable: None,
                expression: None,
            }
        } else {
            let at = self.pos;
            let variable = match self.advance() {
                Tok::Word(w) if !w.contains('.') && !w.starts_with('$') => w,
                _ => return Err(self.error_at(at).into()),
            };
            if Scope::find(scope, variable).is_some() {
                return Err(SemanticError::DuplicateVariable {
                    name: variable.into(),
                }
                .into());
            }
            self.expect(Tok::Colon)?;
            let ty = element.ok_or_else(|| SemanticError::UnresolvableSegment {
                name: keyword.into(),
                context,
            })?;
            let inner = Scope {
                name: variable,
                ty,
                parent: scope,
            };
            let body = self.or_expr(depth, Some(&inner))?;
            if !is_boolean(&body) {
                return Err(SemanticError::ExpectedBoolean {
                    option: format!("{}() body", keyword),
                    found: type_name(&body),
                }
                .into());
            }
            self.expect(Tok::Close)?;
            let variable = variable.to_string();
            let expression = Box::new(body);
            if all {
                PartKind::LambdaAll {
                    variable,
                    expression,
                }
            } else {
                PartKind::LambdaAny {
                    variable: Some(variable),
                    expression: Some(expression),
                }
            }
        };

        parts.push(ResourcePart::new(
            kind,
            EdmType::Primitive(Primitive::Boolean),
            false,
        ));
        if implicit {
            parts.remove(0);
        }
        let kind = if all {
            ExprKind::LambdaAll(parts)
        } else {
            ExprKind::LambdaAny(parts)
        };
        Ok(Expr::new(kind, boolean(), false))
    }

    //* inExpr = "in" RWS ( listExpr / commonExpr )
    fn in_operand(&mut self, depth: usize, scope: Option<&Scope<'_>>) -> Result<Expr, UriError> {
        if *self.peek() != Tok::Open {
            return self.additive(depth, scope);
        }
        self.advance();
        let depth = self.enter(depth)?;
        let mut items = Vec::new();
        loop {
            items.push(self.or_expr(depth, scope)?);
            if *self.peek() != Tok::Comma {
                break;
            }
            self.advance();
        }
        self.expect(Tok::Close)?;
        Ok(Expr::new(ExprKind::List(items), None, true))
    }

    /// Converts a literal operand to the declared type of the other operand.
    fn coerce_to(&self, expr: Expr, other: &Expr) -> Expr {
        let ty = match (&expr.kind, &other.ty) {
            (ExprKind::Literal(_), Some(ty))
                if !other.collection && !matches!(other.kind, ExprKind::Literal(_)) =>
            {
                ty.clone()
            }
            _ => return expr,
        };
        let lit = match &expr.kind {
            ExprKind::Literal(lit) => lit.clone(),
            _ => return expr,
        };
        match literal::coerce(self.ctx.schema, lit, &ty, &Facets::default()) {
            Ok(Some(lit)) => {
                let ty = lit.ty.clone();
                Expr::new(ExprKind::Literal(lit), ty, false)
            }
            _ => expr,
        }
    }

    fn align(&self, left: Expr, right: Expr) -> (Expr, Expr) {
        let right = self.coerce_to(right, &left);
        let left = self.coerce_to(left, &right);
        (left, right)
    }

    fn compare(&self, op: BinaryOp, left: Expr, right: Expr) -> Result<Expr, UriError> {
        let (left, right) = match op {
            BinaryOp::In => self.check_in(left, right)?,
            BinaryOp::Has => {
                let right = self.coerce_to(right, &left);
                let valid = !left.collection
                    && match (&left.ty, &right.ty) {
                        (Some(EdmType::Enum(a)), Some(EdmType::Enum(b))) => a == b,
                        (Some(EdmType::Enum(_)), None) | (None, _) => true,
                        _ => false,
                    };
                if !valid {
                    return Err(incompatible(op, &left, &right).into());
                }
                (left, right)
            }
            _ => {
                let (left, right) = self.align(left, right);
                if !comparable(op, &left, &right) {
                    return Err(incompatible(op, &left, &right).into());
                }
                (left, right)
            }
        };
        Ok(Expr::new(
            ExprKind::Binary(op, Box::new(left), Box::new(right)),
            boolean(),
            false,
        ))
    }

    fn check_in(&self, left: Expr, right: Expr) -> Result<(Expr, Expr), SemanticError> {
        if left.collection {
            return Err(incompatible(BinaryOp::In, &left, &right));
        }
        if let ExprKind::List(items) = right.kind {
            let mut checked = Vec::with_capacity(items.len());
            for item in items {
                let item = self.coerce_to(item, &left);
                if !comparable(BinaryOp::Eq, &left, &item) {
                    return Err(incompatible(BinaryOp::In, &left, &item));
                }
                checked.push(item);
            }
            return Ok((left, Expr::new(ExprKind::List(checked), None, true)));
        }
        let valid = match right.kind {
            ExprKind::Alias(_) => true,
            _ => right.collection && comparable_types(BinaryOp::Eq, left.ty.as_ref(), right.ty.as_ref()),
        };
        if !valid {
            return Err(incompatible(BinaryOp::In, &left, &right));
        }
        Ok((left, right))
    }

    fn arithmetic(&self, op: BinaryOp, left: Expr, right: Expr) -> Result<Expr, UriError> {
        let (left, right) = self.align(left, right);
        if left.collection || right.collection {
            return Err(incompatible(op, &left, &right).into());
        }
        let ty = match (&left.ty, &right.ty) {
            (None, None) => None,
            (Some(t), None) | (None, Some(t)) => {
                let usable = matches!(
                    t.as_primitive(),
                    Some(p) if p.is_numeric()
                        || matches!(p, Primitive::Duration | Primitive::Date | Primitive::DateTimeOffset)
                );
                if !usable {
                    return Err(incompatible(op, &left, &right).into());
                }
                Some(t.clone())
            }
            (Some(a), Some(b)) => {
                match (a.as_primitive(), b.as_primitive()) {
                    (Some(a), Some(b)) => arithmetic_type(op, a, b).map(EdmType::Primitive),
                    _ => None,
                }
                .ok_or_else(|| incompatible(op, &left, &right))
                .map(Some)?
            }
        };
        Ok(Expr::new(
            ExprKind::Binary(op, Box::new(left), Box::new(right)),
            ty,
            false,
        ))
    }
}

fn logical(op: BinaryOp, left: Expr, right: Expr) -> Result<Expr, SemanticError> {
    if !is_boolean(&left) || !is_boolean(&right) {
        return Err(incompatible(op, &left, &right));
    }
    Ok(Expr::new(
        ExprKind::Binary(op, Box::new(left), Box::new(right)),
        boolean(),
        false,
    ))
}

/// Parses a complete common expression against `target`.
pub(crate) fn parse_expression(ctx: Context<'_>, target: &Target, text: &str) -> Result<Expr, UriError> {
    parse_expression_at(ctx, target, text, 0)
}

/// Like [`parse_expression`], for an expression nested `depth` levels deep
/// in another one.
pub(crate) fn parse_expression_at(
    ctx: Context<'_>,
    target: &Target,
    text: &str,
    depth: usize,
) -> Result<Expr, UriError> {
    let mut parser = ExprParser::new(ctx, target, text)?;
    let depth = parser.enter(depth)?;
    let expr = parser.or_expr(depth, None)?;
    parser.expect_end()?;
    trace!(expr = %expr, "expression");
    Ok(expr)
}

//* filter = ( "$filter" / "filter" ) EQ boolCommonExpr
pub(crate) fn parse_filter(ctx: Context<'_>, target: &Target, text: &str) -> Result<Expr, UriError> {
    let expr = parse_expression(ctx, target, text)?;
    if !is_boolean(&expr) {
        return Err(SemanticError::ExpectedBoolean {
            option: "$filter".into(),
            found: type_name(&expr),
        }
        .into());
    }
    Ok(expr)
}

//* orderby     = ( "$orderby" / "orderby" ) EQ orderbyItem *( COMMA orderbyItem )
//* orderbyItem = commonExpr [ RWS ( "asc" / "desc" ) ]
pub(crate) fn parse_orderby(
    ctx: Context<'_>,
    target: &Target,
    text: &str,
) -> Result<Vec<OrderByItem>, UriError> {
    let mut parser = ExprParser::new(ctx, target, text)?;
    let mut items = Vec::new();
    loop {
        let depth = parser.enter(0)?;
        let expr = parser.or_expr(depth, None)?;
        let descending = if parser.is_word("desc") {
            parser.advance();
            true
        } else {
            if parser.is_word("asc") {
                parser.advance();
            }
            false
        };
        items.push(OrderByItem { expr, descending });
        if *parser.peek() != Tok::Comma {
            break;
        }
        parser.advance();
    }
    parser.expect_end()?;
    Ok(items)
}

fn too_deep(input: &str) -> nom::Err<NomError<&str>> {
    nom::Err::Failure(NomError::new(input, ErrorKind::TooLarge))
}

//* searchWord = 1*( ALPHA / DIGIT / ... ) ; not AND, OR or NOT
fn search_word(input: &str) -> IResult<&str, &str> {
    verify(
        take_till1(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '"')),
        |w: &str| !matches!(w, "AND" | "OR" | "NOT"),
    )(input)
}

//* searchPhrase = quotation-mark 1*( qchar-no-AMP-DQUOTE / SP ) quotation-mark
fn search_phrase(input: &str) -> IResult<&str, String> {
    delimited(
        pchar('"'),
        escaped_transform(
            none_of("\"\\"),
            '\\',
            alt((value("\\", tag("\\")), value("\"", tag("\"")))),
        ),
        pchar('"'),
    )(input)
}

fn or_keyword(input: &str) -> IResult<&str, ()> {
    value((), tuple((space1, tag("OR"), space1)))(input)
}

//* searchExpr   = ( OPEN BWS searchExpr BWS CLOSE / searchTerm ) [ searchOrExpr / searchAndExpr ]
//* searchOrExpr = RWS 'OR' RWS searchExpr
fn search_or(input: &str, depth: usize, limit: usize) -> IResult<&str, SearchExpr> {
    let (mut input, mut left) = search_and(input, depth, limit)?;
    loop {
        match preceded(or_keyword, |i| search_and(i, depth, limit))(input) {
            Ok((rest, right)) => {
                left = SearchExpr::Or(Box::new(left), Box::new(right));
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, left)),
            Err(e) => return Err(e),
        }
    }
}

//* searchAndExpr = RWS [ 'AND' RWS ] searchExpr
fn search_and(input: &str, depth: usize, limit: usize) -> IResult<&str, SearchExpr> {
    let (mut input, mut left) = search_not(input, depth, limit)?;
    loop {
        if peek(or_keyword)(input).is_ok() {
            return Ok((input, left));
        }
        let and = pair(space1, opt(pair(tag("AND"), space1)));
        match preceded(and, |i| search_not(i, depth, limit))(input) {
            Ok((rest, right)) => {
                left = SearchExpr::And(Box::new(left), Box::new(right));
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, left)),
            Err(e) => return Err(e),
        }
    }
}

//* searchTerm = [ 'NOT' RWS ] ( searchPhrase / searchWord )
fn search_not(input: &str, depth: usize, limit: usize) -> IResult<&str, SearchExpr> {
    if depth >= limit {
        return Err(too_deep(input));
    }
    alt((
        map(
            preceded(pair(tag("NOT"), space1), |i| search_not(i, depth + 1, limit)),
            |e| SearchExpr::Not(Box::new(e)),
        ),
        delimited(
            pair(pchar('('), space0),
            |i| search_or(i, depth + 1, limit),
            pair(space0, pchar(')')),
        ),
        map(search_phrase, SearchExpr::Phrase),
        map(search_word, |w: &str| SearchExpr::Term(w.to_string())),
    ))(input)
}

//* search = ( "$search" / "search" ) EQ BWS searchExpr
pub(crate) fn parse_search(text: &str, limit: usize) -> Result<SearchExpr, UriError> {
    match all_consuming(|i| search_or(i, 0, limit))(text.trim()) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => {
            Err(ValidationError::DepthExceeded {
                what: "$search".into(),
                limit,
            }
            .into())
        }
        Err(_) => Err(SyntaxError::InvalidOptionValue {
            option: "$search".into(),
            value: text.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<Tok<'_>> {
        tokenize(text).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn tokens_prefer_literals_over_words() {
        let toks = kinds("Name eq 'x' and INFO gt -5");
        assert_eq!(toks[0], Tok::Word("Name"));
        assert_eq!(toks[1], Tok::Word("eq"));
        assert!(matches!(&toks[2], Tok::Literal(l) if l.text == "'x'"));
        assert_eq!(toks[4], Tok::Word("INFO"));
        assert!(matches!(&toks[6], Tok::Literal(l) if l.text == "-5"));
        assert_eq!(toks[7], Tok::End);
    }

    #[test]
    fn tokens_of_a_lambda() {
        let toks = kinds("Orders/any(o:o/Id eq @p)");
        assert_eq!(
            &toks[..6],
            &[
                Tok::Word("Orders"),
                Tok::Slash,
                Tok::Word("any"),
                Tok::Open,
                Tok::Word("o"),
                Tok::Colon,
            ]
        );
        assert!(toks.contains(&Tok::Alias("@p")));
    }

    #[test]
    fn bad_characters_report_their_offset() {
        let err = tokenize("Name eq ;").err().unwrap();
        assert_eq!(
            err,
            SyntaxError::UnexpectedToken {
                found: ";".into(),
                offset: 8,
                text: "Name eq ;".into(),
            }
        );
    }

    #[test]
    fn search_precedence() {
        let expr = parse_search("blue OR green red", 16).unwrap();
        assert_eq!(
            expr,
            SearchExpr::Or(
                Box::new(SearchExpr::Term("blue".into())),
                Box::new(SearchExpr::And(
                    Box::new(SearchExpr::Term("green".into())),
                    Box::new(SearchExpr::Term("red".into())),
                )),
            )
        );
    }

    #[test]
    fn search_phrases_and_negation() {
        let expr = parse_search("NOT \"light blue\"", 16).unwrap();
        assert_eq!(
            expr,
            SearchExpr::Not(Box::new(SearchExpr::Phrase("light blue".into())))
        );
        assert!(parse_search("(a AND b)", 16).is_ok());
        assert!(parse_search("a AND", 16).unwrap_err().is_syntax());
    }

    #[test]
    fn search_nesting_is_bounded() {
        let text = format!("{}x{}", "(".repeat(20), ")".repeat(20));
        let err = parse_search(&text, 8).unwrap_err();
        assert!(err.is_validation());
    }
}
