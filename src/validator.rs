//! Combination rules: which system query options and HTTP methods a request
//! may use, keyed by what its resource path addresses.

use std::fmt;
use std::str::FromStr;

use tracing::trace;

use crate::ast::{PartKind, RequestDescriptor, RequestKind, ResourcePart, SystemOption};
use crate::error::ValidationError;
use crate::schema::{EdmType, Primitive};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            HttpMethod::Get,
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Patch,
            HttpMethod::Delete,
        ]
        .into_iter()
        .find(|m| m.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| ValidationError::MethodNotAllowed {
            method: s.to_string(),
            target: "any request".into(),
        })
    }
}

/// What a request addresses, as far as the combination rules care.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UriType {
    Service,
    Metadata,
    Batch,
    Crossjoin,
    All,
    EntityId,
    EntityCollection,
    Entity,
    EntityCount,
    MediaValue,
    Primitive,
    PrimitiveValue,
    PrimitiveCollection,
    PrimitiveCollectionCount,
    Complex,
    ComplexCollection,
    ComplexCollectionCount,
    Reference,
    ReferenceCollection,
    Action,
}

impl UriType {
    pub fn label(self) -> &'static str {
        match self {
            UriType::Service => "the service document",
            UriType::Metadata => "the metadata document",
            UriType::Batch => "a batch request",
            UriType::Crossjoin => "a cross join",
            UriType::All => "$all",
            UriType::EntityId => "an entity id",
            UriType::EntityCollection => "an entity collection",
            UriType::Entity => "an entity",
            UriType::EntityCount => "an entity count",
            UriType::MediaValue => "a media value",
            UriType::Primitive => "a primitive value",
            UriType::PrimitiveValue => "a raw primitive value",
            UriType::PrimitiveCollection => "a primitive collection",
            UriType::PrimitiveCollectionCount => "a primitive collection count",
            UriType::Complex => "a complex value",
            UriType::ComplexCollection => "a complex collection",
            UriType::ComplexCollectionCount => "a complex collection count",
            UriType::Reference => "an entity reference",
            UriType::ReferenceCollection => "a reference collection",
            UriType::Action => "an action",
        }
    }

    fn is_collection(self) -> bool {
        matches!(
            self,
            UriType::Crossjoin
                | UriType::All
                | UriType::EntityCollection
                | UriType::EntityCount
                | UriType::PrimitiveCollection
                | UriType::PrimitiveCollectionCount
                | UriType::ComplexCollection
                | UriType::ComplexCollectionCount
                | UriType::ReferenceCollection
        )
    }
}

impl fmt::Display for UriType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifies a request by its kind and final resource path segment.
pub fn classify(descriptor: &RequestDescriptor) -> UriType {
    match descriptor.kind {
        RequestKind::Service => UriType::Service,
        RequestKind::Metadata => UriType::Metadata,
        RequestKind::Batch => UriType::Batch,
        RequestKind::Crossjoin => UriType::Crossjoin,
        RequestKind::All => UriType::All,
        RequestKind::EntityId => UriType::EntityId,
        RequestKind::Resource => resource_type(&descriptor.resource_path),
    }
}

fn resource_type(parts: &[ResourcePart]) -> UriType {
    let mut parts = parts
        .iter()
        .rev()
        .filter(|p| !matches!(p.kind, PartKind::TypeCast));
    let last = match parts.next() {
        Some(last) => last,
        None => return UriType::Service,
    };
    match &last.kind {
        PartKind::Action { .. } => UriType::Action,
        PartKind::Count => match parts.next().and_then(ResourcePart::effective_type) {
            Some(EdmType::Entity(_)) => UriType::EntityCount,
            Some(EdmType::Complex(_)) => UriType::ComplexCollectionCount,
            _ => UriType::PrimitiveCollectionCount,
        },
        PartKind::Ref if last.collection => UriType::ReferenceCollection,
        PartKind::Ref => UriType::Reference,
        PartKind::Value => {
            let stream = matches!(&last.ty, Some(t) if t.is_primitive(Primitive::Stream));
            let entity = matches!(parts.next().and_then(ResourcePart::effective_type), Some(EdmType::Entity(_)));
            if stream && entity {
                UriType::MediaValue
            } else {
                UriType::PrimitiveValue
            }
        }
        _ => match (last.effective_type(), last.collection) {
            (Some(EdmType::Entity(_)), true) => UriType::EntityCollection,
            (Some(EdmType::Entity(_)), false) => UriType::Entity,
            (Some(EdmType::Complex(_)), true) => UriType::ComplexCollection,
            (Some(EdmType::Complex(_)), false) => UriType::Complex,
            (Some(_), true) => UriType::PrimitiveCollection,
            (Some(_), false) => UriType::Primitive,
            (None, _) => UriType::Action,
        },
    }
}

/// System options permitted on a GET of `uri_type`.
fn get_options(uri_type: UriType) -> &'static [SystemOption] {
    use SystemOption::*;
    match uri_type {
        UriType::Service | UriType::Metadata => &[Format],
        UriType::Batch => &[],
        UriType::Crossjoin | UriType::All => &[
            Filter, Format, Count, OrderBy, Search, Select, Skip, SkipToken, Top, Expand,
        ],
        UriType::EntityId => &[Format, Id, Select, Expand],
        UriType::EntityCollection => &[
            Filter, Format, Count, OrderBy, Search, Select, Skip, SkipToken, DeltaToken, Top, Expand,
        ],
        UriType::Entity | UriType::Complex => &[Format, Select, Expand],
        UriType::EntityCount => &[Filter, Search],
        UriType::MediaValue | UriType::Primitive | UriType::PrimitiveValue => &[Format],
        UriType::PrimitiveCollection => &[Filter, Format, Count, OrderBy, Skip, SkipToken, Top],
        UriType::PrimitiveCollectionCount | UriType::ComplexCollectionCount => &[Filter],
        UriType::ComplexCollection => &[
            Filter, Format, Count, OrderBy, Select, Skip, SkipToken, Top, Expand,
        ],
        UriType::Reference | UriType::Action => &[Format],
        UriType::ReferenceCollection => &[
            Filter, Format, Count, OrderBy, Search, Skip, SkipToken, Top,
        ],
    }
}

fn is_allowed(uri_type: UriType, method: HttpMethod, option: SystemOption) -> bool {
    match method {
        HttpMethod::Get => get_options(uri_type).contains(&option),
        _ if option == SystemOption::Format => true,
        HttpMethod::Delete => option == SystemOption::Id && uri_type == UriType::ReferenceCollection,
        HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => {
            matches!(option, SystemOption::Select | SystemOption::Expand)
                && matches!(uri_type, UriType::Entity | UriType::EntityCollection)
        }
    }
}

fn method_allowed(uri_type: UriType, method: HttpMethod) -> bool {
    use HttpMethod::*;
    match uri_type {
        UriType::Action | UriType::Batch => method == Post,
        UriType::Service
        | UriType::Metadata
        | UriType::Crossjoin
        | UriType::All
        | UriType::EntityId
        | UriType::EntityCount
        | UriType::PrimitiveCollectionCount
        | UriType::ComplexCollectionCount => method == Get,
        UriType::EntityCollection => matches!(method, Get | Post),
        UriType::ReferenceCollection => matches!(method, Get | Post | Delete),
        UriType::PrimitiveCollection | UriType::ComplexCollection => true,
        UriType::Entity
        | UriType::Primitive
        | UriType::PrimitiveValue
        | UriType::Complex
        | UriType::MediaValue
        | UriType::Reference => matches!(method, Get | Put | Patch | Delete),
    }
}

fn not_allowed(method: HttpMethod, uri_type: UriType) -> ValidationError {
    ValidationError::MethodNotAllowed {
        method: method.to_string(),
        target: uri_type.to_string(),
    }
}

/// Whether no segment may follow `part`. `before_pseudo` tells whether the
/// next segment is `$value`, `$count` or `$ref`.
pub(crate) fn ends_path(part: &ResourcePart, before_pseudo: bool) -> bool {
    match &part.kind {
        PartKind::Value | PartKind::Count | PartKind::Ref | PartKind::Action { .. } => true,
        PartKind::Function { composable, .. } => {
            !before_pseudo && !(*composable && part.effective_type().map_or(false, EdmType::is_structured))
        }
        _ => false,
    }
}

/// Checks the resource path of `descriptor` against `method`.
pub(crate) fn check_path(descriptor: &RequestDescriptor, method: HttpMethod) -> Result<(), ValidationError> {
    let uri_type = classify(descriptor);

    for pair in descriptor.resource_path.windows(2) {
        let before_pseudo = matches!(pair[1].kind, PartKind::Value | PartKind::Count | PartKind::Ref);
        if ends_path(&pair[0], before_pseudo) {
            return Err(ValidationError::NotFinalSegment {
                segment: pair[0].segment_name(),
            });
        }
    }

    let invoked = descriptor
        .resource_path
        .iter()
        .rev()
        .find(|p| !matches!(p.kind, PartKind::Value | PartKind::Count | PartKind::Ref | PartKind::TypeCast));
    if matches!(invoked, Some(p) if matches!(p.kind, PartKind::Function { .. })) && method != HttpMethod::Get {
        return Err(not_allowed(method, uri_type));
    }
    if !method_allowed(uri_type, method) {
        return Err(not_allowed(method, uri_type));
    }

    for part in &descriptor.resource_path {
        let keyable = matches!(
            part.kind,
            PartKind::EntitySet { .. } | PartKind::Navigation { .. } | PartKind::Function { .. }
        );
        if part.has_keys() && !keyable {
            return Err(ValidationError::KeyNotAllowed {
                segment: part.segment_name(),
            });
        }
    }
    Ok(())
}

/// Checks which system options `descriptor` may carry with `method`.
pub(crate) fn check_options(
    descriptor: &RequestDescriptor,
    method: HttpMethod,
    present: &[SystemOption],
) -> Result<(), ValidationError> {
    let uri_type = classify(descriptor);
    let has = |option: SystemOption| present.contains(&option);

    if has(SystemOption::Search) && !uri_type.is_collection() && method == HttpMethod::Get {
        return Err(ValidationError::RequiresCollection {
            option: SystemOption::Search.name().into(),
        });
    }
    if let Some(option) = present.iter().find(|o| !is_allowed(uri_type, method, **o)) {
        return Err(ValidationError::OptionNotAllowed {
            option: option.name().into(),
            target: uri_type.to_string(),
            method: method.to_string(),
        });
    }

    let needs_id = uri_type == UriType::EntityId
        || (uri_type == UriType::ReferenceCollection && method == HttpMethod::Delete);
    if needs_id && !has(SystemOption::Id) {
        return Err(ValidationError::MissingOption {
            option: SystemOption::Id.name().into(),
        });
    }
    Ok(())
}

/// Validates a parsed request for `method`.
pub fn validate(descriptor: &RequestDescriptor, method: HttpMethod) -> Result<(), ValidationError> {
    check_path(descriptor, method)?;
    check_options(descriptor, method, &descriptor.options.present())?;
    trace!(uri_type = %classify(descriptor), %method, "valid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FullName;

    fn customer() -> EdmType {
        EdmType::Entity(FullName::new("shop", "Customer"))
    }

    fn customers() -> RequestDescriptor {
        let mut d = RequestDescriptor::new(RequestKind::Resource);
        d.resource_path.push(ResourcePart::new(
            PartKind::EntitySet {
                name: "Customers".into(),
            },
            customer(),
            true,
        ));
        d
    }

    #[test]
    fn classification_follows_the_last_segment() {
        let mut d = customers();
        assert_eq!(classify(&d), UriType::EntityCollection);

        d.resource_path.push(ResourcePart::new(
            PartKind::Count,
            EdmType::Primitive(Primitive::Int64),
            false,
        ));
        assert_eq!(classify(&d), UriType::EntityCount);

        d.resource_path.pop();
        d.resource_path.push(ResourcePart::new(PartKind::Ref, customer(), true));
        assert_eq!(classify(&d), UriType::ReferenceCollection);

        assert_eq!(classify(&RequestDescriptor::new(RequestKind::Metadata)), UriType::Metadata);
    }

    #[test]
    fn methods_per_uri_type() {
        let d = customers();
        assert!(check_path(&d, HttpMethod::Get).is_ok());
        assert!(check_path(&d, HttpMethod::Post).is_ok());
        assert_eq!(
            check_path(&d, HttpMethod::Delete),
            Err(ValidationError::MethodNotAllowed {
                method: "DELETE".into(),
                target: "an entity collection".into(),
            })
        );
        let batch = RequestDescriptor::new(RequestKind::Batch);
        assert!(check_path(&batch, HttpMethod::Get).is_err());
        assert!(check_path(&batch, HttpMethod::Post).is_ok());
    }

    #[test]
    fn options_per_uri_type_and_method() {
        let d = customers();
        let get = |options: &[SystemOption]| check_options(&d, HttpMethod::Get, options);
        assert!(get(&[SystemOption::Filter, SystemOption::Top, SystemOption::Expand]).is_ok());
        assert!(matches!(
            get(&[SystemOption::Levels]),
            Err(ValidationError::OptionNotAllowed { .. })
        ));
        assert!(check_options(&d, HttpMethod::Post, &[SystemOption::Select]).is_ok());
        assert!(check_options(&d, HttpMethod::Post, &[SystemOption::Filter]).is_err());
    }

    #[test]
    fn search_and_id_requirements() {
        let mut d = customers();
        d.resource_path[0].collection = false;
        assert_eq!(
            check_options(&d, HttpMethod::Get, &[SystemOption::Search]),
            Err(ValidationError::RequiresCollection {
                option: "$search".into()
            })
        );

        let entity = RequestDescriptor::new(RequestKind::EntityId);
        assert_eq!(
            check_options(&entity, HttpMethod::Get, &[]),
            Err(ValidationError::MissingOption {
                option: "$id".into()
            })
        );
        assert!(check_options(&entity, HttpMethod::Get, &[SystemOption::Id]).is_ok());
    }

    #[test]
    fn terminal_segments_end_the_path() {
        let mut d = customers();
        d.resource_path.push(ResourcePart::new(PartKind::Ref, customer(), true));
        assert!(validate(&d, HttpMethod::Get).is_ok());

        d.resource_path.push(ResourcePart::new(
            PartKind::Navigation {
                name: "Orders".into(),
            },
            EdmType::Entity(FullName::new("shop", "Order")),
            true,
        ));
        assert_eq!(
            validate(&d, HttpMethod::Get),
            Err(ValidationError::NotFinalSegment {
                segment: "$ref".into()
            })
        );

        let mut d = customers();
        d.resource_path.push(ResourcePart::untyped(PartKind::Action {
            name: FullName::new("shop", "Promote"),
            import: None,
        }));
        d.resource_path.push(ResourcePart::new(
            PartKind::Count,
            EdmType::Primitive(Primitive::Int64),
            false,
        ));
        assert!(matches!(
            check_path(&d, HttpMethod::Post),
            Err(ValidationError::NotFinalSegment { .. })
        ));
    }

    #[test]
    fn method_names_parse_case_insensitively() {
        assert_eq!("patch".parse::<HttpMethod>(), Ok(HttpMethod::Patch));
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }
}
