//! Schema model consumed by the parser.
//!
//! The parser only ever asks the schema questions through [`SchemaAccess`];
//! [`Document`] is the in-memory model that answers them. Names of types are
//! always namespace-qualified ([`FullName`]), names of container members and
//! properties are plain identifiers.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use kind::Primitive;

pub type Identifier = String;

// Bound on base-type walks, so a cyclic `base_type` chain in a broken schema
// terminates.
const MAX_HIERARCHY_DEPTH: usize = 32;

/// A namespace-qualified schema element name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FullName {
    pub namespace: String,
    pub name: Identifier,
}

impl FullName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        FullName {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Splits `Some.Namespace.Name` at the last dot.
    pub fn parse(qualified: &str) -> Option<Self> {
        let idx = qualified.rfind('.')?;
        let (namespace, name) = (&qualified[..idx], &qualified[idx + 1..]);
        if namespace.is_empty() || name.is_empty() {
            return None;
        }
        Some(FullName::new(namespace, name))
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// A resolved type reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdmType {
    Primitive(Primitive),
    Entity(FullName),
    Complex(FullName),
    Enum(FullName),
}

impl EdmType {
    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            EdmType::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, EdmType::Entity(_))
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, EdmType::Entity(_) | EdmType::Complex(_))
    }

    pub fn is_primitive(&self, primitive: Primitive) -> bool {
        matches!(self, EdmType::Primitive(p) if *p == primitive)
    }
}

impl fmt::Display for EdmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdmType::Primitive(p) => f.write_str(p.name()),
            EdmType::Entity(n) | EdmType::Complex(n) | EdmType::Enum(n) => n.fmt(f),
        }
    }
}

/// Things stored by name in the model's maps.
pub trait Named {
    fn name(&self) -> &str;
}

/// Builds a name-keyed map from a slice of named items.
pub fn map<T: Named + Clone>(items: &[T]) -> HashMap<Identifier, T> {
    items
        .iter()
        .map(|item| (item.name().to_string(), item.clone()))
        .collect()
}

/// Read-only name resolution over a service schema.
///
/// Implementations must return stable answers for the duration of a parse;
/// all methods take `&self` so one schema can serve parallel parses.
pub trait SchemaAccess {
    fn entity_set(&self, name: &str) -> Option<&EntitySet>;
    fn singleton(&self, name: &str) -> Option<&Singleton>;
    fn action_import(&self, name: &str) -> Option<&ActionImport>;
    fn function_import(&self, name: &str) -> Option<&FunctionImport>;

    fn entity_type(&self, name: &FullName) -> Option<&kind::Entity>;
    fn complex_type(&self, name: &FullName) -> Option<&kind::Complex>;
    fn enum_type(&self, name: &FullName) -> Option<&kind::Enumeration>;

    /// All action overloads with this qualified name.
    fn actions(&self, name: &FullName) -> Vec<&Action>;
    /// All function overloads with this qualified name.
    fn functions(&self, name: &FullName) -> Vec<&Function>;

    /// Maps a namespace or namespace alias to the namespace it denotes.
    fn namespace_of(&self, qualifier: &str) -> Option<&str>;

    /// Rewrites an alias-qualified name into its namespace-qualified form.
    fn normalize(&self, name: &FullName) -> Option<FullName> {
        self.namespace_of(&name.namespace)
            .map(|ns| FullName::new(ns, name.name.clone()))
    }

    /// Resolves `Edm.Int32`, `Namespace.Type` or `Alias.Type` to a type.
    fn resolve_type_name(&self, qualified: &str) -> Option<EdmType> {
        if let Some(primitive) = Primitive::from_name(qualified) {
            return Some(EdmType::Primitive(primitive));
        }
        let name = self.normalize(&FullName::parse(qualified)?)?;
        if self.entity_type(&name).is_some() {
            Some(EdmType::Entity(name))
        } else if self.complex_type(&name).is_some() {
            Some(EdmType::Complex(name))
        } else if self.enum_type(&name).is_some() {
            Some(EdmType::Enum(name))
        } else {
            None
        }
    }

    fn base_type(&self, ty: &EdmType) -> Option<EdmType> {
        match ty {
            EdmType::Entity(n) => self
                .entity_type(n)?
                .base_type
                .clone()
                .map(EdmType::Entity),
            EdmType::Complex(n) => self
                .complex_type(n)?
                .base_type
                .clone()
                .map(EdmType::Complex),
            _ => None,
        }
    }

    /// True when `sub` is `base` or derives from it.
    fn is_subtype(&self, sub: &EdmType, base: &EdmType) -> bool {
        if let (EdmType::Primitive(s), EdmType::Primitive(b)) = (sub, base) {
            return s == b || s.is_subkind_of(*b);
        }
        let mut current = sub.clone();
        for _ in 0..MAX_HIERARCHY_DEPTH {
            if &current == base {
                return true;
            }
            match self.base_type(&current) {
                Some(next) => current = next,
                None => return false,
            }
        }
        false
    }

    /// True for entity types (or their bases) declared with a media stream.
    fn is_media_entity(&self, ty: &EdmType) -> bool {
        let mut current = Some(ty.clone());
        for _ in 0..MAX_HIERARCHY_DEPTH {
            match current {
                Some(EdmType::Entity(n)) => match self.entity_type(&n) {
                    Some(entity) if entity.has_stream => return true,
                    Some(entity) => current = entity.base_type.clone().map(EdmType::Entity),
                    None => return false,
                },
                _ => return false,
            }
        }
        false
    }

    /// Looks a structural or navigation property up on a structured type and
    /// its base types.
    fn property(&self, ty: &EdmType, name: &str) -> Option<&property::Property> {
        let mut current = Some(ty.clone());
        for _ in 0..MAX_HIERARCHY_DEPTH {
            let t = current?;
            let found = match &t {
                EdmType::Entity(n) => self.entity_type(n).and_then(|e| e.properties.get(name)),
                EdmType::Complex(n) => self.complex_type(n).and_then(|c| c.properties.get(name)),
                _ => return None,
            };
            if found.is_some() {
                return found;
            }
            current = self.base_type(&t);
        }
        None
    }

    /// Key properties of an entity type in declaration order; keys are
    /// inherited from the nearest base type that declares them.
    fn key_properties(&self, ty: &EdmType) -> Vec<&property::Structural> {
        let mut current = Some(ty.clone());
        for _ in 0..MAX_HIERARCHY_DEPTH {
            let t = match current {
                Some(t) => t,
                None => break,
            };
            let declared = match &t {
                EdmType::Entity(n) => match self.entity_type(n) {
                    Some(entity) => entity.key.as_ref(),
                    None => return Vec::new(),
                },
                _ => return Vec::new(),
            };
            if let Some(names) = declared {
                return names
                    .iter()
                    .filter_map(|name| match self.property(ty, name) {
                        Some(property::Property::Structural(s)) => Some(s),
                        _ => None,
                    })
                    .collect();
            }
            current = self.base_type(&t);
        }
        Vec::new()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub version: String,
    pub service_root: String,
    pub schemas: HashMap<Identifier, Schema>,
    pub entity_container: EntityContainer,
}

impl Document {
    pub fn new() -> Self {
        Self {
            version: String::from("4.01"),
            ..Document::default()
        }
    }

    fn schema(&self, qualifier: &str) -> Option<&Schema> {
        let namespace = self.namespace_of(qualifier)?;
        self.schemas.get(namespace)
    }
}

impl SchemaAccess for Document {
    fn entity_set(&self, name: &str) -> Option<&EntitySet> {
        self.entity_container.entity_sets.get(name)
    }

    fn singleton(&self, name: &str) -> Option<&Singleton> {
        self.entity_container.singletons.get(name)
    }

    fn action_import(&self, name: &str) -> Option<&ActionImport> {
        self.entity_container.action_imports.get(name)
    }

    fn function_import(&self, name: &str) -> Option<&FunctionImport> {
        self.entity_container.function_imports.get(name)
    }

    fn entity_type(&self, name: &FullName) -> Option<&kind::Entity> {
        self.schema(&name.namespace)?.entity_types.get(&name.name)
    }

    fn complex_type(&self, name: &FullName) -> Option<&kind::Complex> {
        self.schema(&name.namespace)?.complex_types.get(&name.name)
    }

    fn enum_type(&self, name: &FullName) -> Option<&kind::Enumeration> {
        self.schema(&name.namespace)?.enum_types.get(&name.name)
    }

    fn actions(&self, name: &FullName) -> Vec<&Action> {
        match self.schema(&name.namespace) {
            Some(schema) => schema.actions.iter().filter(|a| a.name == name.name).collect(),
            None => Vec::new(),
        }
    }

    fn functions(&self, name: &FullName) -> Vec<&Function> {
        match self.schema(&name.namespace) {
            Some(schema) => schema
                .functions
                .iter()
                .filter(|f| f.name == name.name)
                .collect(),
            None => Vec::new(),
        }
    }

    fn namespace_of(&self, qualifier: &str) -> Option<&str> {
        if let Some(schema) = self.schemas.get(qualifier) {
            return Some(&schema.namespace);
        }
        self.schemas
            .values()
            .find(|s| s.alias.as_deref() == Some(qualifier))
            .map(|s| s.namespace.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub namespace: Identifier,
    pub alias: Option<Identifier>,
    pub entity_types: HashMap<Identifier, kind::Entity>,
    pub complex_types: HashMap<Identifier, kind::Complex>,
    pub enum_types: HashMap<Identifier, kind::Enumeration>,
    pub actions: Vec<Action>,
    pub functions: Vec<Function>,
}

impl Named for Schema {
    fn name(&self) -> &str {
        &self.namespace
    }
}

pub mod kind {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use super::{property::Property, FullName, Identifier, Named};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum Primitive {
        Binary,
        Boolean,
        Byte,
        Date,
        DateTimeOffset,
        Decimal,
        Double,
        Duration,
        Guid,
        Int16,
        Int32,
        Int64,
        SByte,
        Single,
        Stream,
        #[default]
        String,
        TimeOfDay,
        Geography,
        GeographyPoint,
        GeographyLineString,
        GeographyPolygon,
        GeographyMultiPoint,
        GeographyMultiLineString,
        GeographyMultiPolygon,
        GeographyCollection,
        Geometry,
        GeometryPoint,
        GeometryLineString,
        GeometryPolygon,
        GeometryMultiPoint,
        GeometryMultiLineString,
        GeometryMultiPolygon,
        GeometryCollection,
    }

    const ALL: [Primitive; 33] = [
        Primitive::Binary,
        Primitive::Boolean,
        Primitive::Byte,
        Primitive::Date,
        Primitive::DateTimeOffset,
        Primitive::Decimal,
        Primitive::Double,
        Primitive::Duration,
        Primitive::Guid,
        Primitive::Int16,
        Primitive::Int32,
        Primitive::Int64,
        Primitive::SByte,
        Primitive::Single,
        Primitive::Stream,
        Primitive::String,
        Primitive::TimeOfDay,
        Primitive::Geography,
        Primitive::GeographyPoint,
        Primitive::GeographyLineString,
        Primitive::GeographyPolygon,
        Primitive::GeographyMultiPoint,
        Primitive::GeographyMultiLineString,
        Primitive::GeographyMultiPolygon,
        Primitive::GeographyCollection,
        Primitive::Geometry,
        Primitive::GeometryPoint,
        Primitive::GeometryLineString,
        Primitive::GeometryPolygon,
        Primitive::GeometryMultiPoint,
        Primitive::GeometryMultiLineString,
        Primitive::GeometryMultiPolygon,
        Primitive::GeometryCollection,
    ];

    impl Primitive {
        pub fn name(self) -> &'static str {
            use Primitive::*;
            match self {
                Binary => "Edm.Binary",
                Boolean => "Edm.Boolean",
                Byte => "Edm.Byte",
                Date => "Edm.Date",
                DateTimeOffset => "Edm.DateTimeOffset",
                Decimal => "Edm.Decimal",
                Double => "Edm.Double",
                Duration => "Edm.Duration",
                Guid => "Edm.Guid",
                Int16 => "Edm.Int16",
                Int32 => "Edm.Int32",
                Int64 => "Edm.Int64",
                SByte => "Edm.SByte",
                Single => "Edm.Single",
                Stream => "Edm.Stream",
                String => "Edm.String",
                TimeOfDay => "Edm.TimeOfDay",
                Geography => "Edm.Geography",
                GeographyPoint => "Edm.GeographyPoint",
                GeographyLineString => "Edm.GeographyLineString",
                GeographyPolygon => "Edm.GeographyPolygon",
                GeographyMultiPoint => "Edm.GeographyMultiPoint",
                GeographyMultiLineString => "Edm.GeographyMultiLineString",
                GeographyMultiPolygon => "Edm.GeographyMultiPolygon",
                GeographyCollection => "Edm.GeographyCollection",
                Geometry => "Edm.Geometry",
                GeometryPoint => "Edm.GeometryPoint",
                GeometryLineString => "Edm.GeometryLineString",
                GeometryPolygon => "Edm.GeometryPolygon",
                GeometryMultiPoint => "Edm.GeometryMultiPoint",
                GeometryMultiLineString => "Edm.GeometryMultiLineString",
                GeometryMultiPolygon => "Edm.GeometryMultiPolygon",
                GeometryCollection => "Edm.GeometryCollection",
            }
        }

        /// Parses `Edm.Int32`; the `Edm.` prefix is required.
        pub fn from_name(name: &str) -> Option<Primitive> {
            ALL.iter().copied().find(|p| p.name() == name)
        }

        pub fn is_integral(self) -> bool {
            use Primitive::*;
            matches!(self, Byte | SByte | Int16 | Int32 | Int64)
        }

        pub fn is_numeric(self) -> bool {
            use Primitive::*;
            self.is_integral() || matches!(self, Decimal | Single | Double)
        }

        pub fn is_geography(self) -> bool {
            use Primitive::*;
            matches!(
                self,
                Geography
                    | GeographyPoint
                    | GeographyLineString
                    | GeographyPolygon
                    | GeographyMultiPoint
                    | GeographyMultiLineString
                    | GeographyMultiPolygon
                    | GeographyCollection
            )
        }

        pub fn is_geometry(self) -> bool {
            use Primitive::*;
            matches!(
                self,
                Geometry
                    | GeometryPoint
                    | GeometryLineString
                    | GeometryPolygon
                    | GeometryMultiPoint
                    | GeometryMultiLineString
                    | GeometryMultiPolygon
                    | GeometryCollection
            )
        }

        pub fn is_spatial(self) -> bool {
            self.is_geography() || self.is_geometry()
        }

        /// `GeographyPoint` is a subkind of `Geography`, and so on.
        pub fn is_subkind_of(self, base: Primitive) -> bool {
            (base == Primitive::Geography && self.is_geography())
                || (base == Primitive::Geometry && self.is_geometry())
        }

        fn integral_rank(self) -> Option<u8> {
            use Primitive::*;
            match self {
                Byte | SByte => Some(0),
                Int16 => Some(1),
                Int32 => Some(2),
                Int64 => Some(3),
                _ => None,
            }
        }

        /// Implicit promotion of a value of this kind to `target`.
        pub fn can_promote_to(self, target: Primitive) -> bool {
            use Primitive::*;
            if self == target || self.is_subkind_of(target) {
                return true;
            }
            match (self.integral_rank(), target.integral_rank()) {
                (Some(_), _) if matches!(target, Single | Double | Decimal) => true,
                (Some(from), Some(to)) => from < to,
                _ => matches!((self, target), (Decimal, Single) | (Decimal, Double) | (Single, Double)),
            }
        }
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Entity {
        pub name: Identifier,
        pub key: Option<Vec<Identifier>>,
        pub base_type: Option<FullName>,
        pub is_abstract: bool,
        pub open_type: bool,
        pub has_stream: bool,
        pub properties: HashMap<Identifier, Property>,
    }

    impl Named for Entity {
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Complex {
        pub name: Identifier,
        pub base_type: Option<FullName>,
        pub is_abstract: bool,
        pub open_type: bool,
        pub properties: HashMap<Identifier, Property>,
    }

    impl Named for Complex {
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Enumeration {
        pub name: Identifier,
        pub underlying_type: EnumBase,
        pub is_flags: bool,
        pub members: HashMap<Identifier, i64>,
    }

    impl Named for Enumeration {
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub enum EnumBase {
        Byte,
        SByte,
        Int16,
        #[default]
        Int32,
        Int64,
    }
}

pub mod property {
    use serde::{Deserialize, Serialize};

    use super::{EdmType, FullName, Identifier, Named, Primitive};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub enum Property {
        Structural(Structural),
        Navigation(Navigation),
    }

    impl Property {
        pub fn name(&self) -> &str {
            match self {
                Property::Structural(s) => &s.name,
                Property::Navigation(n) => &n.name,
            }
        }
    }

    impl Named for Property {
        fn name(&self) -> &str {
            Property::name(self)
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub enum Type {
        Primitive(Primitive),
        Complex(FullName),
        Enumeration(FullName),
    }

    impl Default for Type {
        fn default() -> Self {
            Type::Primitive(Primitive::String)
        }
    }

    impl Type {
        pub fn edm_type(&self) -> EdmType {
            match self {
                Type::Primitive(p) => EdmType::Primitive(*p),
                Type::Complex(n) => EdmType::Complex(n.clone()),
                Type::Enumeration(n) => EdmType::Enum(n.clone()),
            }
        }
    }

    /// Value facets shared by properties, parameters and return types.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Facets {
        pub max_length: Option<u32>,
        pub precision: Option<u32>,
        pub scale: Option<u32>,
        pub srid: Option<u32>,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Structural {
        pub name: Identifier,
        pub kind: Type,
        pub collection: bool,
        pub nullable: bool,
        pub unicode: bool,
        pub facets: Facets,
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct Navigation {
        pub name: Identifier,
        pub kind: FullName,
        pub collection: bool,
        pub nullable: bool,
        pub partner: Option<Identifier>,
        pub contains_target: bool,
        pub referential_constraints: Vec<ReferentialConstraint>,
        pub on_delete: OnDeleteAction,
    }

    /// `property` of the declaring type holds the value of
    /// `referenced_property` of the navigation target.
    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ReferentialConstraint {
        pub property: Identifier,
        pub referenced_property: Identifier,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub enum OnDeleteAction {
        Cascade,
        #[default]
        None,
        SetNull,
        SetDefault,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Action {
    pub name: Identifier,
    pub is_bound: bool,
    pub entity_set_path: Option<String>,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<ReturnType>,
}

impl Action {
    /// The binding parameter of a bound action.
    pub fn binding(&self) -> Option<&Parameter> {
        if self.is_bound {
            self.parameters.first()
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: Identifier,
    #[serde(default)]
    pub is_bound: bool,
    #[serde(default)]
    pub entity_set_path: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub return_type: ReturnType,
    #[serde(default)]
    pub is_composable: bool,
}

impl Function {
    pub fn binding(&self) -> Option<&Parameter> {
        if self.is_bound {
            self.parameters.first()
        } else {
            None
        }
    }

    /// Parameters that are passed in the URI, i.e. everything but the
    /// binding parameter.
    pub fn call_parameters(&self) -> &[Parameter] {
        if self.is_bound && !self.parameters.is_empty() {
            &self.parameters[1..]
        } else {
            &self.parameters
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnType {
    pub kind: EdmType,
    #[serde(default)]
    pub collection: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub facets: property::Facets,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: Identifier,
    pub kind: EdmType,
    #[serde(default)]
    pub collection: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub facets: property::Facets,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityContainer {
    pub name: Identifier,
    pub extends: Option<FullName>,
    pub entity_sets: HashMap<Identifier, EntitySet>,
    pub singletons: HashMap<Identifier, Singleton>,
    pub action_imports: HashMap<Identifier, ActionImport>,
    pub function_imports: HashMap<Identifier, FunctionImport>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitySet {
    pub name: Identifier,
    pub include_in_service_document: bool,
    pub kind: FullName,
}

impl Named for EntitySet {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Singleton {
    pub name: Identifier,
    pub kind: FullName,
}

impl Named for Singleton {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionImport {
    pub name: Identifier,
    pub action: FullName,
    pub entity_set: Option<Identifier>,
}

impl Named for ActionImport {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionImport {
    pub name: Identifier,
    pub function: FullName,
    pub entity_set: Option<Identifier>,
    pub include_in_service_document: bool,
}

impl Named for FunctionImport {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::kind::Entity;
    use super::property::{Property, Structural, Type};
    use super::*;

    fn key_prop(name: &str, primitive: Primitive) -> Property {
        Property::Structural(Structural {
            name: name.into(),
            kind: Type::Primitive(primitive),
            ..Structural::default()
        })
    }

    fn inheritance_doc() -> Document {
        let base = Entity {
            name: "Person".into(),
            key: Some(vec!["Id".into()]),
            properties: map(&[key_prop("Id", Primitive::Int32)]),
            ..Entity::default()
        };
        let derived = Entity {
            name: "Employee".into(),
            base_type: Some(FullName::new("test.ns", "Person")),
            properties: map(&[key_prop("Badge", Primitive::String)]),
            ..Entity::default()
        };
        let mut doc = Document::new();
        doc.schemas = map(&[Schema {
            namespace: "test.ns".into(),
            alias: Some("T".into()),
            entity_types: map(&[base, derived]),
            ..Schema::default()
        }]);
        doc
    }

    #[test]
    fn keys_and_properties_are_inherited() {
        let doc = inheritance_doc();
        let employee = EdmType::Entity(FullName::new("test.ns", "Employee"));
        let keys = doc.key_properties(&employee);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "Id");
        assert!(doc.property(&employee, "Badge").is_some());
        assert!(doc.property(&employee, "Id").is_some());
        assert!(doc.property(&employee, "Salary").is_none());
    }

    #[test]
    fn subtype_walks_base_chain() {
        let doc = inheritance_doc();
        let person = EdmType::Entity(FullName::new("test.ns", "Person"));
        let employee = EdmType::Entity(FullName::new("test.ns", "Employee"));
        assert!(doc.is_subtype(&employee, &person));
        assert!(doc.is_subtype(&person, &person));
        assert!(!doc.is_subtype(&person, &employee));
    }

    #[test]
    fn type_names_resolve_through_alias() {
        let doc = inheritance_doc();
        assert_eq!(
            doc.resolve_type_name("T.Employee"),
            Some(EdmType::Entity(FullName::new("test.ns", "Employee")))
        );
        assert_eq!(
            doc.resolve_type_name("Edm.Guid"),
            Some(EdmType::Primitive(Primitive::Guid))
        );
        assert_eq!(doc.resolve_type_name("Guid"), None);
        assert_eq!(doc.resolve_type_name("test.ns.Nothing"), None);
    }

    #[test]
    fn primitive_promotion() {
        assert!(Primitive::Int16.can_promote_to(Primitive::Int64));
        assert!(Primitive::Int32.can_promote_to(Primitive::Decimal));
        assert!(!Primitive::Int64.can_promote_to(Primitive::Int32));
        assert!(Primitive::GeographyPoint.can_promote_to(Primitive::Geography));
        assert!(!Primitive::String.can_promote_to(Primitive::Guid));
    }

    #[test]
    fn document_from_json_fixture() {
        let doc: Document =
            serde_json::from_str(include_str!("../tests/fixtures/schema/minimal.json")).unwrap();
        let set = doc.entity_set("Products").unwrap();
        assert_eq!(set.kind, FullName::new("shop", "Product"));
        let product = EdmType::Entity(set.kind.clone());
        let keys = doc.key_properties(&product);
        assert_eq!(keys[0].kind, Type::Primitive(Primitive::Int32));
        assert!(doc.functions(&FullName::new("shop", "TopProducts")).len() == 1);
    }
}
