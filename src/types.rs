//! Static types seen by the compiler.
//!
//! The element type of a queryable decides how identifiers resolve: a
//! [`RecordType`] gives typed fields (and compile-time errors for unknown
//! ones), while [`EdmType::Object`] defers every check to runtime, which is
//! what dynamic map-like items need.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum EdmType {
    Boolean,
    Byte,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    String,
    Guid,
    DateTimeOffset,
    Date,
    TimeOfDay,
    Duration,
    Binary,
    Record(Arc<RecordType>),
    Collection(Box<TypeRef>),
    /// Statically unknown; resolved per value at runtime
    Object,
}

impl EdmType {
    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    /// Position in the numeric promotion order
    /// `Byte < Int32 < Int64 < Decimal < Single < Double`.
    pub fn numeric_rank(&self) -> Option<u8> {
        match self {
            EdmType::Byte => Some(0),
            EdmType::Int32 => Some(1),
            EdmType::Int64 => Some(2),
            EdmType::Decimal => Some(3),
            EdmType::Single => Some(4),
            EdmType::Double => Some(5),
            _ => None,
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, EdmType::Byte | EdmType::Int32 | EdmType::Int64)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            EdmType::DateTimeOffset | EdmType::Date | EdmType::TimeOfDay | EdmType::Duration
        )
    }

    /// Value types get explicit null guards when nullable; strings, binary,
    /// records, collections and unknown types carry null as an ordinary value.
    pub fn is_value_type(&self) -> bool {
        !matches!(
            self,
            EdmType::String
                | EdmType::Binary
                | EdmType::Record(_)
                | EdmType::Collection(_)
                | EdmType::Object
        )
    }

    /// Types that support `lt`/`gt` and ordering.
    pub fn is_orderable(&self) -> bool {
        !matches!(self, EdmType::Record(_) | EdmType::Collection(_))
    }

    pub fn name(&self) -> String {
        match self {
            EdmType::Boolean => "Edm.Boolean".to_string(),
            EdmType::Byte => "Edm.Byte".to_string(),
            EdmType::Int32 => "Edm.Int32".to_string(),
            EdmType::Int64 => "Edm.Int64".to_string(),
            EdmType::Single => "Edm.Single".to_string(),
            EdmType::Double => "Edm.Double".to_string(),
            EdmType::Decimal => "Edm.Decimal".to_string(),
            EdmType::String => "Edm.String".to_string(),
            EdmType::Guid => "Edm.Guid".to_string(),
            EdmType::DateTimeOffset => "Edm.DateTimeOffset".to_string(),
            EdmType::Date => "Edm.Date".to_string(),
            EdmType::TimeOfDay => "Edm.TimeOfDay".to_string(),
            EdmType::Duration => "Edm.Duration".to_string(),
            EdmType::Binary => "Edm.Binary".to_string(),
            EdmType::Record(record) => record.name().to_string(),
            EdmType::Collection(element) => format!("Collection({})", element.kind.name()),
            EdmType::Object => "Edm.Untyped".to_string(),
        }
    }
}

/// A type plus its nullability.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub kind: EdmType,
    pub nullable: bool,
}

impl TypeRef {
    pub fn required(kind: EdmType) -> Self {
        TypeRef {
            kind,
            nullable: false,
        }
    }

    pub fn optional(kind: EdmType) -> Self {
        TypeRef {
            kind,
            nullable: true,
        }
    }

    /// The untyped element type used for dynamic items.
    pub fn object() -> Self {
        TypeRef::optional(EdmType::Object)
    }

    pub fn collection_of(element: TypeRef) -> Self {
        TypeRef::optional(EdmType::Collection(Box::new(element)))
    }

    pub fn record(record: RecordType) -> Self {
        TypeRef::required(EdmType::Record(Arc::new(record)))
    }

    pub fn is_object(&self) -> bool {
        self.kind == EdmType::Object
    }

    /// Nullable value type, i.e. the operand needs a null guard before use.
    pub fn is_nullable_value(&self) -> bool {
        self.nullable && self.kind.is_value_type()
    }

    pub fn as_nullable(&self) -> TypeRef {
        TypeRef::optional(self.kind.clone())
    }

    /// Element type of a collection, or of an untyped value.
    pub fn element_type(&self) -> Option<TypeRef> {
        match &self.kind {
            EdmType::Collection(element) => Some((**element).clone()),
            EdmType::Object => Some(TypeRef::object()),
            _ => None,
        }
    }

    /// Whether values of `self` can be used where `target` is expected
    /// without a conversion.
    pub fn is_assignable_to(&self, target: &TypeRef) -> bool {
        self.kind == target.kind && (target.nullable || !self.nullable)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable && self.kind.is_value_type() {
            write!(f, "{}?", self.kind.name())
        } else {
            f.write_str(&self.kind.name())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub ty: TypeRef,
}

/// Named, typed fields of a structured element type.
///
/// # Example
///
/// ```
/// use odata_query::types::{EdmType, RecordType, TypeRef};
///
/// let product = RecordType::new("Product")
///     .property("Id", TypeRef::required(EdmType::Int32))
///     .property("Name", TypeRef::optional(EdmType::String))
///     .property("Rating", TypeRef::optional(EdmType::Int32));
///
/// assert!(product.find("Name").is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    name: String,
    properties: Vec<Property>,
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        RecordType {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    pub fn property(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.properties.push(Property {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn find(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}
