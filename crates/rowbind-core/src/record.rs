//! Record field metadata and mutable field access.
//!
//! A record is a plain struct that exposes its declared fields as
//! [`FieldDef`]s and hands out a [`FieldMut`] for any field by name. The
//! [`record!`](crate::record!) macro generates all of this from an ordinary
//! struct definition, so the resolver and fill engine never need runtime
//! reflection.

use crate::convert::{Indirect, Target};

/// Declared metadata of one record field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Field identifier as declared.
    pub name: &'static str,
    /// `(key, value)` annotation pairs, e.g. `("sql", "hello,omitempty")`.
    pub tags: Vec<(&'static str, &'static str)>,
    /// Visible outside the record (`pub` in any form).
    pub exported: bool,
    /// Embedded record whose own fields are resolved in place.
    pub embedded: bool,
    nested: fn() -> Option<Vec<FieldDef>>,
}

fn no_nested_fields() -> Option<Vec<FieldDef>> {
    None
}

impl FieldDef {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tags: Vec::new(),
            exported: false,
            embedded: false,
            nested: no_nested_fields,
        }
    }

    #[must_use]
    pub fn exported(mut self) -> Self {
        self.exported = true;
        self
    }

    #[must_use]
    pub fn attr(mut self, key: &'static str, value: &'static str) -> Self {
        self.tags.push((key, value));
        self
    }

    /// Mark the field as an embedded record.
    #[must_use]
    pub fn embedded(mut self, nested: fn() -> Option<Vec<FieldDef>>) -> Self {
        self.embedded = true;
        self.nested = nested;
        self
    }

    /// First annotation value stored under `key`.
    pub fn tag(&self, key: &str) -> Option<&'static str> {
        self.tags
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| *value)
    }

    /// Fields of the embedded record, if this field is one.
    pub fn nested_fields(&self) -> Option<Vec<FieldDef>> {
        if self.embedded { (self.nested)() } else { None }
    }
}

/// Mutable view of a single field.
pub enum FieldMut<'a> {
    /// Leaf that the coercion engine can assign into.
    Scalar(Target<'a>),
    /// Nested record reached by name.
    Record(&'a mut dyn Fields),
}

/// Name-addressed mutable access to a record's fields.
pub trait Fields {
    fn type_name(&self) -> &'static str;

    fn field_mut(&mut self, name: &str) -> Option<FieldMut<'_>>;
}

/// A struct whose fields can be resolved against source columns.
pub trait Record: Fields + Default + Send + 'static {
    /// Declared fields in declaration order.
    fn fields() -> Vec<FieldDef>;
}

/// Types that can sit in a record field.
pub trait Bind {
    fn bind_mut(&mut self) -> FieldMut<'_>;

    /// Field list for types that can be embedded.
    fn nested_fields() -> Option<Vec<FieldDef>>
    where
        Self: Sized,
    {
        None
    }
}

impl<T: Bind + Default> Indirect for Option<T> {
    fn allocate(&mut self) -> FieldMut<'_> {
        self.insert(T::default()).bind_mut()
    }

    fn pointee(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

impl<T: Bind + Default> Bind for Option<T> {
    fn bind_mut(&mut self) -> FieldMut<'_> {
        FieldMut::Scalar(Target::Indirect(self))
    }
}

impl<T: Bind> Bind for Box<T> {
    fn bind_mut(&mut self) -> FieldMut<'_> {
        (**self).bind_mut()
    }

    fn nested_fields() -> Option<Vec<FieldDef>> {
        T::nested_fields()
    }
}

/// Declare a struct and derive its binding support.
///
/// Field annotations:
/// - `#[tag(sql = "name")]` stores an annotation read by
///   [`TagNaming`](crate::naming::TagNaming); several `key = "value"` pairs
///   may be given.
/// - `#[embed]` resolves the fields of a nested record in place.
///
/// Every other field attribute (doc comments, `#[serde(..)]`, `#[allow(..)]`)
/// is kept on the generated field. Only `pub` fields bind. The struct must
/// implement `Default`.
///
/// ```ignore
/// record! {
///     #[derive(Debug, Default, PartialEq)]
///     pub struct Hw {
///         #[tag(sql = "hello")]
///         pub hello2: String,
///         pub t: i64,
///     }
/// }
/// ```
#[macro_export]
macro_rules! record {
    (@attr $def:ident, $fty:ty, tag ( $($key:ident = $value:literal),* $(,)? )) => {
        $def $( .attr(stringify!($key), $value) )*
    };
    (@attr $def:ident, $fty:ty, embed) => {
        $def.embedded(<$fty as $crate::record::Bind>::nested_fields)
    };
    (@attr $def:ident, $fty:ty, $($other:tt)*) => {
        $def
    };

    // Struct emission: walk the fields, dropping `tag`/`embed` attributes.
    (@struct [$($meta:tt)*] [$vis:vis] [$name:ident] [$($done:tt)*]) => {
        $($meta)*
        $vis struct $name {
            $($done)*
        }
    };
    (@struct $meta:tt $vis:tt $name:tt $done:tt [$($attrs:tt)*] $($rest:tt)*) => {
        $crate::record!(@field $meta $vis $name $done [] [$($attrs)*] $($rest)*);
    };
    (@field $meta:tt $vis:tt $name:tt $done:tt [$($kept:tt)*]
        [#[tag $($args:tt)*] $($attrs:tt)*] $($rest:tt)*) => {
        $crate::record!(@field $meta $vis $name $done [$($kept)*] [$($attrs)*] $($rest)*);
    };
    (@field $meta:tt $vis:tt $name:tt $done:tt [$($kept:tt)*]
        [#[embed] $($attrs:tt)*] $($rest:tt)*) => {
        $crate::record!(@field $meta $vis $name $done [$($kept)*] [$($attrs)*] $($rest)*);
    };
    (@field $meta:tt $vis:tt $name:tt $done:tt [$($kept:tt)*]
        [#[$($other:tt)*] $($attrs:tt)*] $($rest:tt)*) => {
        $crate::record!(@field $meta $vis $name $done [$($kept)* #[$($other)*]] [$($attrs)*] $($rest)*);
    };
    (@field $meta:tt $vis:tt $name:tt [$($done:tt)*] [$($kept:tt)*] []
        [$fvis:vis] [$field:ident] [$fty:ty] $($rest:tt)*) => {
        $crate::record!(@struct $meta $vis $name [$($done)* $($kept)* $fvis $field : $fty,] $($rest)*);
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$($fattr:tt)*])*
                $fvis:vis $field:ident : $fty:ty
            ),* $(,)?
        }
    ) => {
        $crate::record!(
            @struct [$(#[$meta])*] [$vis] [$name] []
            $( [$(#[$($fattr)*])*] [$fvis] [$field] [$fty] )*
        );

        impl $crate::record::Fields for $name {
            fn type_name(&self) -> &'static str {
                stringify!($name)
            }

            #[allow(unused_variables)]
            fn field_mut(&mut self, name: &str) -> Option<$crate::record::FieldMut<'_>> {
                $(
                    if name == stringify!($field) {
                        return Some($crate::record::Bind::bind_mut(&mut self.$field));
                    }
                )*
                None
            }
        }

        impl $crate::record::Record for $name {
            fn fields() -> Vec<$crate::record::FieldDef> {
                vec![$({
                    #[allow(unused_mut)]
                    let mut def = $crate::record::FieldDef::new(stringify!($field));
                    if !stringify!($fvis).is_empty() {
                        def = def.exported();
                    }
                    $( def = $crate::record!(@attr def, $fty, $($fattr)*); )*
                    def
                }),*]
            }
        }

        impl $crate::record::Bind for $name {
            fn bind_mut(&mut self) -> $crate::record::FieldMut<'_> {
                $crate::record::FieldMut::Record(self)
            }

            fn nested_fields() -> Option<Vec<$crate::record::FieldDef>> {
                Some(<Self as $crate::record::Record>::fields())
            }
        }

        impl $crate::shape::Element for $name {
            const SHAPE: $crate::shape::Shape = $crate::shape::Shape::Record;

            fn layout(
                resolver: &$crate::resolver::FieldResolver,
                columns: &[String],
            ) -> $crate::shape::Layout {
                $crate::shape::Layout::Fields(resolver.resolve::<Self>(columns))
            }

            fn decode_row(
                &mut self,
                ctx: &$crate::shape::RowContext<'_>,
                row: &[Vec<u8>],
            ) -> $crate::Result<()> {
                $crate::shape::decode_record(self, ctx, row)
            }
        }

        impl $crate::shape::Destination for $name {
            type Elem = Self;
            const SHAPE: $crate::shape::Shape = $crate::shape::Shape::Record;

            fn slot(&mut self) -> $crate::shape::Slot<'_, Self> {
                $crate::shape::Slot::One(self)
            }
        }
    };
}

/// Derive scalar binding for types that implement
/// [`ScanBytes`](crate::convert::ScanBytes).
#[macro_export]
macro_rules! scan_bytes_type {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::record::Bind for $ty {
            fn bind_mut(&mut self) -> $crate::record::FieldMut<'_> {
                $crate::record::FieldMut::Scalar($crate::convert::Target::Custom(self))
            }
        }

        impl $crate::shape::Element for $ty {
            const SHAPE: $crate::shape::Shape = $crate::shape::Shape::Scalar;

            fn decode_row(
                &mut self,
                ctx: &$crate::shape::RowContext<'_>,
                row: &[Vec<u8>],
            ) -> $crate::Result<()> {
                $crate::shape::decode_scalar(self, ctx, row)
            }
        }

        impl $crate::shape::Destination for $ty {
            type Elem = Self;
            const SHAPE: $crate::shape::Shape = $crate::shape::Shape::Scalar;

            fn slot(&mut self) -> $crate::shape::Slot<'_, Self> {
                $crate::shape::Slot::One(self)
            }
        }
    )+};
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::record! {
        #[derive(Debug, Default, Clone, PartialEq)]
        pub struct Inner {
            #[tag(sql = "inner_id")]
            pub id: i64,
            secret: String,
        }
    }

    crate::record! {
        #[derive(Debug, Default, Clone, PartialEq)]
        pub struct Outer {
            #[embed]
            pub inner: Inner,
            /// Display name.
            #[tag(sql = "name", json = "n")]
            pub(crate) name: String,
            pub maybe: Option<i32>,
        }
    }

    #[test]
    fn test_declared_fields_in_order() {
        let fields = Outer::fields();
        let names: Vec<_> = fields.iter().map(|f| f.name).collect();
        assert_eq!(names, ["inner", "name", "maybe"]);
        assert!(fields.iter().all(|f| f.exported));
        assert!(fields[0].embedded);
        assert_eq!(fields[1].tag("sql"), Some("name"));
        assert_eq!(fields[1].tag("json"), Some("n"));
        assert_eq!(fields[2].tag("sql"), None);
    }

    #[test]
    fn test_private_fields_are_not_exported() {
        let fields = Inner::fields();
        assert!(fields[0].exported);
        assert!(!fields[1].exported);
    }

    #[test]
    fn test_embedded_field_exposes_nested_fields() {
        let fields = Outer::fields();
        let nested = fields[0].nested_fields().expect("embedded record");
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].name, "id");
        assert!(fields[1].nested_fields().is_none());
    }

    #[test]
    fn test_field_mut_by_name() {
        let mut outer = Outer::default();
        assert!(matches!(outer.field_mut("inner"), Some(FieldMut::Record(_))));
        assert!(matches!(outer.field_mut("name"), Some(FieldMut::Scalar(_))));
        assert!(outer.field_mut("missing").is_none());
        assert_eq!(outer.type_name(), "Outer");

        if let Some(FieldMut::Scalar(Target::Text(name))) = outer.field_mut("name") {
            name.push_str("abc");
        }
        assert_eq!(outer.name, "abc");
    }

    #[test]
    fn test_option_field_allocates_on_demand() {
        let mut outer = Outer::default();
        match outer.field_mut("maybe") {
            Some(FieldMut::Scalar(Target::Indirect(slot))) => {
                assert!(slot.pointee().ends_with("i32"));
                if let FieldMut::Scalar(Target::I32(v)) = slot.allocate() {
                    *v = 7;
                }
            }
            _ => panic!("expected an indirect slot"),
        }
        assert_eq!(outer.maybe, Some(7));
    }

    crate::record! {
        #[derive(Debug, Default, serde::Serialize)]
        pub struct Labeled {
            /// Shown to users.
            #[serde(rename = "n")]
            #[tag(sql = "name")]
            pub name: String,
            #[allow(dead_code)]
            #[serde(skip)]
            hidden: u8,
        }
    }

    #[test]
    fn test_foreign_field_attributes_are_kept() {
        let labeled = Labeled {
            name: "x".to_owned(),
            ..Labeled::default()
        };
        let json = serde_json::to_string(&labeled).expect("serialize");
        assert_eq!(json, r#"{"n":"x"}"#);

        let fields = Labeled::fields();
        assert_eq!(fields[0].tag("sql"), Some("name"));
        assert!(!fields[1].exported);
    }
}
