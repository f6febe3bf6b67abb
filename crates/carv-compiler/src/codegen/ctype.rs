//! The C-side type model.
//!
//! Every AST type and expression resolves to a [`CType`], the shape the
//! value has in the emitted translation unit. Resolution consults the
//! checker-supplied type map first and falls back to syntactic inference
//! (the fallback rules live on the generator in `mod.rs`).

use carv_parser::ast::TypeAnnotation;
use carv_parser::checker::Type;

/// Element kind of a homogeneous runtime array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Int,
    Float,
    Bool,
    Str,
}

impl ArrayKind {
    /// The C type of one element.
    pub fn element(&self) -> CType {
        match self {
            ArrayKind::Int => CType::Int,
            ArrayKind::Float => CType::Float,
            ArrayKind::Bool => CType::Bool,
            ArrayKind::Str => CType::Str,
        }
    }

    /// Runtime struct name, e.g. `carv_int_array`.
    pub fn array_name(&self) -> &'static str {
        match self {
            ArrayKind::Int => "carv_int_array",
            ArrayKind::Float => "carv_float_array",
            ArrayKind::Bool => "carv_bool_array",
            ArrayKind::Str => "carv_string_array",
        }
    }

    /// Runtime constructor name, e.g. `carv_new_int_array`.
    pub fn new_fn(&self) -> &'static str {
        match self {
            ArrayKind::Int => "carv_new_int_array",
            ArrayKind::Float => "carv_new_float_array",
            ArrayKind::Bool => "carv_new_bool_array",
            ArrayKind::Str => "carv_new_string_array",
        }
    }

    /// Short kind name used in print helper dispatch.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ArrayKind::Int => "int",
            ArrayKind::Float => "float",
            ArrayKind::Bool => "bool",
            ArrayKind::Str => "string",
        }
    }

    /// Classify an element C type; unknown element types fall back to int
    /// arrays.
    pub fn from_element(ctype: &CType) -> ArrayKind {
        match ctype {
            CType::Float => ArrayKind::Float,
            CType::Bool => ArrayKind::Bool,
            CType::Str => ArrayKind::Str,
            _ => ArrayKind::Int,
        }
    }
}

/// The C form of a Carv value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CType {
    Int,
    Float,
    Bool,
    Void,
    /// The three-field runtime string value.
    Str,
    /// A homogeneous runtime array.
    Array(ArrayKind),
    /// The tagged ok/err value.
    Result,
    /// Pointer to a named class struct.
    ClassPtr(String),
    /// Interface fat pointer: `<name>_ref` or `<name>_mut_ref`.
    IfaceRef { name: String, mutable: bool },
    /// Borrow of a non-class value.
    Ptr { inner: Box<CType>, konst: bool },
    /// Closure fat-pointer value `__closure_<n>` for lifting site `n`.
    Closure(usize),
    /// Function values, frames, and anything else without a C shape.
    Opaque,
}

impl CType {
    /// The spelled C type, as used in declarations.
    pub fn c_name(&self) -> String {
        match self {
            CType::Int => "carv_int".to_string(),
            CType::Float => "carv_float".to_string(),
            CType::Bool => "carv_bool".to_string(),
            CType::Void => "void".to_string(),
            CType::Str => "carv_string".to_string(),
            CType::Array(kind) => kind.array_name().to_string(),
            CType::Result => "carv_result".to_string(),
            CType::ClassPtr(name) => format!("{name}*"),
            CType::IfaceRef { name, mutable } => {
                if *mutable {
                    format!("{name}_mut_ref")
                } else {
                    format!("{name}_ref")
                }
            }
            CType::Ptr { inner, konst } => {
                if *konst {
                    format!("const {}*", inner.c_name())
                } else {
                    format!("{}*", inner.c_name())
                }
            }
            CType::Closure(n) => format!("__closure_{n}"),
            CType::Opaque => "void*".to_string(),
        }
    }

    /// Whether a binding of this type is owned by its scope: strings,
    /// arrays, and class pointers. Only strings currently have a real drop.
    pub fn is_owned(&self) -> bool {
        matches!(self, CType::Str | CType::Array(_) | CType::ClassPtr(_))
    }

    /// Zero value used for defaulted class fields.
    pub fn zero_value(&self) -> String {
        match self {
            CType::Int => "0".to_string(),
            CType::Float => "0.0".to_string(),
            CType::Bool => "false".to_string(),
            CType::Str => "carv_string_lit(\"\")".to_string(),
            CType::Array(kind) => format!("{}(0)", kind.new_fn()),
            _ => "0".to_string(),
        }
    }

    /// Union arm selector in the runtime result value.
    pub fn result_arm(&self) -> &'static str {
        match self {
            CType::Float => "f",
            CType::Bool => "b",
            CType::Str => "s",
            _ => "i",
        }
    }

    /// Build a CType from a source type annotation. `is_interface` reports
    /// whether a name denotes an interface.
    pub fn from_annotation(ann: &TypeAnnotation, is_interface: impl Fn(&str) -> bool) -> CType {
        match ann {
            TypeAnnotation::Int => CType::Int,
            TypeAnnotation::Float => CType::Float,
            TypeAnnotation::Bool => CType::Bool,
            TypeAnnotation::Str => CType::Str,
            TypeAnnotation::Void => CType::Void,
            TypeAnnotation::Result => CType::Result,
            TypeAnnotation::Array(el) => {
                let element = CType::from_annotation(el, is_interface);
                CType::Array(ArrayKind::from_element(&element))
            }
            TypeAnnotation::Named(name) => CType::ClassPtr(name.clone()),
            TypeAnnotation::Ref { mutable, name } => {
                if is_interface(name) {
                    CType::IfaceRef {
                        name: name.clone(),
                        mutable: *mutable,
                    }
                } else {
                    // Borrowing a class instance stays pointer-shaped.
                    CType::ClassPtr(name.clone())
                }
            }
        }
    }

    /// Convert a checker type when it has a C form; `None` falls through to
    /// the syntactic inferencer.
    pub fn from_checker(ty: &Type) -> Option<CType> {
        match ty {
            Type::Int => Some(CType::Int),
            Type::Float => Some(CType::Float),
            Type::Bool => Some(CType::Bool),
            Type::Str => Some(CType::Str),
            Type::Void => Some(CType::Void),
            Type::Result => Some(CType::Result),
            Type::Array(el) => {
                let element = CType::from_checker(el).unwrap_or(CType::Int);
                Some(CType::Array(ArrayKind::from_element(&element)))
            }
            Type::Class(name) => Some(CType::ClassPtr(name.clone())),
            Type::Iface { name, mutable } => Some(CType::IfaceRef {
                name: name.clone(),
                mutable: *mutable,
            }),
            Type::Function | Type::Future(_) => Some(CType::Opaque),
            Type::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_names() {
        assert_eq!(CType::Int.c_name(), "carv_int");
        assert_eq!(CType::Str.c_name(), "carv_string");
        assert_eq!(CType::Array(ArrayKind::Str).c_name(), "carv_string_array");
    }

    #[test]
    fn test_class_and_iface_names() {
        assert_eq!(CType::ClassPtr("Person".into()).c_name(), "Person*");
        assert_eq!(
            CType::IfaceRef {
                name: "Printable".into(),
                mutable: false
            }
            .c_name(),
            "Printable_ref"
        );
        assert_eq!(
            CType::IfaceRef {
                name: "Printable".into(),
                mutable: true
            }
            .c_name(),
            "Printable_mut_ref"
        );
    }

    #[test]
    fn test_ownership() {
        assert!(CType::Str.is_owned());
        assert!(CType::Array(ArrayKind::Int).is_owned());
        assert!(CType::ClassPtr("P".into()).is_owned());
        assert!(!CType::Int.is_owned());
        assert!(!CType::IfaceRef {
            name: "I".into(),
            mutable: false
        }
        .is_owned());
    }

    #[test]
    fn test_annotation_interface_ref() {
        let ann = TypeAnnotation::Ref {
            mutable: false,
            name: "Printable".into(),
        };
        let ctype = CType::from_annotation(&ann, |n| n == "Printable");
        assert_eq!(
            ctype,
            CType::IfaceRef {
                name: "Printable".into(),
                mutable: false
            }
        );

        let ann = TypeAnnotation::Ref {
            mutable: false,
            name: "Person".into(),
        };
        let ctype = CType::from_annotation(&ann, |n| n == "Printable");
        assert_eq!(ctype, CType::ClassPtr("Person".into()));
    }
}
