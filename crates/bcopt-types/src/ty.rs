use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::lattice::{HasBottom, HasTop, Lattice};
use crate::value::ConstValue;

bitflags! {
    /// Runtime kinds a [`Type`] may contain.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TypeBits: u16 {
        const UNINIT = 1 << 0;
        const INIT_NULL = 1 << 1;
        const FALSE = 1 << 2;
        const TRUE = 1 << 3;
        const INT = 1 << 4;
        const DBL = 1 << 5;
        const STR = 1 << 6;
        const ARR = 1 << 7;
        const OBJ = 1 << 8;
        const RES = 1 << 9;
        /// Class references, only ever held by class-ref slots.
        const CLS = 1 << 10;

        const NULL = Self::UNINIT.bits() | Self::INIT_NULL.bits();
        const BOOL = Self::FALSE.bits() | Self::TRUE.bits();
        const NUM = Self::INT.bits() | Self::DBL.bits();
        const INIT_CELL = Self::INIT_NULL.bits()
            | Self::BOOL.bits()
            | Self::NUM.bits()
            | Self::STR.bits()
            | Self::ARR.bits()
            | Self::OBJ.bits()
            | Self::RES.bits();
        const CELL = Self::INIT_CELL.bits() | Self::UNINIT.bits();
        const TOP = Self::CELL.bits() | Self::CLS.bits();
    }
}

/// A class named by an object or class-reference type. `exact` excludes
/// subclasses.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassSpec {
    pub name: Arc<str>,
    pub exact: bool,
}

impl ClassSpec {
    fn is_subseteq(&self, other: &Self) -> bool {
        self.name == other.name && (self.exact || !other.exact)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum TypeData {
    Int(i64),
    /// Bit pattern, so that equality stays reflexive for NaN.
    Dbl(u64),
    Str(Arc<str>),
    Obj(ClassSpec),
    Cls(ClassSpec),
}

impl TypeData {
    fn bit(&self) -> TypeBits {
        match self {
            TypeData::Int(_) => TypeBits::INT,
            TypeData::Dbl(_) => TypeBits::DBL,
            TypeData::Str(_) => TypeBits::STR,
            TypeData::Obj(_) => TypeBits::OBJ,
            TypeData::Cls(_) => TypeBits::CLS,
        }
    }

    fn is_subseteq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeData::Obj(a), TypeData::Obj(b)) | (TypeData::Cls(a), TypeData::Cls(b)) => {
                a.is_subseteq(b)
            }
            _ => self == other,
        }
    }
}

/// Abstract type of a value.
///
/// A type is a set of [`TypeBits`] plus optional specialization data that
/// narrows exactly one non-null bit (a constant, or a class). Data may
/// coexist with null bits (`?Int=3`) but never with a second non-null kind.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Type {
    bits: TypeBits,
    data: Option<TypeData>,
}

// -- Constructors -----------------------------------------------------------

impl Type {
    fn make(bits: TypeBits, data: Option<TypeData>) -> Self {
        let data = data.filter(|d| (bits - TypeBits::NULL) == d.bit());
        Type { bits, data }
    }

    pub fn from_bits(bits: TypeBits) -> Self {
        Type { bits, data: None }
    }

    pub fn uninit() -> Self {
        Self::from_bits(TypeBits::UNINIT)
    }

    pub fn init_null() -> Self {
        Self::from_bits(TypeBits::INIT_NULL)
    }

    pub fn null() -> Self {
        Self::from_bits(TypeBits::NULL)
    }

    pub fn bool() -> Self {
        Self::from_bits(TypeBits::BOOL)
    }

    pub fn bool_val(b: bool) -> Self {
        Self::from_bits(if b { TypeBits::TRUE } else { TypeBits::FALSE })
    }

    pub fn int() -> Self {
        Self::from_bits(TypeBits::INT)
    }

    pub fn int_val(v: i64) -> Self {
        Self::make(TypeBits::INT, Some(TypeData::Int(v)))
    }

    pub fn dbl() -> Self {
        Self::from_bits(TypeBits::DBL)
    }

    pub fn dbl_val(v: f64) -> Self {
        Self::make(TypeBits::DBL, Some(TypeData::Dbl(v.to_bits())))
    }

    pub fn num() -> Self {
        Self::from_bits(TypeBits::NUM)
    }

    pub fn str() -> Self {
        Self::from_bits(TypeBits::STR)
    }

    pub fn str_val(s: impl Into<Arc<str>>) -> Self {
        Self::make(TypeBits::STR, Some(TypeData::Str(s.into())))
    }

    pub fn arr() -> Self {
        Self::from_bits(TypeBits::ARR)
    }

    pub fn obj() -> Self {
        Self::from_bits(TypeBits::OBJ)
    }

    pub fn exact_obj(class: impl Into<Arc<str>>) -> Self {
        Self::obj_of(class.into(), true)
    }

    pub fn sub_obj(class: impl Into<Arc<str>>) -> Self {
        Self::obj_of(class.into(), false)
    }

    fn obj_of(name: Arc<str>, exact: bool) -> Self {
        Self::make(TypeBits::OBJ, Some(TypeData::Obj(ClassSpec { name, exact })))
    }

    pub fn cls() -> Self {
        Self::from_bits(TypeBits::CLS)
    }

    pub fn exact_cls(class: impl Into<Arc<str>>) -> Self {
        let name = class.into();
        Self::make(TypeBits::CLS, Some(TypeData::Cls(ClassSpec { name, exact: true })))
    }

    pub fn init_cell() -> Self {
        Self::from_bits(TypeBits::INIT_CELL)
    }

    pub fn cell() -> Self {
        Self::from_bits(TypeBits::CELL)
    }

    pub fn from_const(value: &ConstValue) -> Self {
        match value {
            ConstValue::Null => Self::init_null(),
            ConstValue::Bool(b) => Self::bool_val(*b),
            ConstValue::Int(i) => Self::int_val(*i),
            ConstValue::Dbl(d) => Self::dbl_val(*d),
            ConstValue::Str(s) => Self::str_val(s.clone()),
        }
    }

    /// This type, or null.
    pub fn opt(&self) -> Self {
        Self::make(self.bits | TypeBits::INIT_NULL, self.data.clone())
    }
}

// -- Queries ----------------------------------------------------------------

impl Type {
    pub fn bits(&self) -> TypeBits {
        self.bits
    }

    pub fn is_bottom(&self) -> bool {
        self.bits.is_empty()
    }

    /// Whether every value of this type has one of the given kinds.
    pub fn subtype_of_bits(&self, bits: TypeBits) -> bool {
        bits.contains(self.bits)
    }

    /// Whether some value of this type may have one of the given kinds.
    pub fn could_be_bits(&self, bits: TypeBits) -> bool {
        self.bits.intersects(bits)
    }

    pub fn could_be(&self, other: &Type) -> bool {
        !self.meet(other).is_bottom()
    }

    /// The single value this type denotes, if it denotes exactly one.
    pub fn to_const(&self) -> Option<ConstValue> {
        if self.bits == TypeBits::INIT_NULL {
            return Some(ConstValue::Null);
        }
        if self.bits == TypeBits::TRUE || self.bits == TypeBits::FALSE {
            return Some(ConstValue::Bool(self.bits == TypeBits::TRUE));
        }
        match &self.data {
            Some(d) if self.bits == d.bit() => match d {
                TypeData::Int(i) => Some(ConstValue::Int(*i)),
                TypeData::Dbl(bits) => Some(ConstValue::Dbl(f64::from_bits(*bits))),
                TypeData::Str(s) => Some(ConstValue::Str(s.clone())),
                TypeData::Obj(_) | TypeData::Cls(_) => None,
            },
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        self.to_const().is_some()
    }

    pub fn str_data(&self) -> Option<&Arc<str>> {
        match &self.data {
            Some(TypeData::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Class named by an object or class-reference type.
    pub fn class_spec(&self) -> Option<&ClassSpec> {
        match &self.data {
            Some(TypeData::Obj(c)) | Some(TypeData::Cls(c)) => Some(c),
            _ => None,
        }
    }

    /// Decide a branch condition: `Some(b)` when every value converts to
    /// `b`, `None` when both outcomes are possible or the type is empty.
    pub fn truthiness(&self) -> Option<bool> {
        if self.is_bottom() {
            return None;
        }
        if let Some(v) = self.to_const() {
            return Some(v.to_bool());
        }
        if self.subtype_of_bits(TypeBits::TRUE | TypeBits::OBJ | TypeBits::RES) {
            return Some(true);
        }
        if self.subtype_of_bits(TypeBits::NULL | TypeBits::FALSE) {
            return Some(false);
        }
        None
    }

    /// Reading an uninitialized local yields null.
    pub fn uninit_as_null(&self) -> Self {
        if !self.bits.contains(TypeBits::UNINIT) {
            return self.clone();
        }
        Self::make(
            (self.bits - TypeBits::UNINIT) | TypeBits::INIT_NULL,
            self.data.clone(),
        )
    }

    /// Drop the null part of this type.
    pub fn unopt(&self) -> Self {
        Self::make(self.bits - TypeBits::NULL, self.data.clone())
    }
}

// -- Lattice ----------------------------------------------------------------

/// Class specs are compared by name only, with no knowledge of the class
/// hierarchy. The lattice laws hold among types whose classes are all the same
/// or all exact.
impl Lattice for Type {
    fn join(&self, other: &Self) -> Self {
        let bits = self.bits | other.bits;
        let data = match (&self.data, &other.data) {
            (Some(a), Some(b)) => {
                if a.is_subseteq(b) {
                    Some(b.clone())
                } else if b.is_subseteq(a) {
                    Some(a.clone())
                } else {
                    None
                }
            }
            (Some(a), None) if other.subtype_of_bits(TypeBits::NULL) => Some(a.clone()),
            (None, Some(b)) if self.subtype_of_bits(TypeBits::NULL) => Some(b.clone()),
            _ => None,
        };
        Self::make(bits, data)
    }

    fn meet(&self, other: &Self) -> Self {
        let mut bits = self.bits & other.bits;
        let data = match (&self.data, &other.data) {
            (Some(a), Some(b)) => {
                if a.is_subseteq(b) {
                    Some(a.clone())
                } else if b.is_subseteq(a) {
                    Some(b.clone())
                } else {
                    match (a, b) {
                        // Unrelated names may still share a subclass. Only two
                        // exact classes are known to be disjoint.
                        (TypeData::Obj(x), TypeData::Obj(y))
                        | (TypeData::Cls(x), TypeData::Cls(y))
                            if !(x.exact && y.exact) =>
                        {
                            if x.exact {
                                Some(a.clone())
                            } else if y.exact {
                                Some(b.clone())
                            } else {
                                None
                            }
                        }
                        _ => {
                            bits -= a.bit() | b.bit();
                            None
                        }
                    }
                }
            }
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };
        Self::make(bits, data)
    }

    fn is_subseteq(&self, other: &Self) -> bool {
        if !other.bits.contains(self.bits) {
            return false;
        }
        match (&self.data, &other.data) {
            (_, None) => true,
            (Some(a), Some(b)) => a.is_subseteq(b),
            (None, Some(b)) => !self.bits.contains(b.bit()),
        }
    }
}

impl HasBottom for Type {
    fn bottom() -> Self {
        Self::from_bits(TypeBits::empty())
    }
}

impl HasTop for Type {
    fn top() -> Self {
        Self::from_bits(TypeBits::TOP)
    }
}

// -- Display ----------------------------------------------------------------

const NAMED_BITS: &[(TypeBits, &str)] = &[
    (TypeBits::TOP, "Top"),
    (TypeBits::CELL, "Cell"),
    (TypeBits::INIT_CELL, "InitCell"),
    (TypeBits::NULL, "Null"),
    (TypeBits::BOOL, "Bool"),
    (TypeBits::NUM, "Num"),
    (TypeBits::UNINIT, "Uninit"),
    (TypeBits::INIT_NULL, "InitNull"),
    (TypeBits::FALSE, "False"),
    (TypeBits::TRUE, "True"),
    (TypeBits::INT, "Int"),
    (TypeBits::DBL, "Dbl"),
    (TypeBits::STR, "Str"),
    (TypeBits::ARR, "Arr"),
    (TypeBits::OBJ, "Obj"),
    (TypeBits::RES, "Res"),
    (TypeBits::CLS, "Cls"),
];

fn write_bits(f: &mut fmt::Formatter<'_>, bits: TypeBits) -> fmt::Result {
    if let Some((_, name)) = NAMED_BITS.iter().find(|(b, _)| *b == bits) {
        return f.write_str(name);
    }
    let mut rest = bits;
    let mut first = true;
    for (b, name) in NAMED_BITS {
        if !b.is_empty() && rest.contains(*b) {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            rest -= *b;
            first = false;
        }
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom() {
            return f.write_str("Bottom");
        }
        let (opt, core) = if self.bits != TypeBits::INIT_NULL
            && self.bits.contains(TypeBits::INIT_NULL)
            && !self.bits.contains(TypeBits::UNINIT)
            && NAMED_BITS
                .iter()
                .any(|(b, _)| *b == self.bits - TypeBits::INIT_NULL)
        {
            (true, self.bits - TypeBits::INIT_NULL)
        } else {
            (false, self.bits)
        };
        if opt {
            f.write_str("?")?;
        }
        write_bits(f, core)?;
        match &self.data {
            None => Ok(()),
            Some(TypeData::Int(i)) => write!(f, "={i}"),
            Some(TypeData::Dbl(bits)) => write!(f, "={:?}", f64::from_bits(*bits)),
            Some(TypeData::Str(s)) => write!(f, "=\"{}\"", s.escape_debug()),
            Some(TypeData::Obj(c)) | Some(TypeData::Cls(c)) => {
                write!(f, "{}{}", if c.exact { "=" } else { "<=" }, c.name)
            }
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_round_trip_through_types() {
        for v in [
            ConstValue::Null,
            ConstValue::Bool(true),
            ConstValue::Int(-7),
            ConstValue::Dbl(0.5),
            ConstValue::str("abc"),
        ] {
            assert_eq!(Type::from_const(&v).to_const(), Some(v));
        }
        assert_eq!(Type::int().to_const(), None);
        assert_eq!(Type::int_val(3).opt().to_const(), None);
        assert_eq!(Type::uninit().to_const(), None);
    }

    #[test]
    fn join_of_distinct_constants_loses_data() {
        let t = Type::int_val(1).join(&Type::int_val(2));
        assert_eq!(t, Type::int());
        let t = Type::int_val(1).join(&Type::init_null());
        assert_eq!(t, Type::int_val(1).opt());
        let t = Type::int_val(1).join(&Type::bool_val(false));
        assert_eq!(t.bits(), TypeBits::INT | TypeBits::FALSE);
        assert!(t.class_spec().is_none() && t.to_const().is_none());
    }

    #[test]
    fn exact_objects_are_below_sub_objects() {
        let exact = Type::exact_obj("C");
        let sub = Type::sub_obj("C");
        assert!(exact.is_subseteq(&sub));
        assert!(!sub.is_subseteq(&exact));
        assert_eq!(exact.join(&sub), sub);
        assert_eq!(exact.meet(&sub), exact);
        assert_eq!(Type::exact_obj("C").join(&Type::exact_obj("D")), Type::obj());
    }

    #[test]
    fn unrelated_class_names_may_overlap() {
        let (c, d) = (Type::sub_obj("C"), Type::sub_obj("D"));
        assert_eq!(c.meet(&d), Type::obj());
        assert!(c.could_be(&d));
        assert_eq!(c.meet(&Type::exact_obj("D")), Type::exact_obj("D"));
        assert!(Type::exact_obj("C").meet(&Type::exact_obj("D")).is_bottom());
        assert!(!Type::exact_obj("C").could_be(&Type::exact_obj("D")));
    }

    #[test]
    fn truthiness() {
        assert_eq!(Type::int_val(0).truthiness(), Some(false));
        assert_eq!(Type::str_val("x").truthiness(), Some(true));
        assert_eq!(Type::null().truthiness(), Some(false));
        assert_eq!(Type::sub_obj("C").truthiness(), Some(true));
        assert_eq!(Type::int().truthiness(), None);
        assert_eq!(Type::bottom().truthiness(), None);
    }

    #[test]
    fn uninit_reads_as_null() {
        assert_eq!(Type::uninit().uninit_as_null(), Type::init_null());
        assert_eq!(
            Type::int_val(4).join(&Type::uninit()).uninit_as_null(),
            Type::int_val(4).opt()
        );
    }

    #[test]
    fn display() {
        assert_eq!(Type::int_val(3).to_string(), "Int=3");
        assert_eq!(Type::str_val("abc").opt().to_string(), "?Str=\"abc\"");
        assert_eq!(Type::init_cell().to_string(), "InitCell");
        assert_eq!(Type::bottom().to_string(), "Bottom");
        assert_eq!(Type::sub_obj("C").to_string(), "Obj<=C");
        assert_eq!(Type::exact_cls("C").to_string(), "Cls=C");
        assert_eq!(
            Type::from_bits(TypeBits::INT | TypeBits::STR).to_string(),
            "Int|Str"
        );
        assert_eq!(Type::null().join(&Type::int()).to_string(), "Null|Int");
    }
}
