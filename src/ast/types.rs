use super::{DeclId, ExprId, TypeId};

/// Extended attribute of an entity. At most one of these applies to a
/// qualified type; a second, different one is a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtAttr {
    None = 0,
    Asynchronous = 1,
    Contiguous = 2,
    Optional = 3,
    Pointer = 4,
    Save = 5,
    Target = 6,
    Value = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentAttr {
    None = 0,
    In = 1,
    Out = 2,
    InOut = 3,
}

/// The collection of all type qualifiers we support, packed into one word.
///
/// bits: |0 1 2|3 .. 5|6..7|8  ...  31|
///       |A P V|ExtAtt|Int.|AddrSpace |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Qualifiers {
    mask: u32,
}

const ALLOCATABLE: u32 = 1 << 0;
const PARAMETER: u32 = 1 << 1;
const VOLATILE: u32 = 1 << 2;
const APV_MASK: u32 = ALLOCATABLE | PARAMETER | VOLATILE;
const EXT_SHIFT: u32 = 3;
const EXT_MASK: u32 = 0x7 << EXT_SHIFT;
const INTENT_SHIFT: u32 = 6;
const INTENT_MASK: u32 = 0x3 << INTENT_SHIFT;
const ADDR_SHIFT: u32 = 8;
const ADDR_MASK: u32 = !(APV_MASK | EXT_MASK | INTENT_MASK);

impl Qualifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty(&self) -> bool {
        self.mask == 0
    }

    pub fn has_allocatable(&self) -> bool {
        self.mask & ALLOCATABLE != 0
    }
    pub fn add_allocatable(&mut self) {
        self.mask |= ALLOCATABLE;
    }

    pub fn has_parameter(&self) -> bool {
        self.mask & PARAMETER != 0
    }
    pub fn add_parameter(&mut self) {
        self.mask |= PARAMETER;
    }

    pub fn has_volatile(&self) -> bool {
        self.mask & VOLATILE != 0
    }
    pub fn add_volatile(&mut self) {
        self.mask |= VOLATILE;
    }

    pub fn has_ext_attr(&self) -> bool {
        self.mask & EXT_MASK != 0
    }
    pub fn ext_attr(&self) -> ExtAttr {
        match (self.mask & EXT_MASK) >> EXT_SHIFT {
            1 => ExtAttr::Asynchronous,
            2 => ExtAttr::Contiguous,
            3 => ExtAttr::Optional,
            4 => ExtAttr::Pointer,
            5 => ExtAttr::Save,
            6 => ExtAttr::Target,
            7 => ExtAttr::Value,
            _ => ExtAttr::None,
        }
    }
    pub fn set_ext_attr(&mut self, attr: ExtAttr) {
        self.mask = (self.mask & !EXT_MASK) | ((attr as u32) << EXT_SHIFT);
    }

    pub fn has_intent_attr(&self) -> bool {
        self.mask & INTENT_MASK != 0
    }
    pub fn intent_attr(&self) -> IntentAttr {
        match (self.mask & INTENT_MASK) >> INTENT_SHIFT {
            1 => IntentAttr::In,
            2 => IntentAttr::Out,
            3 => IntentAttr::InOut,
            _ => IntentAttr::None,
        }
    }
    pub fn set_intent_attr(&mut self, attr: IntentAttr) {
        self.mask = (self.mask & !INTENT_MASK) | ((attr as u32) << INTENT_SHIFT);
    }

    pub fn has_address_space(&self) -> bool {
        self.mask & ADDR_MASK != 0
    }
    pub fn address_space(&self) -> u32 {
        self.mask >> ADDR_SHIFT
    }
    pub fn set_address_space(&mut self, space: u32) {
        self.mask = (self.mask & !ADDR_MASK) | (space << ADDR_SHIFT);
    }

    /// Union two qualifier sets: flag bits are or-ed, and if an enumerated
    /// attribute appears in both, the right-hand one wins.
    pub fn add_qualifiers(&mut self, other: Qualifiers) {
        self.mask |= other.mask & APV_MASK;
        if other.has_ext_attr() {
            self.set_ext_attr(other.ext_attr());
        }
        if other.has_intent_attr() {
            self.set_intent_attr(other.intent_attr());
        }
        if other.has_address_space() {
            self.set_address_space(other.address_space());
        }
    }

    /// Union, given that enumerated attributes do not conflict. A conflict
    /// is a programming error in the analyzer.
    pub fn add_consistent_qualifiers(&mut self, other: Qualifiers) {
        debug_assert!(
            self.ext_attr() == other.ext_attr() || !self.has_ext_attr() || !other.has_ext_attr(),
            "conflicting extended attributes"
        );
        debug_assert!(
            self.intent_attr() == other.intent_attr()
                || !self.has_intent_attr()
                || !other.has_intent_attr(),
            "conflicting intents"
        );
        debug_assert!(
            self.address_space() == other.address_space()
                || !self.has_address_space()
                || !other.has_address_space(),
            "conflicting address spaces"
        );
        self.mask |= other.mask;
    }
}

/// The intrinsic Fortran type specifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinSpec {
    Integer,
    Real,
    DoublePrecision,
    Complex,
    Character,
    Logical,
}

/// One dimension of an array type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArraySpec {
    /// `[lower :] upper`; a missing lower bound defaults to 1.
    ExplicitShape {
        lower: Option<ExprId>,
        upper: ExprId,
    },
    /// `[lower] :` as in assumed-shape dummy arguments.
    AssumedShape { lower: Option<ExprId> },
    /// `*`
    AssumedSize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// A builtin scalar, optionally carrying a kind selector; CHARACTER may
    /// also carry a length selector. The plain (selector-free) builtin is the
    /// canonical form.
    Builtin {
        spec: BuiltinSpec,
        kind: Option<ExprId>,
        len: Option<ExprId>,
    },
    Array {
        element: QualType,
        dims: Vec<ArraySpec>,
    },
    Record { fields: Vec<DeclId> },
    Pointer { pointee: TypeId, dims: u32 },
}

/// Types are immutable once created and uniqued by structural identity; two
/// structurally identical payloads intern to the same handle.
#[derive(Debug)]
pub struct Type {
    pub kind: TypeKind,
    pub canonical: TypeId,
}

/// A canonical type paired with a qualifier set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QualType {
    pub ty: TypeId,
    pub quals: Qualifiers,
}

impl QualType {
    pub fn new(ty: TypeId) -> Self {
        Self {
            ty,
            quals: Qualifiers::new(),
        }
    }

    pub fn with_quals(ty: TypeId, quals: Qualifiers) -> Self {
        Self { ty, quals }
    }

    /// Strips the qualifier set, keeping the type handle.
    pub fn unqualified(&self) -> QualType {
        QualType::new(self.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifier_union_or_flags_right_wins_attrs() {
        let mut a = Qualifiers::new();
        a.add_parameter();
        a.set_intent_attr(IntentAttr::In);

        let mut b = Qualifiers::new();
        b.add_volatile();
        b.set_intent_attr(IntentAttr::Out);

        a.add_qualifiers(b);
        assert!(a.has_parameter());
        assert!(a.has_volatile());
        assert_eq!(a.intent_attr(), IntentAttr::Out);
    }

    #[test]
    fn consistent_union_keeps_agreeing_attrs() {
        let mut a = Qualifiers::new();
        a.set_ext_attr(ExtAttr::Save);
        let mut b = Qualifiers::new();
        b.set_ext_attr(ExtAttr::Save);
        b.add_allocatable();
        a.add_consistent_qualifiers(b);
        assert_eq!(a.ext_attr(), ExtAttr::Save);
        assert!(a.has_allocatable());
    }
}
