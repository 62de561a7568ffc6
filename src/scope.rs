use std::collections::HashMap;

use crate::ast::stmt::LetterSpec;
use crate::ast::{ExprId, QualType, StmtId};

/// How an identifier's type was (or was not) determined by implicit typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplicitRuleKind {
    /// `IMPLICIT NONE` is active; the identifier must be declared.
    None,
    /// A letter-range rule supplied the type.
    Rule,
    /// No rule matched; the default I-N integer / otherwise real rule holds.
    Default,
}

/// Letter-to-type mapping established by IMPLICIT statements. Scopes chain
/// to a parent (host program unit); resolution falls back through the chain
/// and terminates after at most depth+1 lookups.
#[derive(Debug, Default)]
pub struct ImplicitTypingScope {
    parent: Option<Box<ImplicitTypingScope>>,
    none: bool,
    rules: HashMap<char, QualType>,
}

impl ImplicitTypingScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: ImplicitTypingScope) -> Self {
        Self {
            parent: Some(Box::new(parent)),
            none: false,
            rules: HashMap::new(),
        }
    }

    pub fn into_parent(self) -> Option<ImplicitTypingScope> {
        self.parent.map(|p| *p)
    }

    /// Applies one letter-spec rule. Fails if `IMPLICIT NONE` was seen or if
    /// any letter in the range already has a rule.
    pub fn apply(&mut self, spec: LetterSpec, ty: QualType) -> bool {
        if self.none {
            return false;
        }
        let first = spec.first.to_ascii_uppercase();
        let last = spec.last.map(|c| c.to_ascii_uppercase()).unwrap_or(first);
        let mut c = first;
        while c <= last {
            if self.rules.contains_key(&c) {
                return false;
            }
            self.rules.insert(c, ty);
            c = (c as u8 + 1) as char;
        }
        true
    }

    /// `IMPLICIT NONE`; fails if any letter rule exists already.
    pub fn apply_none(&mut self) -> bool {
        if !self.rules.is_empty() {
            return false;
        }
        self.none = true;
        true
    }

    pub fn resolve(&self, letter: char) -> (ImplicitRuleKind, Option<QualType>) {
        if self.none {
            return (ImplicitRuleKind::None, None);
        }
        let c = letter.to_ascii_uppercase();
        if let Some(&ty) = self.rules.get(&c) {
            return (ImplicitRuleKind::Rule, Some(ty));
        }
        match &self.parent {
            Some(parent) => parent.resolve(letter),
            None => (ImplicitRuleKind::Default, None),
        }
    }
}

pub type StmtLabelValue = u64;

/// Which field of the issuing statement a forward reference patches once
/// its label is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSlot {
    GotoDestination,
    AssignedGotoAt(usize),
    DoTerminator,
    AssignAddress,
}

/// A use of a statement label that was not declared yet at the point of use.
#[derive(Debug, Clone, Copy)]
pub struct ForwardRef {
    /// The unresolved label expression (for its value and location).
    pub label: ExprId,
    /// The statement waiting on the label.
    pub statement: StmtId,
    pub slot: LabelSlot,
}

/// Statement labels declared in the current program unit, plus the forward
/// references still waiting on them. Reset between units.
#[derive(Debug, Default)]
pub struct StmtLabelScope {
    decls: HashMap<StmtLabelValue, StmtId>,
    forward: Vec<ForwardRef>,
}

impl StmtLabelScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, value: StmtLabelValue, statement: StmtId) {
        self.decls.insert(value, statement);
    }

    pub fn resolve(&self, value: StmtLabelValue) -> Option<StmtId> {
        self.decls.get(&value).copied()
    }

    pub fn declare_forward_reference(&mut self, reference: ForwardRef) {
        self.forward.push(reference);
    }

    pub fn remove_forward_references(&mut self, user: StmtId) {
        self.forward.retain(|r| r.statement != user);
    }

    /// Forward references in declaration order.
    pub fn forward_references(&self) -> &[ForwardRef] {
        &self.forward
    }

    pub fn decls_empty(&self) -> bool {
        self.decls.is_empty() && self.forward.is_empty()
    }

    pub fn reset(&mut self) {
        self.decls.clear();
        self.forward.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{QualType, TypeId};

    fn qt(n: u32) -> QualType {
        QualType::new(TypeId(n))
    }

    #[test]
    fn implicit_rules_reject_overlap() {
        let mut scope = ImplicitTypingScope::new();
        assert!(scope.apply(
            LetterSpec {
                first: 'a',
                last: Some('h')
            },
            qt(1)
        ));
        assert!(!scope.apply(
            LetterSpec {
                first: 'c',
                last: None
            },
            qt(2)
        ));
        assert_eq!(scope.resolve('B'), (ImplicitRuleKind::Rule, Some(qt(1))));
        assert_eq!(scope.resolve('z'), (ImplicitRuleKind::Default, None));
    }

    #[test]
    fn implicit_none_excludes_rules() {
        let mut scope = ImplicitTypingScope::new();
        assert!(scope.apply_none());
        assert!(!scope.apply(
            LetterSpec {
                first: 'i',
                last: None
            },
            qt(1)
        ));
        assert_eq!(scope.resolve('i'), (ImplicitRuleKind::None, None));

        let mut scope = ImplicitTypingScope::new();
        assert!(scope.apply(
            LetterSpec {
                first: 'i',
                last: None
            },
            qt(1)
        ));
        assert!(!scope.apply_none());
    }

    #[test]
    fn rules_fall_back_to_parent() {
        let mut parent = ImplicitTypingScope::new();
        parent.apply(
            LetterSpec {
                first: 'x',
                last: None,
            },
            qt(7),
        );
        let child = ImplicitTypingScope::with_parent(parent);
        assert_eq!(child.resolve('X'), (ImplicitRuleKind::Rule, Some(qt(7))));
        assert_eq!(child.resolve('i'), (ImplicitRuleKind::Default, None));
    }

    #[test]
    fn label_scope_declares_and_resolves() {
        let mut scope = StmtLabelScope::new();
        assert!(scope.resolve(10).is_none());
        scope.declare(10, StmtId(3));
        assert_eq!(scope.resolve(10), Some(StmtId(3)));
        scope.declare_forward_reference(ForwardRef {
            label: crate::ast::ExprId(0),
            statement: StmtId(4),
            slot: LabelSlot::GotoDestination,
        });
        assert_eq!(scope.forward_references().len(), 1);
        scope.remove_forward_references(StmtId(4));
        assert!(scope.forward_references().is_empty());
        scope.reset();
        assert!(scope.decls_empty());
    }
}
