use std::collections::HashMap;

use crate::lexer::TokenKind;

/// An interned, case-folded identifier. Symbols compare by id; the table is
/// append-only for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

#[derive(Debug, Default)]
pub struct IdentifierTable {
    names: Vec<String>,
    map: HashMap<String, Symbol>,
}

impl IdentifierTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fortran identifiers are case-insensitive; the interned spelling is
    /// the lower-case fold.
    pub fn intern(&mut self, spelling: &str) -> Symbol {
        let folded = spelling.to_ascii_lowercase();
        if let Some(&sym) = self.map.get(&folded) {
            return sym;
        }
        let sym = Symbol(self.names.len() as u32);
        self.map.insert(folded.clone(), sym);
        self.names.push(folded);
        sym
    }

    pub fn name(&self, sym: Symbol) -> &str {
        &self.names[sym.0 as usize]
    }
}

/// Reserved-keyword classification, consulted by the parser when it first
/// sees a word token. Keywords win over identifiers; the parser may still
/// treat a keyword token as a name where the grammar allows it.
pub fn lookup_keyword(spelling: &str) -> Option<TokenKind> {
    use TokenKind::*;
    let folded = spelling.to_ascii_lowercase();
    let kind = match folded.as_str() {
        "program" => KwProgram,
        "endprogram" => KwEndProgram,
        "function" => KwFunction,
        "endfunction" => KwEndFunction,
        "subroutine" => KwSubroutine,
        "endsubroutine" => KwEndSubroutine,
        "module" => KwModule,
        "endmodule" => KwEndModule,
        "block" => KwBlock,
        "data" => KwData,
        "blockdata" => KwBlockData,
        "endblock" => KwEndBlock,
        "endblockdata" => KwEndBlockData,
        "end" => KwEnd,
        "use" => KwUse,
        "import" => KwImport,
        "implicit" => KwImplicit,
        "none" => KwNone,
        "integer" => KwInteger,
        "real" => KwReal,
        "complex" => KwComplex,
        "character" => KwCharacter,
        "logical" => KwLogical,
        "double" => KwDouble,
        "precision" => KwPrecision,
        "doubleprecision" => KwDoublePrecision,
        "parameter" => KwParameter,
        "dimension" => KwDimension,
        "external" => KwExternal,
        "intrinsic" => KwIntrinsic,
        "nonintrinsic" => KwNonIntrinsic,
        "intent" => KwIntent,
        "in" => KwIn,
        "out" => KwOut,
        "inout" => KwInOut,
        "allocatable" => KwAllocatable,
        "volatile" => KwVolatile,
        "asynchronous" => KwAsynchronous,
        "contiguous" => KwContiguous,
        "optional" => KwOptional,
        "pointer" => KwPointer,
        "save" => KwSave,
        "target" => KwTarget,
        "value" => KwValue,
        "if" => KwIf,
        "then" => KwThen,
        "else" => KwElse,
        "elseif" => KwElseIf,
        "endif" => KwEndIf,
        "do" => KwDo,
        "enddo" => KwEndDo,
        "continue" => KwContinue,
        "stop" => KwStop,
        "go" => KwGo,
        "to" => KwTo,
        "goto" => KwGoTo,
        "assign" => KwAssign,
        "print" => KwPrint,
        "where" => KwWhere,
        "elsewhere" => KwElseWhere,
        "endwhere" => KwEndWhere,
        "select" => KwSelect,
        "case" => KwCase,
        "selectcase" => KwSelectCase,
        "selecttype" => KwSelectType,
        "endselect" => KwEndSelect,
        "type" => KwType,
        "endtype" => KwEndType,
        "kind" => KwKind,
        "len" => KwLen,
        "only" => KwOnly,
        "result" => KwResult,
        "forall" => KwForall,
        "endforall" => KwEndForall,
        "enum" => KwEnum,
        "endenum" => KwEndEnum,
        "associate" => KwAssociate,
        "endassociate" => KwEndAssociate,
        "interface" => KwInterface,
        "endinterface" => KwEndInterface,
        "file" => KwFile,
        "endfile" => KwEndFile,
        _ => return None,
    };
    Some(kind)
}

/// Result-type policy of a builtin function, used when a call to one is
/// typed without an explicit declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrinsicResult {
    Integer,
    Real,
    DoublePrecision,
    Complex,
    Logical,
    Character,
    SameAsArgument,
}

pub fn lookup_builtin(spelling: &str) -> Option<IntrinsicResult> {
    let folded = spelling.to_ascii_lowercase();
    let result = match folded.as_str() {
        "int" | "nint" | "ichar" | "iachar" | "len" | "len_trim" | "index" | "mod"
        | "modulo" | "count" | "size" | "lbound" | "ubound" | "scan" | "verify" => {
            IntrinsicResult::Integer
        }
        "real" | "float" | "sngl" | "amod" => IntrinsicResult::Real,
        "dble" | "dprod" => IntrinsicResult::DoublePrecision,
        "cmplx" | "conjg" => IntrinsicResult::Complex,
        "lge" | "lgt" | "lle" | "llt" | "allocated" => IntrinsicResult::Logical,
        "char" | "achar" | "trim" | "adjustl" | "adjustr" | "repeat" => {
            IntrinsicResult::Character
        }
        "abs" | "sign" | "dim" | "max" | "min" | "sqrt" | "exp" | "log" | "log10" | "sin"
        | "cos" | "tan" | "asin" | "acos" | "atan" | "atan2" | "sinh" | "cosh" | "tanh" => {
            IntrinsicResult::SameAsArgument
        }
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_case_insensitive() {
        let mut table = IdentifierTable::new();
        let a = table.intern("Foo");
        let b = table.intern("FOO");
        let c = table.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.name(a), "foo");
    }

    #[test]
    fn keywords_beat_builtins_beat_identifiers() {
        assert_eq!(lookup_keyword("Program"), Some(TokenKind::KwProgram));
        assert!(lookup_keyword("sqrt").is_none());
        assert_eq!(lookup_builtin("SQRT"), Some(IntrinsicResult::SameAsArgument));
        assert!(lookup_builtin("frobnicate").is_none());
    }
}
