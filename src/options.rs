/// Source form of the input file. Fixed form is the punched-card layout
/// (label field in columns 1-5, continuation marker in column 6, text up to
/// column 72); free form is the modern layout with `&` continuations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceForm {
    Fixed,
    #[default]
    Free,
}

/// Options consumed by the lexer, parser and analyzer.
#[derive(Debug, Clone)]
pub struct LangOptions {
    pub source_form: SourceForm,
    /// Keep comments in the token stream instead of discarding them.
    pub return_comments: bool,
    /// Default kind used for REAL entities typed implicitly.
    pub default_real_kind: u8,
    /// Default kind used for INTEGER entities typed implicitly.
    pub default_integer_kind: u8,
}

impl Default for LangOptions {
    fn default() -> Self {
        Self {
            source_form: SourceForm::Free,
            return_comments: false,
            default_real_kind: 4,
            default_integer_kind: 4,
        }
    }
}

impl LangOptions {
    /// Picks the source form from the file extension the way most Fortran
    /// drivers do: `.f`/`.for` are fixed form, everything else free form.
    pub fn for_file(path: &std::path::Path) -> Self {
        let mut opts = Self::default();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if ext.eq_ignore_ascii_case("f") || ext.eq_ignore_ascii_case("for") {
                opts.source_form = SourceForm::Fixed;
            }
        }
        opts
    }
}
