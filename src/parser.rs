use crate::ast::expr::{BinaryOp, ExprKind, UnaryOp};
use crate::ast::stmt::{FormatSpec, LetterSpec, ModuleNature, StmtLabelRef};
use crate::ast::{ArraySpec, ExprId, StmtId};
use crate::diag::Span;
use crate::errors::CompileErrorKind;
use crate::ident::{lookup_keyword, Symbol};
use crate::lexer::{Token, TokenKind};
use crate::sema::{DeclSpec, Sema, TypeSpec};
use crate::ast::types::{ExtAttr, IntentAttr};

/// Recursive-descent parser with one token of lookahead. Word tokens are
/// classified against the keyword table on first use; compound keywords
/// (`ELSE IF`, `GO TO`, `END ...`, `END BLOCK DATA`) are merged as the
/// stream advances. Statements that fail to parse are skipped up to the next
/// start-of-statement token.
pub struct Parser<'a, 'ctx> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    tok: Token,
    peek: Token,
    stmt_label: Option<ExprId>,
    pub sema: &'a mut Sema<'ctx>,
}

enum Action {
    /// The leading token does not begin an action statement.
    NotAction,
    Stmt(Option<StmtId>),
}

impl<'a, 'ctx> Parser<'a, 'ctx> {
    pub fn new(src: &'a str, tokens: Vec<Token>, sema: &'a mut Sema<'ctx>) -> Self {
        let eof = Token::eof(src.len());
        Parser {
            src,
            tokens,
            pos: 0,
            tok: eof.clone(),
            peek: eof,
            stmt_label: None,
            sema,
        }
    }

    // ------------------------------------------------------ token stream

    fn spelling_of(&self, tok: &Token) -> &'a str {
        self.src.get(tok.span.clone()).unwrap_or("")
    }

    fn spelling(&self) -> &'a str {
        self.src.get(self.tok.span.clone()).unwrap_or("")
    }

    /// Pulls the next classified token out of the stream, reporting
    /// lexer-level error tokens as it goes.
    fn next_classified(&mut self) -> Token {
        loop {
            if self.pos >= self.tokens.len() {
                return Token::eof(self.src.len());
            }
            let mut tok = self.tokens[self.pos].clone();
            self.pos += 1;
            match &tok.kind {
                TokenKind::Comment => continue,
                TokenKind::Error(text) => {
                    let message = format!("unrecognized token `{}`", text);
                    self.sema
                        .diags
                        .error(tok.span.clone(), CompileErrorKind::Lex, message);
                    continue;
                }
                TokenKind::Word => {
                    if let Some(kw) = lookup_keyword(self.spelling_of(&tok)) {
                        tok.kind = kw;
                    } else {
                        tok.kind = TokenKind::Ident;
                    }
                    return tok;
                }
                _ => return tok,
            }
        }
    }

    /// Advances to the next token, merging compound keywords.
    fn lex(&mut self) {
        self.tok = std::mem::replace(&mut self.peek, Token::eof(self.src.len()));
        if self.tok.kind == TokenKind::Eof {
            return;
        }
        self.peek = self.next_classified();

        macro_rules! merge {
            ($($next:path => $merged:path),+ $(,)?) => {
                $(
                    if self.peek.kind == $next && !self.peek.start_of_statement {
                        self.merge_into($merged);
                        return;
                    }
                )+
            };
        }

        match self.tok.kind {
            TokenKind::KwBlock => {
                merge!(TokenKind::KwData => TokenKind::KwBlockData);
            }
            TokenKind::KwElse => {
                merge!(
                    TokenKind::KwIf => TokenKind::KwElseIf,
                    TokenKind::KwWhere => TokenKind::KwElseWhere,
                );
            }
            TokenKind::KwEnd => {
                merge!(
                    TokenKind::KwIf => TokenKind::KwEndIf,
                    TokenKind::KwDo => TokenKind::KwEndDo,
                    TokenKind::KwFunction => TokenKind::KwEndFunction,
                    TokenKind::KwForall => TokenKind::KwEndForall,
                    TokenKind::KwWhere => TokenKind::KwEndWhere,
                    TokenKind::KwEnum => TokenKind::KwEndEnum,
                    TokenKind::KwSelect => TokenKind::KwEndSelect,
                    TokenKind::KwType => TokenKind::KwEndType,
                    TokenKind::KwModule => TokenKind::KwEndModule,
                    TokenKind::KwProgram => TokenKind::KwEndProgram,
                    TokenKind::KwSubroutine => TokenKind::KwEndSubroutine,
                    TokenKind::KwAssociate => TokenKind::KwEndAssociate,
                    TokenKind::KwFile => TokenKind::KwEndFile,
                    TokenKind::KwInterface => TokenKind::KwEndInterface,
                    TokenKind::KwBlockData => TokenKind::KwEndBlockData,
                );
                // `END BLOCK DATA` spans three tokens.
                if self.peek.kind == TokenKind::KwBlock && !self.peek.start_of_statement {
                    self.peek = self.next_classified();
                    if self.peek.kind != TokenKind::KwData {
                        self.sema.diags.error(
                            self.peek.span.clone(),
                            CompileErrorKind::Parse,
                            "expected 'DATA' after 'BLOCK' keyword",
                        );
                        return;
                    }
                    self.tok.kind = TokenKind::KwEndBlockData;
                    self.tok.span = self.tok.span.start..self.peek.span.end;
                    self.peek = self.next_classified();
                }
            }
            TokenKind::KwEndBlock => {
                merge!(TokenKind::KwData => TokenKind::KwEndBlockData);
            }
            TokenKind::KwGo => {
                merge!(TokenKind::KwTo => TokenKind::KwGoTo);
            }
            TokenKind::KwSelect => {
                merge!(
                    TokenKind::KwCase => TokenKind::KwSelectCase,
                    TokenKind::KwType => TokenKind::KwSelectType,
                );
            }
            TokenKind::KwIn => {
                merge!(TokenKind::KwOut => TokenKind::KwInOut);
            }
            TokenKind::KwDouble => {
                merge!(TokenKind::KwPrecision => TokenKind::KwDoublePrecision);
            }
            _ => {}
        }
    }

    fn merge_into(&mut self, merged: TokenKind) {
        self.tok.kind = merged;
        self.tok.span = self.tok.span.start..self.peek.span.end;
        self.peek = self.next_classified();
    }

    fn is(&self, kind: TokenKind) -> bool {
        self.tok.kind == kind
    }

    /// Eat the token if it's present. Returns true if it was.
    fn eat_if_present(&mut self, kind: TokenKind) -> bool {
        if self.tok.kind == kind {
            self.lex();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.eat_if_present(kind) {
            return true;
        }
        self.sema.diags.error(
            self.tok.span.clone(),
            CompileErrorKind::Parse,
            format!("expected {}", what),
        );
        false
    }

    /// Skips to the next start-of-statement token. Done in an unrecoverable
    /// error situation.
    fn lex_to_end_of_statement(&mut self) {
        while self.tok.kind != TokenKind::Eof && !self.tok.start_of_statement {
            self.lex();
        }
    }

    fn at_statement_start(&self) -> bool {
        self.tok.start_of_statement || self.tok.kind == TokenKind::Eof
    }

    /// Whether the current token can serve as a name. Keywords downgrade to
    /// identifiers where the grammar expects a name.
    fn tok_is_name(&self) -> bool {
        let s = self.spelling();
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !matches!(self.tok.kind, TokenKind::Str)
    }

    fn take_name(&mut self, what: &str) -> Option<(Symbol, Span)> {
        if !self.tok_is_name() || self.at_statement_start() && self.tok.kind == TokenKind::Eof {
            self.sema.diags.error(
                self.tok.span.clone(),
                CompileErrorKind::Parse,
                format!("expected {}", what),
            );
            return None;
        }
        let span = self.tok.span.clone();
        let sym = self.sema.ctx.idents.intern(self.spelling());
        self.lex();
        Some((sym, span))
    }

    /// Parse the statement label token, if the current token is one.
    fn parse_statement_label(&mut self) {
        self.stmt_label = None;
        if self.tok.start_of_statement && self.tok.kind == TokenKind::Integer {
            let span = self.tok.span.clone();
            let spelling = self.spelling().to_string();
            let label = self.sema.act_on_label_literal(span, &spelling);
            self.stmt_label = Some(label);
            self.lex();
        }
    }

    // ------------------------------------------------------ program units

    /// Main entry point: parses program units until end of file.
    pub fn parse_program_units(&mut self) {
        self.peek = self.next_classified();
        self.lex();
        self.tok.start_of_statement = true;

        while !self.parse_program_unit() {}
    }

    /// program-unit := main-program | external-subprogram | module
    ///               | block-data
    fn parse_program_unit(&mut self) -> bool {
        if self.is(TokenKind::Eof) {
            return true;
        }

        self.parse_statement_label();

        match self.tok.kind {
            TokenKind::KwFunction | TokenKind::KwSubroutine => {
                self.parse_external_subprogram(None);
            }
            TokenKind::KwInteger
            | TokenKind::KwReal
            | TokenKind::KwComplex
            | TokenKind::KwCharacter
            | TokenKind::KwLogical
            | TokenKind::KwDoublePrecision
                if self.peek.kind == TokenKind::KwFunction =>
            {
                let ds = self.parse_decl_spec();
                self.parse_external_subprogram(Some(ds));
            }
            TokenKind::KwModule => self.parse_module(),
            TokenKind::KwBlockData => self.parse_block_data(),
            _ => self.parse_main_program(),
        }

        false
    }

    /// main-program := [program-stmt] [specification-part] [execution-part]
    ///                 end-program-stmt
    fn parse_main_program(&mut self) {
        let loc = self.tok.span.clone();
        let mut name = None;

        if self.is(TokenKind::KwProgram) {
            let label = self.stmt_label;
            self.lex();
            if self.tok_is_name() && !self.at_statement_start() {
                let span = self.tok.span.clone();
                let sym = self.sema.ctx.idents.intern(self.spelling());
                name = Some((sym, span));
                self.lex();
            } else {
                self.sema.diags.error(
                    loc.clone(),
                    CompileErrorKind::Parse,
                    "'PROGRAM' keyword expects an identifier",
                );
            }
            self.sema
                .act_on_main_program(name.as_ref().map(|(s, _)| *s), loc.clone());
            let stmt = self
                .sema
                .act_on_program_stmt(loc, name.as_ref().map(|(s, _)| *s), label);
            self.sema.append_to_body(stmt);
            self.parse_statement_label();
        } else {
            // No PROGRAM statement; the current statement (and its label)
            // belongs to the body.
            self.sema.act_on_main_program(None, loc);
        }

        if !self.at_unit_end() {
            self.parse_specification_part();
        }
        if !self.at_unit_end() {
            self.parse_execution_part();
        }

        self.parse_end_program_stmt();
    }

    fn at_unit_end(&self) -> bool {
        matches!(
            self.tok.kind,
            TokenKind::KwEnd | TokenKind::KwEndProgram | TokenKind::Eof
        )
    }

    fn parse_end_program_stmt(&mut self) {
        let label = self.stmt_label;
        let loc = self.tok.span.clone();
        let mut end_name = None;

        match self.tok.kind {
            TokenKind::KwEndProgram => {
                self.lex();
                if !self.at_statement_start() && self.tok_is_name() {
                    let span = self.tok.span.clone();
                    let sym = self.sema.ctx.idents.intern(self.spelling());
                    end_name = Some((sym, span));
                    self.lex();
                }
            }
            TokenKind::KwEnd => {
                self.lex();
            }
            _ => {
                self.sema.diags.error(
                    loc.clone(),
                    CompileErrorKind::Parse,
                    "expected 'END PROGRAM' statement",
                );
            }
        }

        let stmt = self.sema.act_on_end_program_stmt(
            loc.clone(),
            end_name.as_ref().map(|(s, _)| *s),
            label,
        );
        self.sema.append_to_body(stmt);
        self.sema.act_on_end_main_program(loc, end_name);
    }

    /// external-subprogram := function-subprogram | subroutine-subprogram
    fn parse_external_subprogram(&mut self, result_ds: Option<DeclSpec>) {
        let is_function = self.is(TokenKind::KwFunction);
        let loc = self.tok.span.clone();
        self.lex();

        let Some((name, _)) = self.take_name(if is_function {
            "a function name"
        } else {
            "a subroutine name"
        }) else {
            self.lex_to_end_of_statement();
            return;
        };

        let result = result_ds.map(|ds| self.sema.act_on_type_name(&ds));
        let decl = if is_function {
            self.sema.act_on_function(name, result, loc.clone())
        } else {
            self.sema.act_on_subroutine(name, loc.clone())
        };

        if self.eat_if_present(TokenKind::LParen) {
            if !self.eat_if_present(TokenKind::RParen) {
                loop {
                    let Some((arg, span)) = self.take_name("a dummy argument name") else {
                        break;
                    };
                    self.sema.act_on_subprogram_arg(decl, arg, span);
                    if !self.eat_if_present(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "')' after the dummy argument list");
            }
        }

        self.parse_statement_label();
        if !self.at_subprogram_end() {
            self.parse_specification_part();
        }
        if !self.at_subprogram_end() {
            self.parse_execution_part();
        }

        let end_loc = self.tok.span.clone();
        match self.tok.kind {
            TokenKind::KwEnd
            | TokenKind::KwEndFunction
            | TokenKind::KwEndSubroutine => {
                self.lex();
                if !self.at_statement_start() && self.tok_is_name() {
                    self.lex();
                }
            }
            _ => {
                self.sema.diags.error(
                    end_loc.clone(),
                    CompileErrorKind::Parse,
                    if is_function {
                        "expected 'END FUNCTION' statement"
                    } else {
                        "expected 'END SUBROUTINE' statement"
                    },
                );
            }
        }
        self.sema.act_on_end_subprogram(end_loc);
    }

    fn at_subprogram_end(&self) -> bool {
        matches!(
            self.tok.kind,
            TokenKind::KwEnd
                | TokenKind::KwEndFunction
                | TokenKind::KwEndSubroutine
                | TokenKind::Eof
        )
    }

    /// module := module-stmt [specification-part] end-module-stmt
    fn parse_module(&mut self) {
        let loc = self.tok.span.clone();
        self.lex();
        let Some((name, _)) = self.take_name("a module name") else {
            self.lex_to_end_of_statement();
            return;
        };
        self.sema.act_on_module(name, loc);
        self.parse_statement_label();
        if !matches!(
            self.tok.kind,
            TokenKind::KwEnd | TokenKind::KwEndModule | TokenKind::Eof
        ) {
            self.parse_specification_part();
        }
        match self.tok.kind {
            TokenKind::KwEnd | TokenKind::KwEndModule => {
                self.lex();
                if !self.at_statement_start() && self.tok_is_name() {
                    self.lex();
                }
            }
            _ => {
                self.sema.diags.error(
                    self.tok.span.clone(),
                    CompileErrorKind::Parse,
                    "expected 'END MODULE' statement",
                );
            }
        }
        self.sema.act_on_end_module();
    }

    /// block-data := block-data-stmt [specification-part]
    ///               end-block-data-stmt
    fn parse_block_data(&mut self) {
        self.lex();
        if !self.at_statement_start() && self.tok_is_name() {
            self.lex();
        }
        while !matches!(
            self.tok.kind,
            TokenKind::KwEndBlockData | TokenKind::KwEnd | TokenKind::Eof
        ) {
            self.lex();
        }
        if !self.is(TokenKind::Eof) {
            self.lex();
        }
    }

    // ------------------------------------------------- specification part

    /// specification-part := [use-stmt]... [import-stmt]...
    ///                       [implicit-part]... [declaration-construct]...
    fn parse_specification_part(&mut self) {
        while self.is(TokenKind::KwUse) {
            if self.parse_use_stmt().is_none() {
                self.lex_to_end_of_statement();
            }
            self.parse_statement_label();
        }

        while self.is(TokenKind::KwImport) {
            self.parse_import_stmt();
            self.parse_statement_label();
        }

        while self.is(TokenKind::KwImplicit) {
            self.parse_implicit_stmt();
            self.parse_statement_label();
        }

        loop {
            if !self.parse_declaration_construct() {
                break;
            }
            self.parse_statement_label();
        }
    }

    /// Returns false when the current statement is not a declaration
    /// construct, leaving it for the execution part.
    fn parse_declaration_construct(&mut self) -> bool {
        match self.tok.kind {
            TokenKind::KwInteger
            | TokenKind::KwReal
            | TokenKind::KwComplex
            | TokenKind::KwCharacter
            | TokenKind::KwLogical
            | TokenKind::KwDoublePrecision => {
                self.parse_type_declaration_stmt();
                true
            }
            TokenKind::KwType if self.peek.kind != TokenKind::LParen => {
                self.parse_derived_type_def();
                true
            }
            TokenKind::KwParameter => {
                self.parse_parameter_stmt();
                true
            }
            TokenKind::KwDimension => {
                self.parse_dimension_stmt();
                true
            }
            TokenKind::KwExternal => {
                self.parse_simple_name_list_stmt(TokenKind::KwExternal);
                true
            }
            TokenKind::KwIntrinsic => {
                self.parse_simple_name_list_stmt(TokenKind::KwIntrinsic);
                true
            }
            TokenKind::KwAsynchronous => {
                self.parse_simple_name_list_stmt(TokenKind::KwAsynchronous);
                true
            }
            TokenKind::KwImplicit => {
                self.parse_implicit_stmt();
                true
            }
            TokenKind::Ident if self.peek.kind == TokenKind::LParen => {
                // `name(a, b) = expr` declares a statement function unless
                // the name is a known array.
                let sym = self.sema.ctx.idents.intern(self.spelling());
                if self.sema.is_array_entity(sym) {
                    return false;
                }
                if self.looks_like_stmt_function() {
                    self.parse_stmt_function();
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    /// Peeks whether `name ( simple-name-list ) =` follows, without
    /// consuming anything. Anything else is an executable statement.
    fn looks_like_stmt_function(&self) -> bool {
        let mut i = self.pos;
        // self.peek is '('; scan the buffered raw tokens past it.
        let mut depth = 1usize;
        let mut expect_name = true;
        while i < self.tokens.len() {
            let t = &self.tokens[i];
            i += 1;
            if matches!(t.kind, TokenKind::Comment) {
                continue;
            }
            if t.start_of_statement {
                return false;
            }
            match &t.kind {
                TokenKind::LParen => return false,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                TokenKind::Comma if !expect_name => {
                    expect_name = true;
                }
                TokenKind::Word if expect_name => {
                    expect_name = false;
                }
                _ => return false,
            }
        }
        if depth != 0 {
            return false;
        }
        while i < self.tokens.len() {
            let t = &self.tokens[i];
            i += 1;
            if matches!(t.kind, TokenKind::Comment) {
                continue;
            }
            return t.kind == TokenKind::Eq && !t.start_of_statement;
        }
        false
    }

    /// type-declaration-stmt := declaration-type-spec [[, attr-spec]... ::]
    ///                          entity-decl-list
    fn parse_type_declaration_stmt(&mut self) {
        let mut ds = self.parse_decl_spec();

        while self.eat_if_present(TokenKind::Comma) {
            match self.tok.kind {
                TokenKind::KwParameter => {
                    self.lex();
                    ds.quals.add_parameter();
                }
                TokenKind::KwAllocatable => {
                    self.lex();
                    ds.quals.add_allocatable();
                }
                TokenKind::KwVolatile => {
                    self.lex();
                    ds.quals.add_volatile();
                }
                TokenKind::KwAsynchronous => {
                    self.lex();
                    ds.quals.set_ext_attr(ExtAttr::Asynchronous);
                }
                TokenKind::KwContiguous => {
                    self.lex();
                    ds.quals.set_ext_attr(ExtAttr::Contiguous);
                }
                TokenKind::KwOptional => {
                    self.lex();
                    ds.quals.set_ext_attr(ExtAttr::Optional);
                }
                TokenKind::KwPointer => {
                    self.lex();
                    ds.quals.set_ext_attr(ExtAttr::Pointer);
                }
                TokenKind::KwSave => {
                    self.lex();
                    ds.quals.set_ext_attr(ExtAttr::Save);
                }
                TokenKind::KwTarget => {
                    self.lex();
                    ds.quals.set_ext_attr(ExtAttr::Target);
                }
                TokenKind::KwValue => {
                    self.lex();
                    ds.quals.set_ext_attr(ExtAttr::Value);
                }
                TokenKind::KwIntent => {
                    self.lex();
                    if self.expect(TokenKind::LParen, "'(' after INTENT") {
                        let intent = match self.tok.kind {
                            TokenKind::KwIn => IntentAttr::In,
                            TokenKind::KwOut => IntentAttr::Out,
                            TokenKind::KwInOut => IntentAttr::InOut,
                            _ => {
                                self.sema.diags.error(
                                    self.tok.span.clone(),
                                    CompileErrorKind::Parse,
                                    "expected an intent specifier",
                                );
                                IntentAttr::None
                            }
                        };
                        if intent != IntentAttr::None {
                            self.lex();
                            ds.quals.set_intent_attr(intent);
                        }
                        self.expect(TokenKind::RParen, "')' after the intent specifier");
                    }
                }
                TokenKind::KwDimension => {
                    self.lex();
                    let mut dims = Vec::new();
                    if self.parse_array_spec(&mut dims) {
                        ds.dims = Some(dims);
                    }
                }
                _ => {
                    self.sema.diags.error(
                        self.tok.span.clone(),
                        CompileErrorKind::Parse,
                        "expected an attribute specifier",
                    );
                    self.lex_to_end_of_statement();
                    return;
                }
            }
        }

        self.eat_if_present(TokenKind::DColon);

        loop {
            let Some((name, span)) = self.take_name("an entity name") else {
                self.lex_to_end_of_statement();
                return;
            };
            let mut entity_ds = ds.clone();
            if self.is(TokenKind::LParen) {
                let mut dims = Vec::new();
                if self.parse_array_spec(&mut dims) {
                    entity_ds.dims = Some(dims);
                }
            }
            let init = if self.eat_if_present(TokenKind::Eq) {
                Some(self.parse_expression())
            } else {
                None
            };
            self.sema.act_on_entity_decl(&entity_ds, span, name, init);
            if !self.eat_if_present(TokenKind::Comma) {
                break;
            }
        }
    }

    fn parse_decl_spec(&mut self) -> DeclSpec {
        let type_spec = match self.tok.kind {
            TokenKind::KwInteger => TypeSpec::Integer,
            TokenKind::KwReal => TypeSpec::Real,
            TokenKind::KwComplex => TypeSpec::Complex,
            TokenKind::KwCharacter => TypeSpec::Character,
            TokenKind::KwLogical => TypeSpec::Logical,
            TokenKind::KwDoublePrecision => TypeSpec::DoublePrecision,
            _ => TypeSpec::Real,
        };
        self.lex();
        let mut ds = DeclSpec::new(type_spec);

        // kind/length selectors: TYPE(KIND=k), TYPE*k, CHARACTER(LEN=n).
        if self.eat_if_present(TokenKind::Star) {
            let value = self.parse_expression();
            if type_spec == TypeSpec::Character {
                ds.length_selector = Some(value);
            } else {
                ds.kind_selector = Some(value);
            }
        } else if !matches!(type_spec, TypeSpec::DoublePrecision)
            && self.is(TokenKind::LParen)
            && self.selector_follows()
        {
            self.lex();
            let mut is_len = type_spec == TypeSpec::Character;
            if self.is(TokenKind::KwKind) && self.peek.kind == TokenKind::Eq {
                self.lex();
                self.lex();
                is_len = false;
            } else if self.is(TokenKind::KwLen) && self.peek.kind == TokenKind::Eq {
                self.lex();
                self.lex();
                is_len = true;
            }
            let value = self.parse_expression();
            if is_len {
                ds.length_selector = Some(value);
            } else {
                ds.kind_selector = Some(value);
            }
            self.expect(TokenKind::RParen, "')' after the type selector");
        }
        ds
    }

    /// Distinguishes a kind/length selector from an IMPLICIT letter range by
    /// looking one token past the '('.
    fn selector_follows(&self) -> bool {
        matches!(
            self.peek.kind,
            TokenKind::Integer | TokenKind::KwKind | TokenKind::KwLen | TokenKind::Ident
        ) || self.peek.kind == TokenKind::Star
    }

    /// derived-type-def := TYPE [::] name field-decls END TYPE [name]
    fn parse_derived_type_def(&mut self) {
        let loc = self.tok.span.clone();
        self.lex();
        self.eat_if_present(TokenKind::DColon);
        let Some((name, _)) = self.take_name("a derived type name") else {
            self.lex_to_end_of_statement();
            return;
        };
        let record = self.sema.act_on_derived_type_decl(loc, name);

        self.parse_statement_label();
        while !matches!(
            self.tok.kind,
            TokenKind::KwEndType | TokenKind::KwEnd | TokenKind::Eof
        ) {
            match self.tok.kind {
                TokenKind::KwInteger
                | TokenKind::KwReal
                | TokenKind::KwComplex
                | TokenKind::KwCharacter
                | TokenKind::KwLogical
                | TokenKind::KwDoublePrecision => {
                    let ds = self.parse_decl_spec();
                    self.eat_if_present(TokenKind::DColon);
                    loop {
                        let Some((field, span)) = self.take_name("a field name") else {
                            break;
                        };
                        let mut field_ds = ds.clone();
                        if self.is(TokenKind::LParen) {
                            let mut dims = Vec::new();
                            if self.parse_array_spec(&mut dims) {
                                field_ds.dims = Some(dims);
                            }
                        }
                        self.sema.act_on_derived_type_field(&field_ds, span, field);
                        if !self.eat_if_present(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                _ => {
                    self.sema.diags.error(
                        self.tok.span.clone(),
                        CompileErrorKind::Parse,
                        "expected a field declaration",
                    );
                    self.lex_to_end_of_statement();
                }
            }
            self.parse_statement_label();
        }
        if self.eat_if_present(TokenKind::KwEndType) || self.eat_if_present(TokenKind::KwEnd) {
            if !self.at_statement_start() && self.tok_is_name() {
                self.lex();
            }
        }
        self.sema.act_on_end_derived_type_decl(record);
    }

    /// use-stmt := USE [[, module-nature] ::] module-name [, rename-list]
    ///           | USE [[, module-nature] ::] module-name , ONLY : only-list
    fn parse_use_stmt(&mut self) -> Option<StmtId> {
        let label = self.stmt_label;
        let loc = self.tok.span.clone();
        self.lex();

        let mut nature = ModuleNature::Unspecified;
        if self.eat_if_present(TokenKind::Comma) {
            if self.eat_if_present(TokenKind::KwIntrinsic) {
                nature = ModuleNature::Intrinsic;
            } else if self.eat_if_present(TokenKind::KwNonIntrinsic) {
                nature = ModuleNature::NonIntrinsic;
            } else {
                self.sema.diags.error(
                    self.tok.span.clone(),
                    CompileErrorKind::Parse,
                    "expected module nature keyword",
                );
                return None;
            }
            if !self.eat_if_present(TokenKind::DColon) {
                self.sema.diags.error(
                    self.tok.span.clone(),
                    CompileErrorKind::Parse,
                    "expected a '::' after the module nature",
                );
                return None;
            }
        }

        self.eat_if_present(TokenKind::DColon);

        if !self.tok_is_name() {
            self.sema.diags.error(
                self.tok.span.clone(),
                CompileErrorKind::Parse,
                "missing module name in USE statement",
            );
            return None;
        }
        let module = self.sema.ctx.idents.intern(self.spelling());
        self.lex();

        let mut only = false;
        let mut renames = Vec::new();

        if self.eat_if_present(TokenKind::Comma) {
            if self.is(TokenKind::KwOnly) && self.peek.kind == TokenKind::Colon {
                self.lex();
                self.lex();
                only = true;
            }
            while !self.at_statement_start() && self.tok_is_name() {
                let local = self.sema.ctx.idents.intern(self.spelling());
                self.lex();
                if only {
                    if self.is(TokenKind::Arrow) {
                        self.sema.diags.error(
                            self.tok.span.clone(),
                            CompileErrorKind::Parse,
                            "performing a rename in an 'ONLY' list",
                        );
                        return None;
                    }
                    renames.push((local, local));
                } else {
                    if !self.eat_if_present(TokenKind::Arrow) {
                        self.sema.diags.error(
                            self.tok.span.clone(),
                            CompileErrorKind::Parse,
                            "expected a '=>' in the rename list",
                        );
                        return None;
                    }
                    let Some((use_name, _)) = self.take_name("a renamed entity") else {
                        return None;
                    };
                    renames.push((local, use_name));
                }
                if !self.eat_if_present(TokenKind::Comma) {
                    break;
                }
            }
        } else if !self.at_statement_start() {
            self.sema.diags.error(
                self.tok.span.clone(),
                CompileErrorKind::Parse,
                "expected a ',' in USE statement",
            );
            return None;
        }

        let stmt = self
            .sema
            .act_on_use(loc, nature, module, only, renames, label);
        self.sema.append_to_body(stmt);
        Some(stmt)
    }

    /// import-stmt := IMPORT [[::] import-name-list]
    fn parse_import_stmt(&mut self) {
        let label = self.stmt_label;
        let loc = self.tok.span.clone();
        self.lex();
        self.eat_if_present(TokenKind::DColon);

        let mut names = Vec::new();
        while !self.at_statement_start() && self.tok_is_name() {
            names.push(self.sema.ctx.idents.intern(self.spelling()));
            self.lex();
            self.eat_if_present(TokenKind::Comma);
        }
        let stmt = self.sema.act_on_import(loc, names, label);
        self.sema.append_to_body(stmt);
    }

    /// implicit-stmt := IMPLICIT implicit-spec-list | IMPLICIT NONE
    fn parse_implicit_stmt(&mut self) {
        let label = self.stmt_label;
        let loc = self.tok.span.clone();
        self.lex();

        if self.eat_if_present(TokenKind::KwNone) {
            let stmt = self.sema.act_on_implicit_none(loc, label);
            self.sema.append_to_body(stmt);
            return;
        }

        loop {
            let ds = self.parse_implicit_type_spec();
            if !self.expect(TokenKind::LParen, "'(' before the letter range") {
                self.lex_to_end_of_statement();
                return;
            }
            let mut specs = Vec::new();
            loop {
                let Some(first) = self.take_letter() else {
                    self.lex_to_end_of_statement();
                    return;
                };
                let last = if self.eat_if_present(TokenKind::Minus) {
                    self.take_letter()
                } else {
                    None
                };
                specs.push(LetterSpec { first, last });
                if !self.eat_if_present(TokenKind::Comma) {
                    break;
                }
            }
            if !self.expect(TokenKind::RParen, "')' after the letter range") {
                self.lex_to_end_of_statement();
                return;
            }
            let stmt = self.sema.act_on_implicit(loc.clone(), &ds, specs, label);
            self.sema.append_to_body(stmt);
            if !self.eat_if_present(TokenKind::Comma) {
                break;
            }
        }
    }

    /// The type part of an IMPLICIT rule; the parenthesized part is always
    /// the letter range, never a kind selector.
    fn parse_implicit_type_spec(&mut self) -> DeclSpec {
        let type_spec = match self.tok.kind {
            TokenKind::KwInteger => TypeSpec::Integer,
            TokenKind::KwReal => TypeSpec::Real,
            TokenKind::KwComplex => TypeSpec::Complex,
            TokenKind::KwCharacter => TypeSpec::Character,
            TokenKind::KwLogical => TypeSpec::Logical,
            TokenKind::KwDoublePrecision => TypeSpec::DoublePrecision,
            _ => {
                self.sema.diags.error(
                    self.tok.span.clone(),
                    CompileErrorKind::Parse,
                    "expected a type specification",
                );
                TypeSpec::Real
            }
        };
        self.lex();
        let mut ds = DeclSpec::new(type_spec);
        if self.eat_if_present(TokenKind::Star) {
            let value = self.parse_expression();
            if type_spec == TypeSpec::Character {
                ds.length_selector = Some(value);
            } else {
                ds.kind_selector = Some(value);
            }
        }
        ds
    }

    fn take_letter(&mut self) -> Option<char> {
        if self.tok_is_name() && self.spelling().len() == 1 {
            let c = self.spelling().chars().next().unwrap();
            self.lex();
            return Some(c);
        }
        self.sema.diags.error(
            self.tok.span.clone(),
            CompileErrorKind::Parse,
            "expected a letter",
        );
        None
    }

    /// parameter-stmt := PARAMETER ( named-constant-def-list )
    fn parse_parameter_stmt(&mut self) {
        let label = self.stmt_label;
        let loc = self.tok.span.clone();
        self.lex();
        if !self.expect(TokenKind::LParen, "'(' in PARAMETER statement") {
            self.lex_to_end_of_statement();
            return;
        }

        let mut pairs = Vec::new();
        while self.tok_is_name() {
            let Some((name, span)) = self.take_name("a named constant") else {
                break;
            };
            if !self.expect(TokenKind::Eq, "'=' in PARAMETER statement") {
                self.lex_to_end_of_statement();
                return;
            }
            let value = self.parse_expression();
            pairs.push((name, span, value));
            self.eat_if_present(TokenKind::Comma);
        }

        if !self.expect(TokenKind::RParen, "')' in PARAMETER statement") {
            self.lex_to_end_of_statement();
            return;
        }
        let stmt = self.sema.act_on_parameter(loc, pairs, label);
        self.sema.append_to_body(stmt);
    }

    /// dimension-stmt := DIMENSION [::] array-name ( array-spec )
    ///                   [, array-name ( array-spec )]...
    fn parse_dimension_stmt(&mut self) {
        let label = self.stmt_label;
        let loc = self.tok.span.clone();
        self.lex();
        self.eat_if_present(TokenKind::DColon);

        loop {
            let Some((name, span)) = self.take_name("an array name") else {
                self.lex_to_end_of_statement();
                return;
            };
            let mut dims = Vec::new();
            if !self.parse_array_spec(&mut dims) {
                self.lex_to_end_of_statement();
                return;
            }
            let stmt = self
                .sema
                .act_on_dimension(loc.clone(), name, span, dims, label);
            self.sema.append_to_body(stmt);
            if !self.eat_if_present(TokenKind::Comma) {
                break;
            }
        }
    }

    fn parse_simple_name_list_stmt(&mut self, which: TokenKind) {
        let label = self.stmt_label;
        let loc = self.tok.span.clone();
        self.lex();
        self.eat_if_present(TokenKind::DColon);

        let mut names = Vec::new();
        while !self.at_statement_start() && self.tok_is_name() {
            names.push(self.sema.ctx.idents.intern(self.spelling()));
            self.lex();
            self.eat_if_present(TokenKind::Comma);
        }
        let stmt = match which {
            TokenKind::KwExternal => self.sema.act_on_external(loc, names, label),
            TokenKind::KwIntrinsic => self.sema.act_on_intrinsic(loc, names, label),
            _ => self.sema.act_on_asynchronous(loc, names, label),
        };
        self.sema.append_to_body(stmt);
    }

    /// stmt-function-stmt := name ( [dummy-arg-name-list] ) = expr
    fn parse_stmt_function(&mut self) {
        let label = self.stmt_label;
        let Some((name, span)) = self.take_name("a statement function name") else {
            return;
        };
        self.expect(TokenKind::LParen, "'(' in statement function");
        let mut params = Vec::new();
        if !self.eat_if_present(TokenKind::RParen) {
            loop {
                let Some(param) = self.take_name("a dummy argument name") else {
                    self.lex_to_end_of_statement();
                    return;
                };
                params.push(param);
                if !self.eat_if_present(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')' in statement function");
        }
        let function = self.sema.start_stmt_function(span.clone(), name, params);
        let body = if self.expect(TokenKind::Eq, "'=' in statement function") {
            Some(self.parse_expression())
        } else {
            None
        };
        if let Some(stmt) = self.sema.finish_stmt_function(function, body, span, label) {
            self.sema.append_to_body(stmt);
        }
    }

    /// array-spec := ( explicit-shape | assumed-shape | assumed-size , ... )
    fn parse_array_spec(&mut self, dims: &mut Vec<ArraySpec>) -> bool {
        if !self.expect(TokenKind::LParen, "'(' in array spec") {
            return false;
        }
        loop {
            if self.eat_if_present(TokenKind::Star) {
                dims.push(ArraySpec::AssumedSize);
            } else if self.eat_if_present(TokenKind::Colon) {
                dims.push(ArraySpec::AssumedShape { lower: None });
            } else {
                let first = self.parse_expression();
                if self.eat_if_present(TokenKind::Colon) {
                    if self.is(TokenKind::Comma) || self.is(TokenKind::RParen) {
                        dims.push(ArraySpec::AssumedShape { lower: Some(first) });
                    } else {
                        let upper = self.parse_expression();
                        dims.push(ArraySpec::ExplicitShape {
                            lower: Some(first),
                            upper,
                        });
                    }
                } else {
                    dims.push(ArraySpec::ExplicitShape {
                        lower: None,
                        upper: first,
                    });
                }
            }
            if !self.eat_if_present(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')' in array spec")
    }

    // ----------------------------------------------------- execution part

    fn parse_execution_part(&mut self) {
        loop {
            if self.at_unit_end() {
                break;
            }
            if !self.parse_executable_construct() {
                // Unrecognized statement; skip it and carry on.
                if !self.is(TokenKind::Eof) {
                    self.lex();
                }
                self.lex_to_end_of_statement();
            }
            self.parse_statement_label();
        }
    }

    /// One executable construct. Returns false if the leading token was not
    /// recognized (an error has been reported).
    fn parse_executable_construct(&mut self) -> bool {
        let label = self.stmt_label;
        match self.tok.kind {
            TokenKind::KwIf => self.parse_if_stmt(label),
            TokenKind::KwElseIf => self.parse_else_if_stmt(label),
            TokenKind::KwElse => {
                let loc = self.tok.span.clone();
                self.lex();
                if let Some(stmt) = self.sema.act_on_else_stmt(loc, label) {
                    self.sema.append_to_body(stmt);
                }
                true
            }
            TokenKind::KwEndIf => {
                let loc = self.tok.span.clone();
                self.lex();
                if let Some(stmt) = self.sema.act_on_end_if_stmt(loc, label) {
                    self.sema.append_to_body(stmt);
                }
                true
            }
            TokenKind::KwDo => self.parse_do_stmt(label),
            TokenKind::KwWhere => self.parse_where_stmt(label),
            _ => match self.parse_action_stmt(label) {
                Action::Stmt(stmt) => {
                    if let Some(stmt) = stmt {
                        self.sema.append_to_body(stmt);
                    }
                    true
                }
                Action::NotAction => {
                    self.sema.diags.error(
                        self.tok.span.clone(),
                        CompileErrorKind::Parse,
                        "expected an executable statement",
                    );
                    false
                }
            },
        }
    }

    /// Action statements are the simple statements a logical IF may carry.
    fn parse_action_stmt(&mut self, label: Option<ExprId>) -> Action {
        match self.tok.kind {
            TokenKind::KwGoTo => Action::Stmt(self.parse_goto_stmt(label)),
            TokenKind::KwAssign => Action::Stmt(self.parse_assign_stmt(label)),
            TokenKind::KwContinue => {
                let loc = self.tok.span.clone();
                self.lex();
                Action::Stmt(Some(self.sema.act_on_continue_stmt(loc, label)))
            }
            TokenKind::KwStop => {
                let loc = self.tok.span.clone();
                self.lex();
                let code = if !self.at_statement_start() {
                    Some(self.parse_expression())
                } else {
                    None
                };
                Action::Stmt(Some(self.sema.act_on_stop_stmt(loc, code, label)))
            }
            TokenKind::KwPrint => Action::Stmt(self.parse_print_stmt(label)),
            _ if self.tok_is_name() => Action::Stmt(self.parse_assignment_stmt(label)),
            _ => Action::NotAction,
        }
    }

    fn parse_assignment_stmt(&mut self, label: Option<ExprId>) -> Option<StmtId> {
        let loc = self.tok.span.clone();
        let Some((name, span)) = self.take_name("a variable name") else {
            return None;
        };
        let lhs = if self.is(TokenKind::LParen) {
            self.lex();
            let mut args = Vec::new();
            if !self.eat_if_present(TokenKind::RParen) {
                loop {
                    args.push(self.parse_expression());
                    if !self.eat_if_present(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "')' after the subscript list");
            }
            self.sema.act_on_subscript_or_call(span, name, args)
        } else {
            self.sema.act_on_variable(span, name)
        };

        if !self.expect(TokenKind::Eq, "'=' in assignment") {
            self.lex_to_end_of_statement();
            return None;
        }
        let rhs = self.parse_expression();
        let end = self.sema.ctx.expr(rhs).span.end;
        self.sema
            .act_on_assignment_stmt(loc.start..end, lhs, rhs, label)
    }

    /// goto-stmt := GO TO label
    /// assigned-goto-stmt := GO TO variable [[,] ( label-list )]
    fn parse_goto_stmt(&mut self, label: Option<ExprId>) -> Option<StmtId> {
        let loc = self.tok.span.clone();
        self.lex();

        if self.is(TokenKind::Integer) {
            let span = self.tok.span.clone();
            let spelling = self.spelling().to_string();
            let destination = self.sema.act_on_label_literal(span, &spelling);
            self.lex();
            return self.sema.act_on_goto_stmt(loc, destination, label);
        }

        if !self.tok_is_name() {
            self.sema.diags.error(
                self.tok.span.clone(),
                CompileErrorKind::Parse,
                "expected a statement label or a variable after 'GO TO'",
            );
            return None;
        }
        let (name, span) = self.take_name("a variable")?;
        let var = self.sema.act_on_variable(span, name);

        let mut allowed = Vec::new();
        self.eat_if_present(TokenKind::Comma);
        if self.eat_if_present(TokenKind::LParen) {
            loop {
                if !self.is(TokenKind::Integer) {
                    self.sema.diags.error(
                        self.tok.span.clone(),
                        CompileErrorKind::Parse,
                        "expected a statement label",
                    );
                    return None;
                }
                let span = self.tok.span.clone();
                let spelling = self.spelling().to_string();
                allowed.push(self.sema.act_on_label_literal(span, &spelling));
                self.lex();
                if !self.eat_if_present(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')' after the label list");
        }
        self.sema.act_on_assigned_goto_stmt(loc, var, allowed, label)
    }

    /// assign-stmt := ASSIGN label TO variable
    fn parse_assign_stmt(&mut self, label: Option<ExprId>) -> Option<StmtId> {
        let loc = self.tok.span.clone();
        self.lex();
        if !self.is(TokenKind::Integer) {
            self.sema.diags.error(
                self.tok.span.clone(),
                CompileErrorKind::Parse,
                "expected a statement label after 'ASSIGN'",
            );
            return None;
        }
        let span = self.tok.span.clone();
        let spelling = self.spelling().to_string();
        let address = self.sema.act_on_label_literal(span, &spelling);
        self.lex();

        if !self.expect(TokenKind::KwTo, "'TO' in ASSIGN statement") {
            return None;
        }
        let (name, span) = self.take_name("a variable")?;
        let var = self.sema.act_on_variable(span, name);
        self.sema.act_on_assign_stmt(loc, address, var, label)
    }

    /// if-stmt := IF ( expr ) action-stmt
    /// if-then-stmt := IF ( expr ) THEN
    fn parse_if_stmt(&mut self, label: Option<ExprId>) -> bool {
        let loc = self.tok.span.clone();
        self.lex();
        if !self.expect(TokenKind::LParen, "'(' after 'IF'") {
            return false;
        }
        let condition = self.parse_expression();
        if !self.expect(TokenKind::RParen, "')' after the IF condition") {
            return false;
        }

        if self.eat_if_present(TokenKind::KwThen) {
            if let Some(stmt) = self.sema.act_on_block_if_stmt(loc, condition, label) {
                self.sema.append_to_body(stmt);
            }
            return true;
        }

        match self.parse_action_stmt(None) {
            Action::Stmt(Some(then_stmt)) => {
                if let Some(stmt) = self.sema.act_on_if_stmt(loc, condition, then_stmt, label) {
                    self.sema.append_to_body(stmt);
                }
            }
            Action::Stmt(None) => {}
            Action::NotAction => {
                self.sema.diags.error(
                    self.tok.span.clone(),
                    CompileErrorKind::Parse,
                    "expected an action statement after the IF condition",
                );
                return false;
            }
        }
        true
    }

    fn parse_else_if_stmt(&mut self, label: Option<ExprId>) -> bool {
        let loc = self.tok.span.clone();
        self.lex();
        if !self.expect(TokenKind::LParen, "'(' after 'ELSE IF'") {
            return false;
        }
        let condition = self.parse_expression();
        if !self.expect(TokenKind::RParen, "')' after the ELSE IF condition") {
            return false;
        }
        self.eat_if_present(TokenKind::KwThen);
        if let Some(stmt) = self.sema.act_on_else_if_stmt(loc, condition, label) {
            self.sema.append_to_body(stmt);
        }
        true
    }

    /// do-stmt := DO label do-variable = expr , expr [, expr]
    fn parse_do_stmt(&mut self, label: Option<ExprId>) -> bool {
        let loc = self.tok.span.clone();
        self.lex();

        if !self.is(TokenKind::Integer) {
            self.sema.diags.error(
                self.tok.span.clone(),
                CompileErrorKind::Parse,
                "expected a terminating statement label after 'DO'",
            );
            return false;
        }
        let span = self.tok.span.clone();
        let spelling = self.spelling().to_string();
        let terminator = self.sema.act_on_label_literal(span, &spelling);
        self.lex();
        self.eat_if_present(TokenKind::Comma);

        let Some((name, span)) = self.take_name("a DO loop variable") else {
            return false;
        };
        let var = self.sema.act_on_variable(span, name);

        if !self.expect(TokenKind::Eq, "'=' in DO statement") {
            return false;
        }
        let init = self.parse_expression();
        if !self.expect(TokenKind::Comma, "',' in DO statement") {
            return false;
        }
        let limit = self.parse_expression();
        let step = if self.eat_if_present(TokenKind::Comma) {
            Some(self.parse_expression())
        } else {
            None
        };

        if let Some(stmt) = self
            .sema
            .act_on_do_stmt(loc, terminator, var, init, limit, step, label)
        {
            self.sema.append_to_body(stmt);
        }
        true
    }

    /// where-stmt := WHERE ( mask-expr ) assignment-stmt
    /// where-construct := WHERE ( mask-expr ) assignments... END WHERE
    fn parse_where_stmt(&mut self, label: Option<ExprId>) -> bool {
        let loc = self.tok.span.clone();
        self.lex();
        if !self.expect(TokenKind::LParen, "'(' after 'WHERE'") {
            return false;
        }
        let mask = self.parse_expression();
        if !self.expect(TokenKind::RParen, "')' after the WHERE mask") {
            return false;
        }

        if !self.at_statement_start() {
            let body = self.parse_assignment_stmt(None);
            if let Some(body) = body {
                if let Some(stmt) = self.sema.act_on_where_stmt(loc, mask, body, label) {
                    self.sema.append_to_body(stmt);
                }
            }
            return true;
        }

        // Construct form: a block of assignments up to END WHERE.
        let mut body = Vec::new();
        self.parse_statement_label();
        while !matches!(self.tok.kind, TokenKind::KwEndWhere | TokenKind::Eof) {
            let inner_label = self.stmt_label;
            if let Some(stmt) = self.parse_assignment_stmt(inner_label) {
                body.push(stmt);
            } else {
                self.lex_to_end_of_statement();
            }
            self.parse_statement_label();
        }
        if !self.expect(TokenKind::KwEndWhere, "'END WHERE'") {
            return false;
        }
        let block = self.sema.act_on_block(loc.clone(), body);
        if let Some(stmt) = self.sema.act_on_where_stmt(loc, mask, block, label) {
            self.sema.append_to_body(stmt);
        }
        true
    }

    /// print-stmt := PRINT format [, output-item-list]
    fn parse_print_stmt(&mut self, label: Option<ExprId>) -> Option<StmtId> {
        let loc = self.tok.span.clone();
        self.lex();

        let format = if self.eat_if_present(TokenKind::Star) {
            FormatSpec::Star
        } else if self.is(TokenKind::Integer) {
            let span = self.tok.span.clone();
            let spelling = self.spelling().to_string();
            let label_expr = self.sema.act_on_label_literal(span, &spelling);
            self.lex();
            FormatSpec::Label(StmtLabelRef::Unresolved(label_expr))
        } else {
            FormatSpec::CharExpr(self.parse_expression())
        };

        let mut items = Vec::new();
        while self.eat_if_present(TokenKind::Comma) {
            items.push(self.parse_expression());
        }
        Some(self.sema.act_on_print_stmt(loc, format, items, label))
    }

    // -------------------------------------------------------- expressions

    /// Precedence, lowest first: .EQV./.NEQV., .OR., .AND., .NOT.,
    /// relational, //, +/-, */, unary sign, ** (right associative).
    pub fn parse_expression(&mut self) -> ExprId {
        let mut lhs = self.parse_or_operand();
        loop {
            let op = match self.tok.kind {
                TokenKind::Eqv => BinaryOp::Eqv,
                TokenKind::Neqv => BinaryOp::Neqv,
                _ => break,
            };
            self.lex();
            let rhs = self.parse_or_operand();
            lhs = self.binary(op, lhs, rhs);
        }
        lhs
    }

    fn parse_or_operand(&mut self) -> ExprId {
        let mut lhs = self.parse_and_operand();
        while self.is(TokenKind::Or) {
            self.lex();
            let rhs = self.parse_and_operand();
            lhs = self.binary(BinaryOp::Or, lhs, rhs);
        }
        lhs
    }

    fn parse_and_operand(&mut self) -> ExprId {
        let mut lhs = self.parse_not_operand();
        while self.is(TokenKind::And) {
            self.lex();
            let rhs = self.parse_not_operand();
            lhs = self.binary(BinaryOp::And, lhs, rhs);
        }
        lhs
    }

    fn parse_not_operand(&mut self) -> ExprId {
        if self.is(TokenKind::Not) {
            let loc = self.tok.span.clone();
            self.lex();
            let operand = self.parse_not_operand();
            let end = self.sema.ctx.expr(operand).span.end;
            return self
                .sema
                .act_on_unary_expr(loc.start..end, UnaryOp::Not, operand);
        }
        self.parse_relational_operand()
    }

    fn parse_relational_operand(&mut self) -> ExprId {
        let lhs = self.parse_concat_operand();
        let op = match self.tok.kind {
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return lhs,
        };
        self.lex();
        let rhs = self.parse_concat_operand();
        self.binary(op, lhs, rhs)
    }

    fn parse_concat_operand(&mut self) -> ExprId {
        let mut lhs = self.parse_additive();
        while self.is(TokenKind::Concat) {
            self.lex();
            let rhs = self.parse_additive();
            lhs = self.binary(BinaryOp::Concat, lhs, rhs);
        }
        lhs
    }

    fn parse_additive(&mut self) -> ExprId {
        let mut lhs = self.parse_sign_operand();
        loop {
            let op = match self.tok.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.lex();
            let rhs = self.parse_sign_operand();
            lhs = self.binary(op, lhs, rhs);
        }
        lhs
    }

    fn parse_sign_operand(&mut self) -> ExprId {
        let op = match self.tok.kind {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Minus),
            _ => None,
        };
        if let Some(op) = op {
            let loc = self.tok.span.clone();
            self.lex();
            let operand = self.parse_term();
            let end = self.sema.ctx.expr(operand).span.end;
            return self.sema.act_on_unary_expr(loc.start..end, op, operand);
        }
        self.parse_term()
    }

    fn parse_term(&mut self) -> ExprId {
        let mut lhs = self.parse_factor();
        loop {
            let op = match self.tok.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.lex();
            let rhs = self.parse_factor();
            lhs = self.binary(op, lhs, rhs);
        }
        lhs
    }

    fn parse_factor(&mut self) -> ExprId {
        let base = self.parse_primary();
        if self.is(TokenKind::Pow) {
            self.lex();
            // ** is right associative and the exponent may carry a sign.
            let exponent = if matches!(self.tok.kind, TokenKind::Plus | TokenKind::Minus) {
                self.parse_sign_operand()
            } else {
                self.parse_factor()
            };
            return self.binary(BinaryOp::Pow, base, exponent);
        }
        base
    }

    fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let start = self.sema.ctx.expr(lhs).span.start;
        let end = self.sema.ctx.expr(rhs).span.end;
        self.sema.act_on_binary_expr(start..end, op, lhs, rhs)
    }

    fn parse_primary(&mut self) -> ExprId {
        let loc = self.tok.span.clone();
        match self.tok.kind {
            TokenKind::Integer => {
                let spelling = self.spelling().to_string();
                self.lex();
                self.sema.act_on_int_literal(loc, &spelling)
            }
            TokenKind::Real => {
                let spelling = self.spelling().to_string();
                self.lex();
                self.sema.act_on_real_literal(loc, &spelling)
            }
            TokenKind::Str => {
                let value = unquote(self.spelling());
                self.lex();
                self.sema.act_on_char_literal(loc, value)
            }
            TokenKind::True => {
                self.lex();
                self.sema.act_on_logical_literal(loc, true)
            }
            TokenKind::False => {
                self.lex();
                self.sema.act_on_logical_literal(loc, false)
            }
            TokenKind::LArray => self.parse_array_constructor(),
            TokenKind::LParen => {
                self.lex();
                let first = self.parse_expression();
                if self.eat_if_present(TokenKind::Comma) {
                    // A parenthesized pair of constants is a complex
                    // constant.
                    let second = self.parse_expression();
                    let end = self.tok.span.end;
                    self.expect(TokenKind::RParen, "')' after the complex constant");
                    return self.complex_constant(loc.start..end, first, second);
                }
                self.expect(TokenKind::RParen, "')' after the expression");
                first
            }
            _ if self.tok_is_name() => {
                let (name, span) = match self.take_name("an expression") {
                    Some(pair) => pair,
                    None => return self.error_expr(loc),
                };
                if self.is(TokenKind::LParen) && !self.tok.start_of_statement {
                    self.lex();
                    let mut args = Vec::new();
                    if !self.eat_if_present(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expression());
                            if !self.eat_if_present(TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(TokenKind::RParen, "')' after the argument list");
                    }
                    self.sema.act_on_subscript_or_call(span, name, args)
                } else {
                    self.sema.act_on_variable(span, name)
                }
            }
            _ => {
                self.sema.diags.error(
                    loc.clone(),
                    CompileErrorKind::Parse,
                    "expected an expression",
                );
                self.error_expr(loc)
            }
        }
    }

    fn parse_array_constructor(&mut self) -> ExprId {
        let loc = self.tok.span.clone();
        self.lex();
        let mut items = Vec::new();
        if !self.is(TokenKind::RArray) {
            loop {
                items.push(self.parse_expression());
                if !self.eat_if_present(TokenKind::Comma) {
                    break;
                }
            }
        }
        let end = self.tok.span.end;
        self.expect(TokenKind::RArray, "'/)' after the array constructor");
        self.sema.act_on_array_constructor(loc.start..end, items)
    }

    fn complex_constant(&mut self, loc: Span, re: ExprId, im: ExprId) -> ExprId {
        let as_f64 = |parser: &Self, e: ExprId| match &parser.sema.ctx.expr(e).kind {
            ExprKind::IntConstant(v) => Some(*v as f64),
            ExprKind::RealConstant(v) => Some(*v),
            ExprKind::Unary {
                op: UnaryOp::Minus,
                expr,
            } => match &parser.sema.ctx.expr(*expr).kind {
                ExprKind::IntConstant(v) => Some(-(*v as f64)),
                ExprKind::RealConstant(v) => Some(-*v),
                _ => None,
            },
            _ => None,
        };
        match (as_f64(self, re), as_f64(self, im)) {
            (Some(re), Some(im)) => self.sema.act_on_complex_constant(loc, re, im),
            _ => {
                self.sema.diags.error(
                    loc.clone(),
                    CompileErrorKind::Parse,
                    "expected a constant complex literal",
                );
                self.error_expr(loc)
            }
        }
    }

    fn error_expr(&mut self, loc: Span) -> ExprId {
        self.sema
            .ctx
            .alloc_expr(crate::ast::expr::Expr::error(loc))
    }
}

/// Strips the quotes of a character literal and collapses doubled quotes.
fn unquote(spelling: &str) -> String {
    if spelling.len() < 2 {
        return String::new();
    }
    let quote = spelling.chars().next().unwrap();
    let inner = &spelling[1..spelling.len() - 1];
    match quote {
        '\'' => inner.replace("''", "'"),
        _ => inner.replace("\"\"", "\""),
    }
}
