use logos::Logos;

use crate::options::{LangOptions, SourceForm};

/// Token kinds. The lexer only produces the "raw" subset (words, literals,
/// punctuation); the parser classifies words into keywords or identifiers on
/// first use and merges compound keywords, so the `Kw*` variants never come
/// out of `lex` directly.
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum TokenKind {
    #[regex(r"[ \t\r]+", logos::skip)]
    _Ws,
    #[regex(r"![^\n]*")]
    Comment,
    #[token("\n")]
    Newline,
    #[token(";")]
    Semicolon,
    #[token("&")]
    Ampersand,

    #[regex(r"[A-Za-z][A-Za-z0-9_]*")]
    Word,
    #[regex(r"[0-9]+")]
    Integer,
    #[regex(r"([0-9]+\.[0-9]+|\.[0-9]+)([eEdD][+-]?[0-9]+)?|[0-9]+[eEdD][+-]?[0-9]+")]
    Real,
    #[regex(r"'([^'\n]|'')*'")]
    #[regex(r#""([^"\n]|"")*""#)]
    Str,

    #[token(".true.", ignore(ascii_case))]
    True,
    #[token(".false.", ignore(ascii_case))]
    False,
    #[token(".and.", ignore(ascii_case))]
    And,
    #[token(".or.", ignore(ascii_case))]
    Or,
    #[token(".not.", ignore(ascii_case))]
    Not,
    #[token(".eqv.", ignore(ascii_case))]
    Eqv,
    #[token(".neqv.", ignore(ascii_case))]
    Neqv,
    #[token(".eq.", ignore(ascii_case))]
    #[token("==")]
    EqEq,
    #[token(".ne.", ignore(ascii_case))]
    #[token("/=")]
    Ne,
    #[token(".le.", ignore(ascii_case))]
    #[token("<=")]
    Le,
    #[token(".ge.", ignore(ascii_case))]
    #[token(">=")]
    Ge,
    #[token(".lt.", ignore(ascii_case))]
    #[token("<")]
    Lt,
    #[token(".gt.", ignore(ascii_case))]
    #[token(">")]
    Gt,

    #[token("**")]
    Pow,
    #[token("//")]
    Concat,
    #[token("(/")]
    LArray,
    #[token("/)")]
    RArray,
    #[token("=>")]
    Arrow,
    #[token("::")]
    DColon,
    #[token(":")]
    Colon,
    #[token("=")]
    Eq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("%")]
    Percent,

    // Classified keywords, produced by the parser's token classification.
    KwProgram,
    KwEndProgram,
    KwFunction,
    KwEndFunction,
    KwSubroutine,
    KwEndSubroutine,
    KwModule,
    KwEndModule,
    KwBlock,
    KwData,
    KwBlockData,
    KwEndBlock,
    KwEndBlockData,
    KwEnd,
    KwUse,
    KwImport,
    KwImplicit,
    KwNone,
    KwInteger,
    KwReal,
    KwComplex,
    KwCharacter,
    KwLogical,
    KwDouble,
    KwPrecision,
    KwDoublePrecision,
    KwParameter,
    KwDimension,
    KwExternal,
    KwIntrinsic,
    KwNonIntrinsic,
    KwIntent,
    KwIn,
    KwOut,
    KwInOut,
    KwAllocatable,
    KwVolatile,
    KwAsynchronous,
    KwContiguous,
    KwOptional,
    KwPointer,
    KwSave,
    KwTarget,
    KwValue,
    KwIf,
    KwThen,
    KwElse,
    KwElseIf,
    KwEndIf,
    KwDo,
    KwEndDo,
    KwContinue,
    KwStop,
    KwGo,
    KwTo,
    KwGoTo,
    KwAssign,
    KwPrint,
    KwWhere,
    KwElseWhere,
    KwEndWhere,
    KwSelect,
    KwCase,
    KwSelectCase,
    KwSelectType,
    KwEndSelect,
    KwType,
    KwEndType,
    KwKind,
    KwLen,
    KwOnly,
    KwResult,
    KwForall,
    KwEndForall,
    KwEnum,
    KwEndEnum,
    KwAssociate,
    KwEndAssociate,
    KwInterface,
    KwEndInterface,
    KwFile,
    KwEndFile,

    /// Classified user identifier.
    Ident,
    /// An unrecognized piece of input; the spelling is kept for the message.
    Error(String),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: std::ops::Range<usize>,
    /// True for the first token of a statement (after a newline, a `;`, or
    /// at the start of a fixed-form line that is not a continuation).
    pub start_of_statement: bool,
}

impl Token {
    pub fn eof(at: usize) -> Self {
        Token {
            kind: TokenKind::Eof,
            span: at..at,
            start_of_statement: true,
        }
    }
}

pub fn lex(input: &str, opts: &LangOptions) -> Vec<Token> {
    match opts.source_form {
        SourceForm::Free => lex_free(input, opts.return_comments),
        SourceForm::Fixed => lex_fixed(input, opts.return_comments),
    }
}

fn lex_free(input: &str, return_comments: bool) -> Vec<Token> {
    let mut lexer = TokenKind::lexer(input);
    let mut tokens = Vec::new();
    let mut at_stmt_start = true;
    let mut continuation = false;
    let mut after_continued_line_break = false;
    while let Some(res) = lexer.next() {
        let span = lexer.span();
        match res {
            Ok(TokenKind::Newline) => {
                if continuation {
                    continuation = false;
                    after_continued_line_break = true;
                } else {
                    at_stmt_start = true;
                }
            }
            Ok(TokenKind::Semicolon) => {
                at_stmt_start = true;
            }
            Ok(TokenKind::Ampersand) => {
                // A leading `&` on a continued line just resumes the
                // statement; anything else marks a continuation.
                if !after_continued_line_break {
                    continuation = true;
                }
                after_continued_line_break = false;
            }
            Ok(TokenKind::Comment) => {
                if return_comments {
                    tokens.push(Token {
                        kind: TokenKind::Comment,
                        span,
                        start_of_statement: false,
                    });
                }
            }
            Ok(kind) => {
                after_continued_line_break = false;
                tokens.push(Token {
                    kind,
                    span,
                    start_of_statement: at_stmt_start,
                });
                at_stmt_start = false;
            }
            Err(_) => {
                let text = input.get(span.clone()).unwrap_or("").to_string();
                tokens.push(Token {
                    kind: TokenKind::Error(text),
                    span,
                    start_of_statement: at_stmt_start,
                });
                at_stmt_start = false;
            }
        }
    }
    tokens
}

/// Fixed-form line structure: columns 1-5 hold the statement label, a
/// non-blank, non-zero column 6 marks a continuation line, text runs through
/// column 72. `C`, `c`, `*` or `!` in column 1 makes the line a comment.
fn lex_fixed(input: &str, return_comments: bool) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut offset = 0usize;
    for line in input.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        let line_len = line.len();
        let first = content.as_bytes().first().copied();
        if matches!(first, Some(b'C') | Some(b'c') | Some(b'*') | Some(b'!')) {
            if return_comments {
                tokens.push(Token {
                    kind: TokenKind::Comment,
                    span: offset..offset + content.len(),
                    start_of_statement: false,
                });
            }
            offset += line_len;
            continue;
        }
        if content.trim().is_empty() {
            offset += line_len;
            continue;
        }

        let bytes = content.as_bytes();
        let continued = bytes.len() > 5 && bytes[5] != b' ' && bytes[5] != b'0';
        let mut start_of_statement = !continued;

        if !continued {
            let field_end = content.len().min(5);
            let field = &content[..field_end];
            let trimmed = field.trim();
            if !trimmed.is_empty() {
                let at = field.find(trimmed).unwrap_or(0);
                let span = offset + at..offset + at + trimmed.len();
                let kind = if trimmed.bytes().all(|b| b.is_ascii_digit()) {
                    TokenKind::Integer
                } else {
                    TokenKind::Error(trimmed.to_string())
                };
                tokens.push(Token {
                    kind,
                    span,
                    start_of_statement: true,
                });
                start_of_statement = false;
            }
        }

        let text_start = content.len().min(6);
        let text_end = content.len().min(72);
        if text_start < text_end {
            let slice = &content[text_start..text_end];
            let mut lexer = TokenKind::lexer(slice);
            while let Some(res) = lexer.next() {
                let span = lexer.span();
                let span = offset + text_start + span.start..offset + text_start + span.end;
                match res {
                    Ok(TokenKind::Newline) | Ok(TokenKind::Ampersand) => {}
                    Ok(TokenKind::Semicolon) => {
                        start_of_statement = true;
                    }
                    Ok(TokenKind::Comment) => {
                        if return_comments {
                            tokens.push(Token {
                                kind: TokenKind::Comment,
                                span,
                                start_of_statement: false,
                            });
                        }
                    }
                    Ok(kind) => {
                        tokens.push(Token {
                            kind,
                            span,
                            start_of_statement,
                        });
                        start_of_statement = false;
                    }
                    Err(_) => {
                        let text = slice
                            .get(span.start - offset - text_start..span.end - offset - text_start)
                            .unwrap_or("")
                            .to_string();
                        tokens.push(Token {
                            kind: TokenKind::Error(text),
                            span,
                            start_of_statement,
                        });
                        start_of_statement = false;
                    }
                }
            }
        }
        offset += line_len;
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free(src: &str) -> Vec<Token> {
        lex(src, &LangOptions::default())
    }

    #[test]
    fn statement_boundaries() {
        let toks = free("x = 1\ny = 2");
        assert!(toks[0].start_of_statement);
        assert!(!toks[1].start_of_statement);
        assert!(!toks[2].start_of_statement);
        assert!(toks[3].start_of_statement);
    }

    #[test]
    fn continuation_joins_statements() {
        let toks = free("x = 1 + &\n  & 2\ny = 3");
        let starts: Vec<bool> = toks.iter().map(|t| t.start_of_statement).collect();
        // `2` continues the first statement; `y` begins the second.
        assert_eq!(
            starts,
            vec![true, false, false, false, false, true, false, false]
        );
    }

    #[test]
    fn dot_operators() {
        let toks = free("a .and. b .EQ. c");
        assert_eq!(toks[1].kind, TokenKind::And);
        assert_eq!(toks[3].kind, TokenKind::EqEq);
    }

    #[test]
    fn fixed_form_label_and_continuation() {
        let mut opts = LangOptions::default();
        opts.source_form = SourceForm::Fixed;
        let src = "\
C comment line
   10 x = 1 +\n     &    2\n      y = 3\n";
        let toks = lex(src, &opts);
        assert_eq!(toks[0].kind, TokenKind::Integer);
        assert!(toks[0].start_of_statement);
        assert_eq!(&src[toks[0].span.clone()], "10");
        // `2` on the continuation line does not open a statement.
        let two = toks
            .iter()
            .find(|t| &src[t.span.clone()] == "2")
            .expect("continuation token");
        assert!(!two.start_of_statement);
        let y = toks.iter().find(|t| &src[t.span.clone()] == "y").unwrap();
        assert!(y.start_of_statement);
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let toks = free("s = 'oops\n");
        assert!(toks
            .iter()
            .any(|t| matches!(t.kind, TokenKind::Error(_))));
    }
}
