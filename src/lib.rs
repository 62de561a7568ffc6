pub mod abi;
pub mod arrayplan;
pub mod ast;
pub mod cli;
pub mod diag;
pub mod errors;
pub mod eval;
pub mod ident;
pub mod lexer;
pub mod options;
pub mod parser;
pub mod printer;
pub mod scope;
pub mod sema;

use ast::ASTContext;
use diag::DiagnosticsEngine;
use options::LangOptions;
use parser::Parser;
use sema::Sema;

/// Runs the front end over one translation unit: lex, parse, analyze.
/// Returns the populated AST context and the diagnostics that were
/// produced; the caller inspects `had_errors` for the exit status.
pub fn analyze(src: &str, filename: &str, opts: &LangOptions) -> (ASTContext, DiagnosticsEngine) {
    let diags = DiagnosticsEngine::new(filename, src);
    run_pipeline(src, opts, diags)
}

/// Same pipeline with diagnostics recorded but not rendered; used by
/// `-verify` runs and the test suite.
pub fn analyze_quiet(
    src: &str,
    filename: &str,
    opts: &LangOptions,
) -> (ASTContext, DiagnosticsEngine) {
    let diags = DiagnosticsEngine::quiet(filename, src);
    run_pipeline(src, opts, diags)
}

fn run_pipeline(
    src: &str,
    opts: &LangOptions,
    mut diags: DiagnosticsEngine,
) -> (ASTContext, DiagnosticsEngine) {
    let tokens = lexer::lex(src, opts);
    let mut ctx = ASTContext::new(opts.clone());
    {
        let mut sema = Sema::new(&mut ctx, &mut diags);
        let mut parser = Parser::new(src, tokens, &mut sema);
        parser.parse_program_units();
    }
    (ctx, diags)
}
