use anyhow::{Context, Result};
use structopt::StructOpt;

use ffc::abi::{self, DefaultTargetAbi};
use ffc::cli::Cli;
use ffc::options::LangOptions;

fn main() -> Result<()> {
    env_logger::init();
    let args = Cli::from_args();

    let src = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let filename = args.input.to_string_lossy().to_string();

    let mut opts = LangOptions::for_file(&args.input);
    opts.return_comments = args.return_comments;

    let (ctx, diags) = if args.verify {
        ffc::analyze_quiet(&src, &filename, &opts)
    } else {
        ffc::analyze(&src, &filename, &opts)
    };

    if args.verify {
        let failures = diags.verify_expectations();
        if failures.is_empty() {
            return Ok(());
        }
        for failure in &failures {
            eprintln!("{}: {}", filename, failure);
        }
        std::process::exit(1);
    }

    if !args.fsyntax_only && !diags.had_errors() {
        // Hand the backend what it needs: the translation unit is in `ctx`,
        // and every callable gets an ABI descriptor.
        let descriptors = abi::compute_all(&ctx, &DefaultTargetAbi);
        log::debug!(
            "translation unit analyzed; {} callable descriptor(s) prepared",
            descriptors.len()
        );
        if args.emit_llvm || args.emit_asm || args.compile_only || args.out.is_some() {
            eprintln!(
                "{}: warning: code generation is not available in this build; stopping after semantic analysis",
                filename
            );
        }
    }

    std::process::exit(if diags.had_errors() { 1 } else { 0 });
}
