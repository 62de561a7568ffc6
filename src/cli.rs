use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "ffc",
    about = "Fortran front end (parser and semantic analyzer) written in Rust"
)]
pub struct Cli {
    /// Input source file.
    pub input: PathBuf,

    #[structopt(
        short = "I",
        number_of_values = 1,
        help = "Directory of include files"
    )]
    pub include_dirs: Vec<PathBuf>,

    #[structopt(short = "C", help = "Do not discard comments")]
    pub return_comments: bool,

    #[structopt(long = "verify", help = "Check expected-diagnostic annotations")]
    pub verify: bool,

    #[structopt(long = "fsyntax-only", help = "Stop after semantic analysis")]
    pub fsyntax_only: bool,

    #[structopt(long = "emit-llvm", help = "Emit LLVM IR (requires a backend)")]
    pub emit_llvm: bool,

    #[structopt(short = "S", help = "Emit assembly (requires a backend)")]
    pub emit_asm: bool,

    #[structopt(short = "o", help = "Output file path")]
    pub out: Option<PathBuf>,

    #[structopt(short = "g", help = "Emit debug information")]
    pub debug_info: bool,

    #[structopt(short = "c", help = "Compile only, do not link")]
    pub compile_only: bool,

    #[structopt(short = "L", number_of_values = 1, help = "Library search path")]
    pub lib_dirs: Vec<PathBuf>,

    #[structopt(short = "l", number_of_values = 1, help = "Library to link")]
    pub libs: Vec<String>,
}
