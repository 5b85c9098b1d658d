use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use nex::{execute_with_params, Params};

/// Lexer generator with structural regular expression support.
#[derive(Parser, Debug)]
#[command(name = "nex")]
#[command(about = "Generates Rust lexers from nex source files", long_about = None)]
struct Args {
    /// Name prefix to use in generated code
    #[arg(short = 'p', value_name = "PREFIX", default_value = "")]
    prefix: String,

    /// Standalone code; NN_FUN macro substitution, no lex() method
    #[arg(short = 's')]
    standalone: bool,

    /// Custom error func; no error() method
    #[arg(short = 'e')]
    custom_error: bool,

    /// Output file
    #[arg(short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    /// Show NFA graph in DOT format
    #[arg(long, value_name = "PATH")]
    nfadot: Option<PathBuf>,

    /// Show DFA graph in DOT format
    #[arg(long, value_name = "PATH")]
    dfadot: Option<PathBuf>,

    /// Run generated program
    #[arg(short = 'r')]
    run: bool,

    /// Input file (stdin when omitted)
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let params = Params {
        standalone: args.standalone,
        custom_error: args.custom_error,
        custom_prefix: args.prefix,
        input_filename: args.input,
        output_filename: args.output,
        nfa_dot_filename: args.nfadot,
        dfa_dot_filename: args.dfadot,
        run_program: args.run,
    };
    execute_with_params(&params).context("nex")?;
    Ok(())
}
