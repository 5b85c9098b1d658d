//! Orchestration for the `nex` binary: read the source, dump DOT graphs,
//! write the generated program, and optionally compile and run it.

use std::fs;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::parser::parse_nex;
use crate::writer::LexerBuilder;
use crate::NexError;

/// Everything the CLI surface controls.
#[derive(Debug, Default)]
pub struct Params {
    pub standalone: bool,
    pub custom_error: bool,
    pub custom_prefix: String,
    /// Input file; stdin when absent.
    pub input_filename: Option<PathBuf>,
    /// Output file; defaults to `INPUT.nn.rs` when an input file is given.
    pub output_filename: Option<PathBuf>,
    pub nfa_dot_filename: Option<PathBuf>,
    pub dfa_dot_filename: Option<PathBuf>,
    /// Compile the generated program with rustc and run it.
    pub run_program: bool,
}

pub fn execute_with_params(p: &Params) -> Result<(), NexError> {
    let source = match &p.input_filename {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut s = String::new();
            std::io::stdin().read_to_string(&mut s)?;
            s
        }
    };
    let program = parse_nex(&source)?;

    if let Some(path) = &p.nfa_dot_filename {
        let mut dot = String::new();
        program.write_nfa_dot(&mut dot);
        fs::write(path, dot)?;
    }
    if let Some(path) = &p.dfa_dot_filename {
        let mut dot = String::new();
        program.write_dfa_dot(&mut dot);
        fs::write(path, dot)?;
    }

    let mut tmpdir: Option<PathBuf> = None;
    let mut output = p.output_filename.clone();
    if p.run_program && output.is_none() {
        let dir = std::env::temp_dir().join(format!("nex-{}", std::process::id()));
        fs::create_dir_all(&dir)?;
        output = Some(dir.join("lets.rs"));
        tmpdir = Some(dir);
    }
    if output.is_none() {
        if let Some(input) = &p.input_filename {
            output = Some(input.with_extension("nn.rs"));
        }
    }
    let Some(output) = output else {
        // DOT-only invocation from stdin.
        return Ok(());
    };

    let builder = LexerBuilder {
        standalone: p.standalone,
        custom_error: p.custom_error,
        custom_prefix: p.custom_prefix.clone(),
    };
    fs::write(&output, builder.dump_lexer(&program))?;

    let result = if p.run_program {
        run_generated(&output)
    } else {
        Ok(())
    };
    if let Some(dir) = tmpdir {
        let _ = fs::remove_dir_all(dir);
    }
    result
}

/// `rustc -O` the generated file into a sibling binary and run it with
/// inherited stdio, mirroring the original's compile-and-run flag.
fn run_generated(source: &Path) -> Result<(), NexError> {
    let exe = source.with_extension("bin");
    let status = Command::new("rustc")
        .args(["--edition", "2021", "-O"])
        .arg(source)
        .arg("-o")
        .arg(&exe)
        .status()?;
    if !status.success() {
        return Err(NexError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "rustc failed on generated program",
        )));
    }
    let status = Command::new(&exe).status()?;
    if !status.success() {
        return Err(NexError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("generated program exited with {status}"),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_default_output_name() {
        let dir = std::env::temp_dir().join(format!("nex-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let input = dir.join("sample.nex");
        fs::write(&input, "/a/ { hit() }\n//\nfn main() {}\n").unwrap();

        let params = Params {
            input_filename: Some(input.clone()),
            ..Default::default()
        };
        execute_with_params(&params).unwrap();

        let output = dir.join("sample.nn.rs");
        let generated = fs::read_to_string(&output).unwrap();
        assert!(generated.contains("DO NOT EDIT"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_writes_dot_files() {
        let dir = std::env::temp_dir().join(format!("nex-dot-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let input = dir.join("sample.nex");
        fs::write(&input, "/ab/ { hit() }\n//\nfn main() {}\n").unwrap();
        let nfa = dir.join("nfa.dot");
        let dfa = dir.join("dfa.dot");

        let params = Params {
            input_filename: Some(input),
            output_filename: Some(dir.join("out.rs")),
            nfa_dot_filename: Some(nfa.clone()),
            dfa_dot_filename: Some(dfa.clone()),
            ..Default::default()
        };
        execute_with_params(&params).unwrap();

        assert!(fs::read_to_string(nfa).unwrap().contains("digraph NFA_0"));
        assert!(fs::read_to_string(dfa).unwrap().contains("digraph DFA_0"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_parse_error_surfaces_position() {
        let dir = std::env::temp_dir().join(format!("nex-err-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let input = dir.join("bad.nex");
        fs::write(&input, "/a\nb/ x\n//\nmain\n").unwrap();

        let params = Params {
            input_filename: Some(input),
            ..Default::default()
        };
        let err = execute_with_params(&params).unwrap_err();
        assert!(err.to_string().contains("unexpected newline"));
        let _ = fs::remove_dir_all(dir);
    }
}
