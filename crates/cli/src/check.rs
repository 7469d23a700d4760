// ==============================================================================
// `flowsolve check`
// ==============================================================================
//
// Runs one script through one context, prints what the solver learned about
// each variable and renders the diagnostics.

use std::path::{Path, PathBuf};

use lang_check::{CheckCtx, DiagnosticKind, VarState};
use miette::Diagnostic;
use thiserror::Error;

use crate::config;
use crate::script::{Script, ScriptRun};

#[derive(Error, Diagnostic, Debug)]
#[error("could not read {}", path.display())]
#[diagnostic(code(flowsolve::io))]
pub struct ReadError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

/// A solver diagnostic prepared for miette. Failed overload candidates are
/// attached as related reports.
#[derive(Error, Diagnostic, Debug)]
#[error("{message}")]
struct Reported {
    message: String,
    #[help]
    help: Option<String>,
    #[related]
    branches: Vec<Reported>,
}

impl From<&lang_check::Diagnostic> for Reported {
    fn from(d: &lang_check::Diagnostic) -> Self {
        let branches = match &d.kind {
            DiagnosticKind::SpeculationExhausted { branches } => branches
                .iter()
                .enumerate()
                .filter_map(|(index, branch)| {
                    let first = branch.first()?;
                    let mut reported = Reported::from(first);
                    reported.message = format!("candidate {index}: {}", reported.message);
                    Some(reported)
                })
                .collect(),
            _ => Vec::new(),
        };
        Reported {
            message: format!("[{}] {d}", d.kind.name()),
            help: Some(format!("while checking {}", d.blame)),
            branches,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Summary {
    pub steps: usize,
    pub diagnostics: usize,
}

/// Entry point for `flowsolve check`.
pub fn run_check(
    script_path: &Path,
    config_path: Option<&Path>,
    max_depth: Option<u32>,
    quiet: bool,
) -> miette::Result<Summary> {
    let source = std::fs::read_to_string(script_path).map_err(|source| ReadError {
        path: script_path.to_path_buf(),
        source,
    })?;
    let script = Script::parse(&source)?;

    let mut solver_config = config::resolve_config(config_path, script_path)?;
    if let Some(depth) = max_depth {
        solver_config = solver_config.with_max_depth(depth);
    }
    log::debug!("solver configuration: {solver_config:?}");

    let mut cx = CheckCtx::new(solver_config);
    let vars = {
        let mut run = ScriptRun::new(&mut cx, &script);
        run.run(&script)?;
        run.vars().to_vec()
    };
    cx.finalize();

    if !quiet {
        for var in &vars {
            match cx.var_state(*var) {
                VarState::Resolved(term) | VarState::FullyResolved(term) => {
                    println!("{var:?} = {term}");
                }
                VarState::Unresolved(_) => {
                    println!("{var:?} :> {}", cx.resolve_to_term(*var));
                }
            }
        }
    }

    let diagnostics = cx.take_diagnostics();
    for diagnostic in &diagnostics {
        eprintln!("{:?}", miette::Report::new(Reported::from(diagnostic)));
    }

    let summary = Summary {
        steps: script.steps.len(),
        diagnostics: diagnostics.len(),
    };
    eprintln!(
        "\nChecked {} steps: {} diagnostics",
        summary.steps, summary.diagnostics
    );
    log::info!("solver stats: {:?}", cx.stats());
    Ok(summary)
}
