use tracing::debug;

use super::classifier::classify_line;
use super::types::{BindingName, CallKind, CallSite, LineKind, ScriptOutline};

/// Rewritten line sequence plus what was found while rewriting.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub lines: Vec<String>,
    pub calls: Vec<CallSite>,
    pub report_paths: Vec<String>,
}

impl Rewrite {
    pub fn calls_of(&self, kind: CallKind) -> impl Iterator<Item = &CallSite> {
        self.calls.iter().filter(move |c| c.rule.kind == kind)
    }

    /// Path of the first file-writing report call, if any.
    pub fn report_path(&self) -> Option<&str> {
        self.report_paths.first().map(String::as_str)
    }
}

/// Replace only the call name of a recognised call, keeping the rest of the line.
pub fn rewrite_line(line: &str, site: &CallSite) -> String {
    let mut out = String::with_capacity(line.len() + site.rule.parse.len());
    out.push_str(&line[..site.start]);
    out.push_str(site.rule.parse);
    out.push_str(&line[site.end..]);
    out
}

/// Single pass over the physical lines: at most one rewrite per line, first
/// matching rule wins, every other line is copied unchanged.
pub fn rewrite_lines(
    physical: &[&str],
    outline: &ScriptOutline,
    binding: &BindingName,
) -> Rewrite {
    let mut lines = Vec::with_capacity(physical.len());
    let mut calls = Vec::new();
    let mut report_paths = Vec::new();

    for (i, (line, tokens)) in physical.iter().zip(&outline.lines).enumerate() {
        match classify_line(i, tokens, binding) {
            LineKind::Call(site) => {
                debug!(
                    line = i + 1,
                    call = site.rule.call,
                    parse = site.rule.parse,
                    "Rewriting call"
                );
                lines.push(rewrite_line(line, &site));
                if let Some(path) = &site.report_path {
                    report_paths.push(path.clone());
                }
                calls.push(site);
            }
            LineKind::SimulationBinding(_) | LineKind::Plain => lines.push(line.to_string()),
        }
    }

    Rewrite {
        lines,
        calls,
        report_paths,
    }
}
