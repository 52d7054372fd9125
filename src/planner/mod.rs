//! Injection planning: find where the execute call sits, then splice the
//! serialization block and its import into the rewritten script.

mod block;

use tracing::{debug, warn};

use crate::error::{MalformedScript, Result};
use crate::parser::{
    infer_binding, preprocess_lines, rewrite_lines, BindingName, CallKind, CallSite, Rewrite,
    ScriptOutline, Statement, TokenKind,
};

pub use block::{sentinel_line, InjectedBlock, COMPLETION_SENTINEL, IMPORT_STATEMENT};

/// Leading whitespace of the execute statement and its block depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indentation {
    pub prefix: String,
    pub depth: u16,
}

impl Indentation {
    pub fn tab_count(&self) -> usize {
        self.prefix.chars().take_while(|c| *c == '\t').count()
    }
}

/// Where the injected block goes: it starts at `line + 1` of the final sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionPoint {
    pub line: usize,
    pub indent: Indentation,
}

/// Result of transforming a script, ready to be materialized.
#[derive(Debug, Clone)]
pub struct TransformedScript {
    pub session_id: String,
    pub binding: BindingName,
    pub lines: Vec<String>,
    pub insertion: InsertionPoint,
    /// Index of the `import json` line in `lines`.
    pub import_line: usize,
    pub report_paths: Vec<String>,
    pub rewritten_calls: usize,
}

impl TransformedScript {
    pub fn text(&self) -> String {
        self.lines.concat()
    }

    pub fn injected_lines(&self) -> &[String] {
        let start = self.insertion.line + 1;
        let end = (start + InjectedBlock::new(&self.binding, &self.session_id).len())
            .min(self.lines.len());
        &self.lines[start..end]
    }

    pub fn report_path(&self) -> Option<&str> {
        self.report_paths.first().map(String::as_str)
    }
}

/// Locate the execute call and the point after which the block is inserted.
///
/// The block goes after the whole statement holding the call; when that
/// statement opens a block, after the end of its body.
pub fn locate_insertion(
    outline: &ScriptOutline,
    rewrite: &Rewrite,
) -> Result<(usize, InsertionPoint)> {
    let mut executes = rewrite.calls_of(CallKind::Execute);
    let first: &CallSite = executes.next().ok_or(MalformedScript::MissingExecuteCall)?;
    for extra in executes {
        warn!(
            line = extra.line + 1,
            used = first.line + 1,
            "Ignoring additional execution call"
        );
    }

    let index = outline
        .phys_to_statement
        .get(first.line)
        .copied()
        .flatten()
        .ok_or(MalformedScript::MissingExecuteCall)?;
    let statement = &outline.statements[index];
    let after = outline.block_end(index);

    Ok((
        statement.phys_start,
        InsertionPoint {
            line: after,
            indent: Indentation {
                prefix: statement.indent.clone(),
                depth: statement.block_depth,
            },
        },
    ))
}

fn is_encoding_cookie(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with('#') && (t.contains("coding:") || t.contains("coding="))
}

/// First line index at which `import json` can go without displacing the
/// shebang, the encoding cookie, or `from __future__` imports.
pub fn import_position(physical: &[&str], outline: &ScriptOutline) -> usize {
    let mut pos = 0usize;
    if physical.first().is_some_and(|l| l.starts_with("#!")) {
        pos = 1;
    }
    if physical.get(pos).is_some_and(|l| is_encoding_cookie(l)) {
        pos += 1;
    }

    let is_future = |s: &Statement| {
        let mut code = outline.lines[s.phys_start].code_tokens();
        code.next().is_some_and(|t| t.is_ident("from"))
            && code.next().is_some_and(|t| t.is_ident("__future__"))
    };
    let is_docstring = |s: &Statement| {
        (s.phys_start..=s.phys_end)
            .flat_map(|i| outline.lines[i].code_tokens())
            .all(|t| t.kind == TokenKind::Str)
    };

    let mut statements = outline
        .statements
        .iter()
        .filter(|s| s.block_depth == 0)
        .peekable();
    if statements.peek().is_some_and(|s| is_docstring(*s)) {
        statements.next();
    }
    for s in statements {
        if !is_future(s) {
            break;
        }
        pos = pos.max(s.phys_end + 1);
    }
    pos
}

/// Rewrite a script for introspection mode and plan the injected block.
///
/// Fails with `MalformedScript` before producing anything when the script has
/// no simulation construction or no execute call.
pub fn transform_script(source: &str, session_id: &str) -> Result<TransformedScript> {
    let physical: Vec<&str> = source.split_inclusive('\n').collect();
    let outline = preprocess_lines(&physical);

    let binding = infer_binding(&outline)?;
    debug!(binding = %binding, "Inferred simulation binding");

    let rewrite = rewrite_lines(&physical, &outline, &binding);
    let (exec_start, planned) = locate_insertion(&outline, &rewrite)?;
    let import_at = import_position(&physical, &outline).min(exec_start);

    let mut lines = rewrite.lines.clone();
    if let Some(last) = lines.get_mut(planned.line) {
        if !last.ends_with('\n') {
            last.push('\n');
        }
    }
    if import_at > 0 && !lines[import_at - 1].ends_with('\n') {
        lines[import_at - 1].push('\n');
    }

    let block = InjectedBlock::new(&binding, session_id);
    let rendered = block.render(&planned.indent);

    let mut out = Vec::with_capacity(lines.len() + rendered.len() + 1);
    out.extend_from_slice(&lines[..import_at]);
    out.push(format!("{IMPORT_STATEMENT}\n"));
    out.extend_from_slice(&lines[import_at..=planned.line]);
    out.extend(rendered);
    out.extend_from_slice(&lines[planned.line + 1..]);

    let insertion = InsertionPoint {
        line: planned.line + 1,
        indent: planned.indent,
    };
    debug!(
        insertion_line = insertion.line + 1,
        tabs = insertion.indent.tab_count(),
        rewritten = rewrite.calls.len(),
        "Planned injected block"
    );

    Ok(TransformedScript {
        session_id: session_id.to_string(),
        binding,
        lines: out,
        insertion,
        import_line: import_at,
        report_paths: rewrite.report_paths,
        rewritten_calls: rewrite.calls.len(),
    })
}
