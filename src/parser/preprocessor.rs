use super::lexer::{tokenize_line, LexState};
use super::types::{LineTokens, ScriptOutline, Statement};

/// One physical→logical joined statement (before block annotation).
#[derive(Debug, Clone)]
pub struct JoinedStatement {
    pub phys_start: usize,
    pub phys_end: usize,
    pub indent: String,
    pub opens_block: bool,
}

/// Tokenize every physical line, carrying string and bracket state across lines.
pub fn tokenize_lines(physical: &[&str]) -> Vec<LineTokens> {
    let mut state = LexState::Code;
    let mut depth = 0u32;
    physical
        .iter()
        .map(|line| tokenize_line(line, &mut state, &mut depth))
        .collect()
}

fn leading_whitespace(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t', '\x0c']);
    &line[..line.len() - trimmed.len()]
}

/// Join physical lines that belong to the same statement: open brackets,
/// backslash continuations and strings spanning lines.
pub fn join_statements(physical: &[&str], lines: &[LineTokens]) -> Vec<JoinedStatement> {
    let mut out = Vec::new();
    let mut i = 0usize;

    while i < lines.len() {
        if lines[i].is_trivia() && !lines[i].open_string && !lines[i].continues {
            i += 1;
            continue;
        }

        let start = i;
        while i + 1 < lines.len()
            && (lines[i].bracket_depth > 0 || lines[i].continues || lines[i].open_string)
        {
            i += 1;
        }

        let last_code = lines[start..=i]
            .iter()
            .rev()
            .flat_map(|l| l.code_tokens().last())
            .next();
        let opens_block = lines[i].bracket_depth == 0 && last_code.is_some_and(|t| t.is_op(":"));

        out.push(JoinedStatement {
            phys_start: start,
            phys_end: i,
            indent: leading_whitespace(physical[start]).to_string(),
            opens_block,
        });
        i += 1;
    }

    out
}

/// Annotate joined statements with indentation block depth and block id.
pub fn annotate_blocks(joined: Vec<JoinedStatement>) -> Vec<Statement> {
    let mut statements = Vec::with_capacity(joined.len());

    // Indentation widths of the enclosing blocks, paired with their ids.
    let mut stack: Vec<(usize, Option<u32>)> = vec![(0, None)];
    let mut next_block_id: u32 = 1;
    let mut pending_block = false;

    for j in joined {
        let width = j.indent.chars().count();

        if pending_block && width > stack.last().map(|s| s.0).unwrap_or(0) {
            stack.push((width, Some(next_block_id)));
            next_block_id += 1;
        } else {
            while stack.len() > 1 && stack.last().is_some_and(|s| s.0 > width) {
                stack.pop();
            }
        }

        let block_id = stack.last().and_then(|s| s.1);
        statements.push(Statement {
            phys_start: j.phys_start,
            phys_end: j.phys_end,
            indent: j.indent,
            block_depth: (stack.len() - 1) as u16,
            block_id,
            opens_block: j.opens_block,
        });
        pending_block = j.opens_block;
    }

    statements
}

/// Full preprocessing pipeline
pub fn preprocess_lines(physical: &[&str]) -> ScriptOutline {
    let lines = tokenize_lines(physical);
    let joined = join_statements(physical, &lines);
    let statements = annotate_blocks(joined);

    let mut phys_to_statement = vec![None; physical.len()];
    for (si, s) in statements.iter().enumerate() {
        for slot in &mut phys_to_statement[s.phys_start..=s.phys_end] {
            *slot = Some(si);
        }
    }

    ScriptOutline {
        lines,
        statements,
        phys_to_statement,
    }
}
