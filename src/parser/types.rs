/// Lexical category of a token within one physical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Comment,
    Dot,
    Open,
    Close,
    Op,
}

/// One token with its byte offset in the physical line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
}

impl Token {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    pub fn is_code(&self) -> bool {
        self.kind != TokenKind::Comment
    }

    pub fn is_ident(&self, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == name
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    /// Body of a string literal with prefix and quotes removed.
    pub fn string_body(&self) -> Option<&str> {
        if self.kind != TokenKind::Str {
            return None;
        }
        let text = self.text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        let quote = text.chars().next()?;
        let delim = if text.starts_with(&quote.to_string().repeat(3)) {
            3
        } else {
            1
        };
        let body = &text[delim..];
        let closing = quote.to_string().repeat(delim);
        Some(body.strip_suffix(closing.as_str()).unwrap_or(body))
    }
}

/// Tokens of one physical line plus the lexer state at its end.
#[derive(Debug, Clone, Default)]
pub struct LineTokens {
    pub tokens: Vec<Token>,
    /// Bracket depth after the last character of the line.
    pub bracket_depth: u32,
    /// Line ends inside a string literal that continues on the next line.
    pub open_string: bool,
    /// Line ends with an explicit backslash continuation.
    pub continues: bool,
}

impl LineTokens {
    pub fn code_tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(|t| t.is_code())
    }

    /// True when the line carries no code at all (blank or comment only).
    pub fn is_trivia(&self) -> bool {
        self.code_tokens().next().is_none()
    }
}

/// One logical statement spanning one or more physical lines.
#[derive(Debug, Clone)]
pub struct Statement {
    pub phys_start: usize,
    pub phys_end: usize,
    /// Raw leading whitespace of the first physical line.
    pub indent: String,
    pub block_depth: u16,
    pub block_id: Option<u32>,
    /// Statement ends with `:` outside brackets and owns the following block.
    pub opens_block: bool,
}

/// Output of preprocessing: tokens per physical line, statements, and a
/// mapping from physical line to the statement that contains it.
#[derive(Debug)]
pub struct ScriptOutline {
    pub lines: Vec<LineTokens>,
    pub statements: Vec<Statement>,
    pub phys_to_statement: Vec<Option<usize>>,
}

impl ScriptOutline {
    pub fn statement_at(&self, phys: usize) -> Option<&Statement> {
        self.phys_to_statement
            .get(phys)
            .copied()
            .flatten()
            .map(|i| &self.statements[i])
    }

    /// Last physical line of the block owned by the statement at `index`,
    /// or of the statement itself when it opens no block.
    ///
    /// Clauses that continue the same compound statement (`elif`, `else`,
    /// `except`, `finally`) belong to it, bodies included.
    pub fn block_end(&self, index: usize) -> usize {
        let header = &self.statements[index];
        if !header.opens_block {
            return header.phys_end;
        }

        let mut end = header.phys_end;
        let mut rest = self.statements[index + 1..].iter().peekable();
        loop {
            while let Some(s) = rest.next_if(|s| s.block_depth > header.block_depth) {
                end = s.phys_end;
            }
            match rest.next_if(|s| s.block_depth == header.block_depth && self.is_clause(s)) {
                Some(clause) => end = clause.phys_end,
                None => return end,
            }
        }
    }

    fn is_clause(&self, statement: &Statement) -> bool {
        statement.opens_block
            && self.lines[statement.phys_start]
                .code_tokens()
                .next()
                .is_some_and(|t| CLAUSE_KEYWORDS.iter().any(|kw| t.is_ident(kw)))
    }
}

/// Keywords that open a further clause of the preceding compound statement.
const CLAUSE_KEYWORDS: [&str; 4] = ["elif", "else", "except", "finally"];

/// Mutating simulation calls that introspection mode redirects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Neuron,
    Synapse,
    Initialize,
    Stimulus,
    Report,
    WriteToFile,
    Execute,
}

/// What object a call must be made on for a rule to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// The simulation binding itself, e.g. `sim.run(...)`.
    Binding,
    /// Any object; used for report methods called on report handles.
    Any,
}

/// One entry of the rewrite table.
#[derive(Debug, PartialEq, Eq)]
pub struct CallRule {
    pub kind: CallKind,
    pub call: &'static str,
    pub parse: &'static str,
    pub receiver: Receiver,
}

/// Script-local name of the simulation object, possibly dotted (`self.sim`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingName(String);

impl BindingName {
    /// Accepts only non-empty dotted identifier chains.
    pub fn parse(text: &str) -> Option<Self> {
        let valid = !text.is_empty()
            && text.split('.').all(|part| {
                let mut chars = part.chars();
                chars
                    .next()
                    .is_some_and(|c| c == '_' || c.is_alphabetic())
                    && chars.all(|c| c == '_' || c.is_alphanumeric())
            });
        valid.then(|| Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl std::fmt::Display for BindingName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recognised call on one physical line.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub line: usize,
    pub rule: &'static CallRule,
    /// Byte range of the call name within the line.
    pub start: usize,
    pub end: usize,
    pub report_path: Option<String>,
}

/// Classification of one physical line.
#[derive(Debug, Clone)]
pub enum LineKind {
    SimulationBinding(BindingName),
    Call(CallSite),
    Plain,
}
