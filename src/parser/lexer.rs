use super::types::{LineTokens, Token, TokenKind};

/// Lexer state carried from one physical line to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LexState {
    #[default]
    Code,
    InString { quote: char, triple: bool },
}

const TWO_CHAR_OPS: [&str; 19] = [
    "==", "!=", "<=", ">=", "->", "**", "//", "<<", ">>", ":=", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "@=",
];

enum StringEnd {
    Closed(usize),
    /// Ran off the end of the line and continues on the next one.
    Open,
    /// Unterminated single-quoted string; Python would reject it.
    Broken(usize),
}

fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch.is_alphabetic()
}

fn is_ident_char(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

fn is_string_prefix(ident: &str) -> bool {
    ident.len() <= 2 && ident.chars().all(|c| "rRbBuUfF".contains(c))
}

fn scan_string(chars: &[(usize, char)], mut j: usize, quote: char, triple: bool) -> StringEnd {
    while j < chars.len() {
        let ch = chars[j].1;
        if ch == '\\' {
            j += match chars.get(j + 1).map(|c| c.1) {
                Some('\r') if chars.get(j + 2).map(|c| c.1) == Some('\n') => 3,
                _ => 2,
            };
            continue;
        }
        if ch == quote {
            if !triple {
                return StringEnd::Closed(j + 1);
            }
            if chars.get(j + 1).map(|c| c.1) == Some(quote)
                && chars.get(j + 2).map(|c| c.1) == Some(quote)
            {
                return StringEnd::Closed(j + 3);
            }
        }
        if !triple && (ch == '\n' || ch == '\r') {
            return StringEnd::Broken(j);
        }
        j += 1;
    }

    if triple {
        StringEnd::Open
    } else {
        // Only an escaped line break lets a single-quoted string run off the end.
        let ends_escaped = chars
            .iter()
            .rev()
            .map(|c| c.1)
            .skip_while(|c| *c == '\n' || *c == '\r')
            .take_while(|c| *c == '\\')
            .count();
        if ends_escaped % 2 == 1 {
            StringEnd::Open
        } else {
            StringEnd::Broken(chars.len())
        }
    }
}

fn byte_at(line: &str, chars: &[(usize, char)], idx: usize) -> usize {
    chars.get(idx).map(|c| c.0).unwrap_or(line.len())
}

fn push(tokens: &mut Vec<Token>, kind: TokenKind, line: &str, start: usize, end: usize) {
    let text = line[start..end].trim_end_matches(['\r', '\n']);
    tokens.push(Token {
        kind,
        text: text.to_string(),
        start,
    });
}

/// Tokenize one physical line of script text.
///
/// `state` and `depth` carry open strings and open brackets across lines and
/// are updated in place.
pub fn tokenize_line(line: &str, state: &mut LexState, depth: &mut u32) -> LineTokens {
    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let mut tokens = Vec::new();
    let mut continues = false;
    let mut i = 0usize;

    if let LexState::InString { quote, triple } = *state {
        match scan_string(&chars, 0, quote, triple) {
            StringEnd::Closed(end) => {
                push(&mut tokens, TokenKind::Str, line, 0, byte_at(line, &chars, end));
                *state = LexState::Code;
                i = end;
            }
            StringEnd::Open => {
                push(&mut tokens, TokenKind::Str, line, 0, line.len());
                return LineTokens {
                    tokens,
                    bracket_depth: *depth,
                    open_string: true,
                    continues: false,
                };
            }
            StringEnd::Broken(end) => {
                push(&mut tokens, TokenKind::Str, line, 0, byte_at(line, &chars, end));
                *state = LexState::Code;
                i = end;
            }
        }
    }

    while i < chars.len() {
        let (start, ch) = chars[i];

        if ch == '\\' && line[start + 1..].trim().is_empty() {
            continues = true;
            break;
        }

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        if ch == '#' {
            push(&mut tokens, TokenKind::Comment, line, start, line.len());
            break;
        }

        let mut string_start = None;
        if ch == '"' || ch == '\'' {
            string_start = Some(i);
        } else if is_ident_start(ch) {
            let mut j = i + 1;
            while j < chars.len() && is_ident_char(chars[j].1) {
                j += 1;
            }
            let end = byte_at(line, &chars, j);
            let ident = &line[start..end];
            let next = chars.get(j).map(|c| c.1);
            if is_string_prefix(ident) && matches!(next, Some('"') | Some('\'')) {
                string_start = Some(j);
            } else {
                push(&mut tokens, TokenKind::Ident, line, start, end);
                i = j;
                continue;
            }
        }

        if let Some(q) = string_start {
            let quote = chars[q].1;
            let triple = chars.get(q + 1).map(|c| c.1) == Some(quote)
                && chars.get(q + 2).map(|c| c.1) == Some(quote);
            let body = if triple { q + 3 } else { q + 1 };
            match scan_string(&chars, body, quote, triple) {
                StringEnd::Closed(end) | StringEnd::Broken(end) => {
                    push(&mut tokens, TokenKind::Str, line, start, byte_at(line, &chars, end));
                    i = end;
                }
                StringEnd::Open => {
                    push(&mut tokens, TokenKind::Str, line, start, line.len());
                    *state = LexState::InString { quote, triple };
                    return LineTokens {
                        tokens,
                        bracket_depth: *depth,
                        open_string: true,
                        continues: false,
                    };
                }
            }
            continue;
        }

        let next = chars.get(i + 1).map(|c| c.1);
        if ch.is_ascii_digit() || (ch == '.' && next.is_some_and(|c| c.is_ascii_digit())) {
            let mut j = i + 1;
            while j < chars.len() && (is_ident_char(chars[j].1) || chars[j].1 == '.') {
                j += 1;
            }
            push(&mut tokens, TokenKind::Number, line, start, byte_at(line, &chars, j));
            i = j;
            continue;
        }

        let end = byte_at(line, &chars, i + 1);
        match ch {
            '.' => push(&mut tokens, TokenKind::Dot, line, start, end),
            '(' | '[' | '{' => {
                *depth += 1;
                push(&mut tokens, TokenKind::Open, line, start, end);
            }
            ')' | ']' | '}' => {
                *depth = depth.saturating_sub(1);
                push(&mut tokens, TokenKind::Close, line, start, end);
            }
            _ => {
                let pair_end = byte_at(line, &chars, i + 2);
                if i + 1 < chars.len() && TWO_CHAR_OPS.contains(&&line[start..pair_end]) {
                    push(&mut tokens, TokenKind::Op, line, start, pair_end);
                    i += 2;
                    continue;
                }
                push(&mut tokens, TokenKind::Op, line, start, end);
            }
        }
        i += 1;
    }

    LineTokens {
        tokens,
        bracket_depth: *depth,
        open_string: false,
        continues,
    }
}
