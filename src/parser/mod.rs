mod classifier;
mod lexer;
mod preprocessor;
mod rewriter;
mod types;

pub use classifier::{
    classify_line, find_call, first_string_literal, infer_binding, REWRITE_RULES,
    SIMULATION_CLASS, SIMULATION_MODULE,
};
pub use lexer::{tokenize_line, LexState};
pub use preprocessor::preprocess_lines;
pub use rewriter::{rewrite_line, rewrite_lines, Rewrite};
pub use types::{
    BindingName, CallKind, CallRule, CallSite, LineKind, LineTokens, Receiver, ScriptOutline,
    Statement, Token, TokenKind,
};
