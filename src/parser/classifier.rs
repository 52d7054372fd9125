use super::types::{
    BindingName, CallKind, CallRule, CallSite, LineKind, LineTokens, Receiver, ScriptOutline,
    Token, TokenKind,
};
use crate::error::MalformedScript;

pub const SIMULATION_MODULE: &str = "ncs";
pub const SIMULATION_CLASS: &str = "Simulation";

/// Rewrite table, in priority order.
pub static REWRITE_RULES: [CallRule; 7] = [
    CallRule {
        kind: CallKind::Neuron,
        call: "addNeuron",
        parse: "parseNeuron",
        receiver: Receiver::Binding,
    },
    CallRule {
        kind: CallKind::Synapse,
        call: "addSynapse",
        parse: "parseSynapse",
        receiver: Receiver::Binding,
    },
    CallRule {
        kind: CallKind::Initialize,
        call: "init",
        parse: "parseInit",
        receiver: Receiver::Binding,
    },
    CallRule {
        kind: CallKind::Stimulus,
        call: "addStimulus",
        parse: "parseStimulus",
        receiver: Receiver::Binding,
    },
    CallRule {
        kind: CallKind::Report,
        call: "addReport",
        parse: "parseReport",
        receiver: Receiver::Binding,
    },
    CallRule {
        kind: CallKind::WriteToFile,
        call: "toAsciiFile",
        parse: "parseToAsciiFile",
        receiver: Receiver::Any,
    },
    CallRule {
        kind: CallKind::Execute,
        call: "run",
        parse: "parseRun",
        receiver: Receiver::Binding,
    },
];

/// Detect `<target> = ncs.Simulation()` among a line's code tokens.
///
/// Returns `None` when the line does not assign the construction expression,
/// and an error when it does but the target is not a usable name.
pub fn find_construction(code: &[&Token]) -> Option<Result<BindingName, MalformedScript>> {
    let k = (1..code.len()).find(|&k| {
        code.len() >= k + 5
            && code[k].is_ident(SIMULATION_MODULE)
            && code[k + 1].kind == TokenKind::Dot
            && code[k + 2].is_ident(SIMULATION_CLASS)
            && code[k + 3].kind == TokenKind::Open
            && code[k + 4].kind == TokenKind::Close
            && code[k - 1].is_op("=")
    })?;
    let eq = k - 1;

    let stripped: String = code[..eq].iter().map(|t| t.text.as_str()).collect();
    let invalid = || Some(Err(MalformedScript::InvalidBinding(stripped.clone())));

    // Walk back over `name(.name)*` ending right before the `=`.
    let mut j = eq;
    let mut parts = Vec::new();
    loop {
        if j == 0 || code[j - 1].kind != TokenKind::Ident {
            return invalid();
        }
        j -= 1;
        parts.push(code[j].text.as_str());
        if j > 0 && code[j - 1].kind == TokenKind::Dot {
            j -= 1;
            continue;
        }
        break;
    }
    if j > 0 && !(code[j - 1].is_op(":") || code[j - 1].is_op(";")) {
        return invalid();
    }

    parts.reverse();
    match BindingName::parse(&parts.join(".")) {
        Some(binding) => Some(Ok(binding)),
        None => invalid(),
    }
}

/// Find the binding name from the first line that constructs the simulation.
pub fn infer_binding(outline: &ScriptOutline) -> Result<BindingName, MalformedScript> {
    outline
        .lines
        .iter()
        .find_map(|line| {
            let code: Vec<&Token> = line.code_tokens().collect();
            find_construction(&code)
        })
        .unwrap_or(Err(MalformedScript::MissingSimulation))
}

fn matches_binding(code: &[&Token], at: usize, parts: &[&str]) -> bool {
    if at > 0 && code[at - 1].kind == TokenKind::Dot {
        return false;
    }
    let mut idx = at;
    for (n, part) in parts.iter().enumerate() {
        if n > 0 {
            if code.get(idx).map(|t| t.kind) != Some(TokenKind::Dot) {
                return false;
            }
            idx += 1;
        }
        if !code.get(idx).is_some_and(|t| t.is_ident(part)) {
            return false;
        }
        idx += 1;
    }
    true
}

/// Locate the call-name token for `rule` among a line's code tokens.
pub fn find_call<'t>(
    code: &[&'t Token],
    rule: &CallRule,
    binding: &BindingName,
) -> Option<&'t Token> {
    match rule.receiver {
        Receiver::Any => code
            .windows(2)
            .find(|w| w[0].kind == TokenKind::Dot && w[1].is_ident(rule.call))
            .map(|w| w[1]),
        Receiver::Binding => {
            let parts: Vec<&str> = binding.parts().collect();
            let width = parts.len() * 2 - 1;
            (0..code.len())
                .filter(|&at| matches_binding(code, at, &parts))
                .find_map(|at| {
                    let dot = code.get(at + width)?;
                    let name = code.get(at + width + 1)?;
                    (dot.kind == TokenKind::Dot && name.is_ident(rule.call)).then_some(*name)
                })
        }
    }
}

/// First string literal on the line, as written between the quotes.
pub fn first_string_literal(line: &LineTokens) -> Option<String> {
    line.code_tokens()
        .find(|t| t.kind == TokenKind::Str)
        .and_then(|t| t.string_body())
        .map(str::to_string)
}

/// Classify one physical line against the rewrite table.
pub fn classify_line(index: usize, line: &LineTokens, binding: &BindingName) -> LineKind {
    let code: Vec<&Token> = line.code_tokens().collect();

    // Calls win over the construction so `sim = ncs.Simulation(); sim.run()`
    // still gets rewritten.
    for rule in REWRITE_RULES.iter() {
        if let Some(token) = find_call(&code, rule, binding) {
            let report_path = match rule.kind {
                CallKind::WriteToFile => first_string_literal(line),
                _ => None,
            };
            return LineKind::Call(CallSite {
                line: index,
                rule,
                start: token.start,
                end: token.end(),
                report_path,
            });
        }
    }

    match find_construction(&code) {
        Some(Ok(found)) => LineKind::SimulationBinding(found),
        _ => LineKind::Plain,
    }
}
