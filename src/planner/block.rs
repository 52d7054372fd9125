use super::Indentation;
use crate::document::DOCUMENT_EXTENSION;
use crate::parser::BindingName;

/// Printed by the injected block once the document has been written.
pub const COMPLETION_SENTINEL: &str = "__INTROSPECT_DONE__";

/// Unindented import placed near the top of the transformed script.
pub const IMPORT_STATEMENT: &str = "import json";

/// The stdout line a child prints when it reaches the end of the injected block.
pub fn sentinel_line(session_id: &str) -> String {
    format!("{COMPLETION_SENTINEL} {session_id}")
}

/// Statements that serialize the recorded structure, before indentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedBlock {
    statements: Vec<String>,
}

impl InjectedBlock {
    pub fn new(binding: &BindingName, session_id: &str) -> Self {
        let b = binding.as_str();
        let sentinel = sentinel_line(session_id);
        let statements = vec![
            "_introspect_spec = {}".to_string(),
            format!(r#"_introspect_spec["inputs"] = {b}.parse_stim_spec"#),
            format!(r#"_introspect_spec["outputs"] = {b}.parse_report_spec"#),
            format!(r#"_introspect_spec["run"] = {b}.parse_run_spec"#),
            format!(
                r#"_introspect_doc = {{"model": {b}.parse_model_spec, "simulation": _introspect_spec}}"#
            ),
            format!(
                r#"with open("{session_id}.{DOCUMENT_EXTENSION}", "w") as _introspect_out: _introspect_out.write(json.dumps(_introspect_doc, sort_keys=True, indent=2, separators=(",", ": ")) + "\n\n\n"); print("{sentinel}")"#
            ),
        ];
        Self { statements }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Render each statement on its own line at the given indentation.
    pub fn render(&self, indent: &Indentation) -> Vec<String> {
        self.statements
            .iter()
            .map(|s| format!("{}{}\n", indent.prefix, s))
            .collect()
    }
}
