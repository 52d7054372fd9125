use sim_introspect::parser::{preprocess_lines, rewrite_lines, BindingName, CallKind};
use sim_introspect::planner::{sentinel_line, transform_script, IMPORT_STATEMENT};
use sim_introspect::{IntrospectError, MalformedScript};

const SESSION: &str = "0b5e7c2a-test";

const IZH_SCRIPT: &str = r#"#!/usr/bin/python
import sys
import ncs

def run(argv):
    sim = ncs.Simulation()
    excitatory = sim.addNeuron("label_excitatory", "izhikevich", {"a": 0.02})
    group_1 = sim.addNeuron("group_1", excitatory, 100)
    connection = sim.addSynapse("1->1", group_1, group_1, 0.1, "flat")
    if not sim.init(argv):
        print("failed to initialize simulation.")
        return
    sim.addStimulus("rectangular_current", {"amplitude": 10.0}, group_1, 1.0, 0.0, 1.0)
    voltage_report = sim.addReport(group_1, "neuron", "neuron_voltage", 1.0, 0.0, 1.0)
    voltage_report.toAsciiFile("./regular_spiking_izh.txt")
    sim.run(duration=1.0)
    return

if __name__ == "__main__":
    run(sys.argv)
"#;

// Helper to transform with the shared session id
fn transform(source: &str) -> sim_introspect::Result<sim_introspect::planner::TransformedScript> {
    transform_script(source, SESSION)
}

// Helper to pull the malformed-script reason out of a result
fn malformed(source: &str) -> MalformedScript {
    match transform(source) {
        Err(IntrospectError::MalformedScript(reason)) => reason,
        other => panic!("expected a malformed script, got {:?}", other.map(|t| t.text())),
    }
}

#[cfg(test)]
mod rewrite_tests {
    use super::*;

    #[test]
    fn test_every_call_kind_is_rewritten() {
        let t = transform(IZH_SCRIPT).expect("script should transform");
        let text = t.text();

        for expected in [
            r#"sim.parseNeuron("label_excitatory""#,
            r#"sim.parseNeuron("group_1""#,
            r#"sim.parseSynapse("1->1""#,
            "sim.parseInit(argv)",
            r#"sim.parseStimulus("rectangular_current""#,
            "sim.parseReport(group_1",
            r#"voltage_report.parseToAsciiFile("./regular_spiking_izh.txt")"#,
            "sim.parseRun(duration=1.0)",
        ] {
            assert!(text.contains(expected), "missing `{}` in:\n{}", expected, text);
        }
        for call in ["addNeuron", "addSynapse", "sim.init(", "addStimulus", "addReport"] {
            assert!(!text.contains(call), "`{}` survived rewriting", call);
        }
        assert_eq!(t.rewritten_calls, 8);
    }

    #[test]
    fn test_binding_and_report_path() {
        let t = transform(IZH_SCRIPT).unwrap();
        assert_eq!(t.binding.as_str(), "sim");
        assert_eq!(t.report_path(), Some("./regular_spiking_izh.txt"));
        assert_eq!(t.report_paths.len(), 1);
    }

    #[test]
    fn test_functions_named_like_calls_are_left_alone() {
        let t = transform(IZH_SCRIPT).unwrap();
        let text = t.text();
        assert!(text.contains("def run(argv):\n"));
        assert!(text.contains("    run(sys.argv)\n"));
    }

    #[test]
    fn test_unmatched_lines_are_preserved_in_order() {
        let t = transform(IZH_SCRIPT).unwrap();
        let injected: Vec<&String> = t.injected_lines().iter().collect();

        let kept: Vec<&str> = t
            .lines
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != t.import_line)
            .filter(|(_, l)| !injected.contains(l))
            .map(|(_, l)| l.as_str())
            .collect();
        let source: Vec<&str> = IZH_SCRIPT.split_inclusive('\n').collect();
        assert_eq!(kept.len(), source.len());

        for (before, after) in source.iter().zip(&kept) {
            let changed = ["sim.", "voltage_report.toAsciiFile"]
                .iter()
                .any(|needle| before.contains(needle) && !before.contains("ncs.Simulation"));
            if !changed {
                assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn test_comments_and_strings_are_not_rewritten() {
        let source = r#"import ncs
sim = ncs.Simulation()
# sim.run(duration=5)
print("sim.addNeuron('fake')")
note = 'call sim.run() later'  # sim.init()
sim.run(duration=1)
"#;
        let t = transform(source).unwrap();
        let text = t.text();
        assert!(text.contains("# sim.run(duration=5)\n"));
        assert!(text.contains(r#"print("sim.addNeuron('fake')")"#));
        assert!(text.contains("note = 'call sim.run() later'  # sim.init()\n"));
        assert!(text.contains("sim.parseRun(duration=1)\n"));
        assert_eq!(t.rewritten_calls, 1);
    }

    #[test]
    fn test_calls_on_other_objects_are_not_rewritten() {
        let source = "import ncs\nsim = ncs.Simulation()\nmysim.run()\nself.sim.addNeuron(1)\nsim.run()\n";
        let text = transform(source).unwrap().text();
        assert!(text.contains("mysim.run()\n"));
        assert!(text.contains("self.sim.addNeuron(1)\n"));
        assert!(text.contains("sim.parseRun()\n"));
    }

    #[test]
    fn test_execute_on_construction_line() {
        let source = "import ncs\nsim = ncs.Simulation(); sim.run(duration=1)\n";
        let t = transform(source).unwrap();
        assert_eq!(t.binding.as_str(), "sim");
        assert_eq!(
            t.lines[t.insertion.line],
            "sim = ncs.Simulation(); sim.parseRun(duration=1)\n"
        );
        assert_eq!(t.injected_lines()[0], "_introspect_spec = {}\n");
    }

    #[test]
    fn test_every_report_path_is_recorded() {
        let source = r#"import ncs
sim = ncs.Simulation()
a = sim.addReport("g", "neuron", "v", 1.0, 0.0, 1.0)
a.toAsciiFile("first.txt")
b = sim.addReport("g", "neuron", "i", 1.0, 0.0, 1.0)
b.toAsciiFile('second.txt')
sim.run(duration=1)
"#;
        let t = transform(source).unwrap();
        assert_eq!(t.report_paths, vec!["first.txt", "second.txt"]);
        assert_eq!(t.report_path(), Some("first.txt"));
    }

    #[test]
    fn test_rewrite_lines_records_call_sites() {
        let source = "import ncs\nsim = ncs.Simulation()\nsim.init([])\nsim.run()\n";
        let physical: Vec<&str> = source.split_inclusive('\n').collect();
        let outline = preprocess_lines(&physical);
        let binding = BindingName::parse("sim").unwrap();

        let rewrite = rewrite_lines(&physical, &outline, &binding);
        assert_eq!(rewrite.lines.len(), physical.len());
        assert_eq!(rewrite.calls.len(), 2);
        assert_eq!(rewrite.calls_of(CallKind::Initialize).count(), 1);
        let run = rewrite.calls_of(CallKind::Execute).next().unwrap();
        assert_eq!(run.line, 3);
        assert_eq!(&physical[3][run.start..run.end], "run");
    }
}

#[cfg(test)]
mod binding_tests {
    use super::*;

    #[test]
    fn test_missing_simulation() {
        let source = "import ncs\nsim = ncs.Other()\nsim.run()\n";
        assert_eq!(malformed(source), MalformedScript::MissingSimulation);
    }

    #[test]
    fn test_construction_in_comment_does_not_count() {
        let source = "import ncs\n# sim = ncs.Simulation()\nsim.run()\n";
        assert_eq!(malformed(source), MalformedScript::MissingSimulation);
    }

    #[test]
    fn test_subscript_binding_is_invalid() {
        let source = "import ncs\nsims[0] = ncs.Simulation()\nsims[0].run()\n";
        assert_eq!(
            malformed(source),
            MalformedScript::InvalidBinding("sims[0]".to_string())
        );
    }

    #[test]
    fn test_tuple_binding_is_invalid() {
        let source = "import ncs\na, b = ncs.Simulation()\nb.run()\n";
        assert!(matches!(malformed(source), MalformedScript::InvalidBinding(_)));
    }

    #[test]
    fn test_missing_execute_call() {
        let source = "import ncs\nsim = ncs.Simulation()\nsim.init([])\n";
        assert_eq!(malformed(source), MalformedScript::MissingExecuteCall);
    }

    #[test]
    fn test_dotted_binding() {
        let source = r#"import ncs

class Experiment(object):
    def __init__(self):
        self.sim = ncs.Simulation()

    def go(self):
        self.sim.addNeuron("n", "izhikevich", {})
        self.sim.run(duration=2)
"#;
        let t = transform(source).unwrap();
        assert_eq!(t.binding.as_str(), "self.sim");
        let text = t.text();
        assert!(text.contains(r#"self.sim.parseNeuron("n""#));
        assert!(text.contains("self.sim.parseRun(duration=2)\n"));
        assert!(t.injected_lines()[1].contains("self.sim.parse_stim_spec"));
    }

    #[test]
    fn test_first_construction_wins() {
        let source = "import ncs\nfirst = ncs.Simulation()\nsecond = ncs.Simulation()\nfirst.run()\nsecond.run()\n";
        let t = transform(source).unwrap();
        assert_eq!(t.binding.as_str(), "first");
        assert!(t.text().contains("second.run()\n"));
    }

    #[test]
    fn test_binding_name_validation() {
        assert!(BindingName::parse("sim").is_some());
        assert!(BindingName::parse("self.sim_2").is_some());
        assert!(BindingName::parse("").is_none());
        assert!(BindingName::parse("2sim").is_none());
        assert!(BindingName::parse("a..b").is_none());
        assert!(BindingName::parse("sims[0]").is_none());
    }
}

#[cfg(test)]
mod insertion_tests {
    use super::*;

    #[test]
    fn test_import_goes_after_shebang() {
        let t = transform(IZH_SCRIPT).unwrap();
        assert_eq!(t.lines[0], "#!/usr/bin/python\n");
        assert_eq!(t.import_line, 1);
        assert_eq!(t.lines[1], format!("{IMPORT_STATEMENT}\n"));
    }

    #[test]
    fn test_import_skips_docstring_and_future_imports() {
        let source = r#""""Regular spiking demo."""
from __future__ import print_function
import ncs
sim = ncs.Simulation()
sim.run()
"#;
        let t = transform(source).unwrap();
        assert_eq!(t.import_line, 2);
        assert_eq!(t.lines[2], "import json\n");
        assert_eq!(t.lines[1], "from __future__ import print_function\n");
    }

    #[test]
    fn test_block_follows_execute_at_same_indent() {
        let t = transform(IZH_SCRIPT).unwrap();
        assert!(t.lines[t.insertion.line].contains("sim.parseRun(duration=1.0)"));
        assert_eq!(t.insertion.indent.prefix, "    ");
        assert_eq!(t.insertion.indent.depth, 1);

        let injected = t.injected_lines();
        assert_eq!(injected.len(), 6);
        assert!(injected.iter().all(|l| l.starts_with("    _introspect_")
            || l.starts_with("    with open(")));
        assert_eq!(injected[0], "    _introspect_spec = {}\n");
        assert!(injected[4].contains("sim.parse_model_spec"));
        assert!(injected[5].contains(&format!("\"{SESSION}.json\"")));
        assert!(injected[5].contains(&sentinel_line(SESSION)));
        assert_eq!(t.lines[t.insertion.line + 7], "    return\n");
    }

    #[test]
    fn test_multiline_execute_call() {
        let source = "import ncs\nsim = ncs.Simulation()\nsim.run(duration=1.0,\n        interactive=False)\nprint('after')\n";
        let t = transform(source).unwrap();
        assert_eq!(t.lines[t.insertion.line], "        interactive=False)\n");
        assert_eq!(t.injected_lines()[0], "_introspect_spec = {}\n");
        assert_eq!(t.lines.last().unwrap(), "print('after')\n");
    }

    #[test]
    fn test_execute_in_compound_header() {
        let source = "import ncs\nsim = ncs.Simulation()\nif sim.run(duration=1):\n    print('done')\nprint('after')\n";
        let t = transform(source).unwrap();
        assert!(t.text().contains("if sim.parseRun(duration=1):\n"));
        assert_eq!(t.lines[t.insertion.line], "    print('done')\n");
        assert_eq!(t.injected_lines()[0], "_introspect_spec = {}\n");
    }

    #[test]
    fn test_execute_in_header_with_else_clause() {
        let source = "import ncs\nsim = ncs.Simulation()\nif sim.run(duration=1):\n    print('ok')\nelse:\n    print('bad')\nprint('after')\n";
        let t = transform(source).unwrap();
        assert_eq!(t.lines[t.insertion.line], "    print('bad')\n");
        assert_eq!(t.lines[t.insertion.line - 1], "else:\n");
        assert_eq!(t.injected_lines()[0], "_introspect_spec = {}\n");
        assert_eq!(t.lines.last().unwrap(), "print('after')\n");
    }

    #[test]
    fn test_execute_in_header_with_elif_chain() {
        let source = r#"import ncs
def main():
    sim = ncs.Simulation()
    if not sim.run(duration=1):
        print("failed")
    elif sim.init([]):
        print("odd")
    else:
        pass
    return
"#;
        let t = transform(source).unwrap();
        assert_eq!(t.lines[t.insertion.line], "        pass\n");
        assert_eq!(t.insertion.indent.prefix, "    ");
        assert_eq!(t.lines[t.insertion.line + 7], "    return\n");
    }

    #[test]
    fn test_execute_in_loop_header_with_else_clause() {
        let source = "import ncs\nsim = ncs.Simulation()\nwhile sim.run(duration=1):\n    break\nelse:\n    pass\n";
        let t = transform(source).unwrap();
        assert_eq!(t.lines[t.insertion.line], "    pass\n");
        assert_eq!(t.injected_lines().len(), 6);
    }

    #[test]
    fn test_else_of_enclosing_statement_is_not_absorbed() {
        let source = r#"import ncs
sim = ncs.Simulation()
if True:
    if sim.run(duration=1):
        print("ran")
else:
    print("never")
"#;
        let t = transform(source).unwrap();
        assert_eq!(t.lines[t.insertion.line], "        print(\"ran\")\n");
        assert_eq!(t.injected_lines()[0], "    _introspect_spec = {}\n");
        assert_eq!(t.lines[t.insertion.line + 7], "else:\n");
    }

    #[test]
    fn test_tab_indentation_is_copied() {
        let source = "import ncs\ndef main():\n\tsim = ncs.Simulation()\n\tsim.run()\n";
        let t = transform(source).unwrap();
        assert_eq!(t.insertion.indent.tab_count(), 1);
        assert!(t.injected_lines().iter().all(|l| l.starts_with('\t')));
    }

    #[test]
    fn test_missing_final_newline() {
        let source = "import ncs\nsim = ncs.Simulation()\nsim.run()";
        let t = transform(source).unwrap();
        assert!(t.text().contains("sim.parseRun()\n_introspect_spec = {}\n"));
        assert!(t.text().ends_with('\n'));
    }

    #[test]
    fn test_only_first_execute_gets_the_block() {
        let source = "import ncs\nsim = ncs.Simulation()\nsim.run(duration=1)\nsim.run(duration=2)\n";
        let t = transform(source).unwrap();
        assert_eq!(t.lines[t.insertion.line], "sim.parseRun(duration=1)\n");
        assert!(t.text().contains("sim.parseRun(duration=2)\n"));
        assert_eq!(t.text().matches("_introspect_spec = {}").count(), 1);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let a = transform(IZH_SCRIPT).unwrap();
        let b = transform(IZH_SCRIPT).unwrap();
        assert_eq!(a.text(), b.text());
    }
}
