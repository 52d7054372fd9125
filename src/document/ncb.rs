use serde_json::{json, Value};

/// Model keys copied from a captured model when present.
pub const NCB_MODEL_KEYS: [&str; 3] = ["cellAliases", "cellGroups", "synapses"];

/// Run-parameter keys lifted into the NCB `simulation` section.
pub const NCB_RUN_KEYS: [&str; 4] = ["duration", "fsv", "seed", "interactive"];

/// Default NCB document that captured structure is overlaid onto.
pub fn ncb_skeleton() -> Value {
    json!({
        "model": {
            "author": "",
            "cellAliases": [],
            "cellGroups": {
                "cellGroups": [],
                "classification": "cellGroup",
                "description": "Description",
                "name": "Home"
            },
            "classification": "model",
            "description": "Description",
            "name": "Current Model",
            "synapses": []
        },
        "simulation": {
            "duration": null,
            "fsv": null,
            "includeDistance": "No",
            "inputs": [],
            "interactive": "No",
            "name": "sim",
            "outputs": [],
            "seed": null
        }
    })
}
