//! The `show_vars` unit: list configuration variables and stop.

use crate::config_file::PARSE_CONFIG;
use ignite_core::{Config, SetupError, SyncUnit, UnitDescriptor, VarRegistry, VarReport};
use serde_json::Value;
use std::fmt::Write;
use std::sync::Arc;

/// Name of the unit.
pub const SHOW_VARS: &str = "show_vars";

/// Prints every registered variable, then stops initialization so the
/// command body never runs.
struct ShowVars {
    vars: Arc<VarRegistry>,
}

impl SyncUnit for ShowVars {
    fn setup(&self, config: &mut Config) -> Result<(), SetupError> {
        print!("{}", render(&self.vars.describe(config)));
        Err(SetupError::Stop)
    }
}

/// Build the `show_vars` unit over `vars`.
pub fn show_vars(vars: Arc<VarRegistry>) -> UnitDescriptor {
    UnitDescriptor::sync(SHOW_VARS, ShowVars { vars })
        .description("Show all config variables")
        .after(PARSE_CONFIG)
}

fn json(value: &Option<Value>) -> String {
    value
        .as_ref()
        .map(Value::to_string)
        .unwrap_or_else(|| "-".to_string())
}

/// Render a variable listing, one block per variable.
pub fn render(reports: &[VarReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let _ = writeln!(
            out,
            "{} ({}) = {} [default: {}]",
            report.name,
            report.type_name,
            json(&report.current),
            json(&report.default),
        );
        let _ = writeln!(out, "    {}", report.description);
    }
    out
}
