//! INI-style unit file parser
//!
//! Only the directives needed to express a boot graph are understood:
//! `Requires`, `Wants` and `After` in `[Unit]`, `ExecStart` and `Restart`
//! in `[Service]`. Everything else is ignored.

use super::{RestartPolicy, StartAction, UnitDefinition};

/// Keys that contribute to the dependency set. Ordering and existence
/// requirements are not distinguished.
const DEPENDENCY_KEYS: &[&str] = &["Requires", "Wants", "After"];

/// Parse unit file text into a definition
pub fn parse_unit(content: &str) -> UnitDefinition {
    let mut unit = UnitDefinition::default();
    let mut section = "";

    for line in content.lines() {
        let line = line.trim();

        if line.starts_with('[') && line.ends_with(']') {
            section = &line[1..line.len() - 1];
            continue;
        }

        // Skip comments and empty lines
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match section {
            "Unit" if DEPENDENCY_KEYS.contains(&key) => {
                unit.dependencies
                    .extend(value.split_whitespace().map(str::to_string));
            }
            "Service" if key == "ExecStart" => {
                // Verbatim: no quoting, no systemd prefixes (-, @, !).
                // An empty ExecStart= resets the unit to a plain target.
                unit.start = if value.is_empty() {
                    StartAction::Reach
                } else {
                    StartAction::Command(value.to_string())
                };
            }
            "Service" if key == "Restart" => {
                unit.restart = RestartPolicy::parse(value);
            }
            _ => {}
        }
    }

    unit
}
