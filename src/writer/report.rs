//! RAM report: `ram.json` plus a plain-text summary for the terminal.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::model::{ProcessedHost, ScriptRam};

pub fn emit(processed: &ProcessedHost, out_dir: &Path) -> io::Result<()> {
    let file = File::create(out_dir.join("ram.json"))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, processed)?;
    writeln!(writer)?;
    writer.flush()
}

/// One line per script, e.g. `1.75 GB  lib/hack.js`, followed by its charges.
pub fn render(ram: &[ScriptRam]) -> String {
    let mut out = String::new();
    for script in ram {
        match (script.ram, &script.error) {
            (Some(cost), _) => {
                let _ = writeln!(out, "{cost:>8.2} GB  {}", script.filename);
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "{:>8}     {}  ({error})", "-", script.filename);
            }
            (None, None) => {
                let _ = writeln!(out, "{:>8}     {}", "-", script.filename);
            }
        }
        for entry in &script.entries {
            let _ = writeln!(out, "{:>8.2}       {}", entry.cost, entry.qualified_name());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RamCostEntry;

    #[test]
    fn test_render() {
        let ram = vec![
            ScriptRam {
                filename: "main.js".into(),
                ram: Some(1.75),
                entries: vec![RamCostEntry {
                    namespace: String::new(),
                    name: "grow".into(),
                    cost: 0.15,
                }],
                error: None,
            },
            ScriptRam {
                filename: "broken.js".into(),
                ram: None,
                entries: Vec::new(),
                error: Some("broken.js: SyntaxError: unexpected end of input (1:5)".into()),
            },
        ];
        let text = render(&ram);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "    1.75 GB  main.js");
        assert_eq!(lines[1], "    0.15       grow");
        assert!(lines[2].contains("broken.js  (broken.js: SyntaxError"));
    }
}
