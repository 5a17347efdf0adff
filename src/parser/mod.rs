use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, trace};

use crate::model::{CostTable, Host};

/// Load the API cost table from `path`, or the built-in table when `None`.
pub fn load_cost_table(path: Option<&Path>) -> Result<CostTable> {
    let Some(path) = path else {
        debug!("using the built-in cost table");
        return Ok(CostTable::default());
    };
    let json = fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    parse_cost_table(&json).with_context(|| format!("Parsing cost table {}", path.display()))
}

/// Parse and validate a cost table.
///
/// The JSON has the shape `{ "base": 1.6, "max": 1024, "functions": { … } }`
/// where `functions` nests namespaces as objects and costs as numbers.
pub fn parse_cost_table(json: &str) -> Result<CostTable> {
    let table: CostTable = serde_json::from_str(json)?;
    table.validate()?;
    debug!(
        base = table.base,
        max = table.max,
        top_level = table.functions.len(),
        "cost table loaded"
    );
    Ok(table)
}

/// Build a host whose scripts are every `.js` file below `dir`.
///
/// Filenames are the paths relative to `dir` with `/` separators, e.g.
/// `lib/helpers.js`. Other files are skipped.
pub fn load_host(dir: &Path, hostname: &str) -> Result<Host> {
    if !dir.is_dir() {
        return Err(anyhow!("{} is not a directory", dir.display()));
    }
    let mut files = Vec::new();
    collect_js_files(dir, &mut files)?;
    files.sort();

    let mut host = Host::new(hostname);
    for path in files {
        let filename = relative_filename(dir, &path)?;
        let code =
            fs::read_to_string(&path).with_context(|| format!("Reading {}", path.display()))?;
        host.write_script(&filename, &code)
            .with_context(|| format!("Adding {filename} to {hostname}"))?;
    }
    info!(hostname, scripts = host.scripts().len(), "host loaded");
    Ok(host)
}

fn collect_js_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("Listing {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_js_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "js") {
            out.push(path);
        } else {
            trace!(path = %path.display(), "skipping non-script file");
        }
    }
    Ok(())
}

fn relative_filename(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let mut segments = Vec::new();
    for component in relative.components() {
        let segment = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| anyhow!("{} is not valid UTF-8", path.display()))?;
        segments.push(segment);
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cost_table() {
        let json = r#"{
            "base": 1.6,
            "max": 1024,
            "functions": {
                "hack": 0.1,
                "hacknet": { "purchaseNode": 0 }
            }
        }"#;
        let table = parse_cost_table(json).unwrap();
        assert_eq!(table.cost_of("hack"), Some(0.1));
        assert_eq!(table.cost_of("hacknet.purchaseNode"), Some(0.0));
    }

    #[test]
    fn test_parse_cost_table_rejects_bad_tables() {
        let test_cases = vec![
            r#"{ "base": 1.6, "max": 1, "functions": {} }"#,
            r#"{ "base": 1.6, "max": 1024, "functions": { "hack": -1 } }"#,
            r#"{ "base": 1.6, "max": 1024, "functions": { "hack": "cheap" } }"#,
            r#"{ "max": 1024 }"#,
        ];
        for json in test_cases {
            assert!(parse_cost_table(json).is_err(), "accepted: {json}");
        }
    }

    #[test]
    fn test_relative_filename_uses_forward_slashes() {
        let root = Path::new("/tmp/home");
        let path = root.join("lib").join("helpers.js");
        assert_eq!(relative_filename(root, &path).unwrap(), "lib/helpers.js");
    }
}
