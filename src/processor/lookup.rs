//! Small indexed lookups used by the execution engine: running instances by
//! key or pid, import specifiers to sibling scripts, and runtime addresses
//! back to filenames.

use regex::Regex;

use crate::model::{Host, RunningScript, Script, ScriptArg, ScriptMap, ScriptRef};

/// Canonical key of a running instance: `path*["arg",1,true]`.
pub fn script_key(filename: &str, args: &[ScriptArg]) -> String {
    let args = serde_json::to_string(args).unwrap_or_else(|_| "[]".to_string());
    format!("{filename}*{args}")
}

/// First running instance of `filename` started with exactly `args`.
pub fn find_running_by_key<'a>(
    filename: &str,
    args: &[ScriptArg],
    host: &'a Host,
) -> Option<&'a RunningScript> {
    host.running_by_key(&script_key(filename, args))?
        .values()
        .next()
}

pub fn find_running_by_instance_id(pid: u32, host: &Host) -> Option<&RunningScript> {
    host.running_scripts().find(|r| r.pid == pid)
}

/// The script a running instance was started from.
pub fn find_script_by_instance_id(pid: u32, host: &Host) -> Option<ScriptRef> {
    let running = find_running_by_instance_id(pid, host)?;
    host.get_script(&running.filename)
}

/// Every running instance whose filename matches `pattern`.
pub fn grep_running<'a>(pattern: &Regex, host: &'a Host) -> Vec<&'a RunningScript> {
    host.running_scripts()
        .filter(|r| pattern.is_match(&r.filename))
        .collect()
}

/// Resolve an import specifier against the importing file's directory.
///
/// `./x.js` and `x.js` are relative, `/x.js` is absolute, `..` walks up.
/// URLs and bare package names containing `:` are never local.
pub fn resolve_import_path(importer: &str, specifier: &str) -> Option<String> {
    if specifier.contains(':') {
        return None;
    }
    let mut segments: Vec<&str> = match specifier.strip_prefix('/') {
        Some(_) => Vec::new(),
        None => {
            let mut dir: Vec<&str> = importer.split('/').collect();
            dir.pop();
            dir
        }
    };
    for segment in specifier.trim_start_matches('/').split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

/// The sibling script an import specifier refers to, trying the exact path
/// first and then with `.js` appended.
pub fn find_imported_script(
    scripts: &ScriptMap,
    importer: &str,
    specifier: &str,
) -> Option<(String, ScriptRef)> {
    let path = resolve_import_path(importer, specifier)?;
    if let Some(script) = scripts.get(&path) {
        return Some((path, script.clone()));
    }
    let with_ext = format!("{path}.js");
    let script = scripts.get(&with_ext)?.clone();
    Some((with_ext, script))
}

/// Replace every module address in `message` with `host/filename`.
pub fn attribute_addresses(message: &str, script: &Script) -> String {
    let mut out = message.to_string();
    let own = script.address().map(str::to_string);
    for address in own.iter().map(String::as_str).chain(script.dependency_addresses()) {
        if !out.contains(address) {
            continue;
        }
        let filename = if own.as_deref() == Some(address) {
            Some(script.filename().to_string())
        } else {
            script.filename_for_address(address)
        };
        if let Some(filename) = filename {
            out = out.replace(address, &format!("{}/{}", script.hostname(), filename));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_key() {
        let args: Vec<ScriptArg> = vec!["n00dles".into(), 2.0.into(), true.into()];
        assert_eq!(script_key("a.js", &args), r#"a.js*["n00dles",2.0,true]"#);
        assert_eq!(script_key("a.js", &[]), "a.js*[]");
    }

    #[test]
    fn test_resolve_import_path() {
        let test_cases = vec![
            ("main.js", "./lib.js", Some("lib.js")),
            ("main.js", "lib.js", Some("lib.js")),
            ("main.js", "/lib.js", Some("lib.js")),
            ("dir/main.js", "./lib.js", Some("dir/lib.js")),
            ("dir/main.js", "/lib.js", Some("lib.js")),
            ("dir/sub/main.js", "../util/x", Some("dir/util/x")),
            ("main.js", "../x.js", None),
            ("main.js", "https://cdn.example.com/x.js", None),
        ];
        for (importer, specifier, expected) in test_cases {
            assert_eq!(
                resolve_import_path(importer, specifier).as_deref(),
                expected,
                "{importer} imports {specifier}"
            );
        }
    }

    #[test]
    fn test_running_lookups() {
        let mut host = Host::new("home");
        host.write_script("worker.js", "").unwrap();
        host.write_script("tools/scan.js", "").unwrap();
        let a = host.run_script("worker.js", vec!["n00dles".into()]).unwrap();
        let b = host.run_script("worker.js", vec!["foodnstuff".into()]).unwrap();
        let c = host.run_script("tools/scan.js", vec![]).unwrap();

        let found = find_running_by_key("worker.js", &["foodnstuff".into()], &host).unwrap();
        assert_eq!(found.pid, b);
        assert!(find_running_by_key("worker.js", &[], &host).is_none());

        assert_eq!(find_running_by_instance_id(a, &host).map(|r| r.pid), Some(a));
        assert!(find_running_by_instance_id(99, &host).is_none());

        let script = find_script_by_instance_id(c, &host).unwrap();
        assert_eq!(script.borrow().filename(), "tools/scan.js");

        let pattern = Regex::new(r"^worker").unwrap();
        let pids: Vec<u32> = grep_running(&pattern, &host).iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![a, b]);
    }

    #[test]
    fn test_find_imported_script_appends_extension() {
        let mut host = Host::new("home");
        host.write_script("lib/math.js", "").unwrap();
        let (name, _) = find_imported_script(host.scripts(), "main.js", "./lib/math").unwrap();
        assert_eq!(name, "lib/math.js");
        assert!(find_imported_script(host.scripts(), "main.js", "./missing.js").is_none());
    }
}
