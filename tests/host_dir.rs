use std::fs;
use std::path::Path;

use netscript::model::{CostTable, ProcessedHost};
use netscript::{parser, processor, writer};

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn sample_host_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "lib/hack.js",
        "export async function hackLoop(ns, target) { await ns.hack(target); }",
    );
    write(
        dir.path(),
        "main.js",
        "import { hackLoop } from './lib/hack.js';\nexport async function main(ns) { await hackLoop(ns, 'n00dles'); }",
    );
    write(dir.path(), "notes.txt", "not a script");
    dir
}

#[test]
fn loads_scripts_with_relative_filenames() {
    let dir = sample_host_dir();
    let host = parser::load_host(dir.path(), "home").unwrap();
    let filenames: Vec<&str> = host.scripts().keys().map(String::as_str).collect();
    assert_eq!(filenames, vec!["lib/hack.js", "main.js"]);

    let selected = processor::select_scripts(&host, &["main.js".to_string()]).unwrap();
    assert_eq!(selected.len(), 1);
    assert!(processor::select_scripts(&host, &["missing.js".to_string()]).is_err());
}

#[test]
fn missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(parser::load_host(&dir.path().join("nope"), "home").is_err());
}

#[test]
fn writes_ram_report() {
    let dir = sample_host_dir();
    let out = tempfile::tempdir().unwrap();
    let host = parser::load_host(dir.path(), "home").unwrap();
    let scripts = processor::select_scripts(&host, &[]).unwrap();
    let costs = CostTable::new(1.6, 1024.0).with("hack", 0.1);

    let processed = ProcessedHost {
        hostname: host.hostname.clone(),
        ram: processor::ram_usage(&host, &scripts, &costs),
        modules: Vec::new(),
    };
    writer::report::emit(&processed, out.path()).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join("ram.json")).unwrap()).unwrap();
    assert_eq!(json["hostname"], "home");
    assert_eq!(json["ram"][0]["filename"], "lib/hack.js");
    assert_eq!(json["ram"][0]["ram"], 0.0);
    assert_eq!(json["ram"][1]["filename"], "main.js");
    assert_eq!(json["ram"][1]["ram"], 1.7);
    assert_eq!(json["ram"][1]["entries"][0]["name"], "hack");
    assert!(json.get("modules").is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn writes_compiled_modules() {
    let dir = sample_host_dir();
    let out = tempfile::tempdir().unwrap();
    let host = parser::load_host(dir.path(), "home").unwrap();
    let scripts = processor::select_scripts(&host, &["main.js".to_string()]).unwrap();

    let processed = ProcessedHost {
        hostname: host.hostname.clone(),
        ram: Vec::new(),
        modules: processor::compile(&host, &scripts).await,
    };
    writer::modules::emit(&processed, out.path()).unwrap();

    let main = &processed.modules[0];
    assert!(main.error.is_none());
    assert_eq!(main.dependencies, vec!["lib/hack.js"]);
    assert_eq!(main.exports, vec!["main"]);

    let text = fs::read_to_string(out.path().join("modules").join("main.js")).unwrap();
    assert!(!text.contains("./lib/hack.js"));
    assert!(text.ends_with("//# sourceURL=home/main.js"));

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join("modules.json")).unwrap()).unwrap();
    assert_eq!(manifest[0]["filename"], "main.js");
    assert_eq!(manifest[0]["address"], main.address.clone().unwrap().as_str());
    assert!(manifest[0].get("text").is_none());
}

#[test]
fn parses_cost_table_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("costs.json");
    fs::write(&path, r#"{ "base": 2, "max": 64, "functions": { "stock": { "buyStock": 2.5 } } }"#)
        .unwrap();
    let table = parser::load_cost_table(Some(path.as_path())).unwrap();
    assert_eq!(table.base, 2.0);
    assert_eq!(table.cost_of("stock.buyStock"), Some(2.5));

    let default = parser::load_cost_table(None).unwrap();
    assert_eq!(default, CostTable::default());
}
