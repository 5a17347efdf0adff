use netscript::model::{CostTable, Host, Script};
use netscript::processor::resolver::{Compiler, SourceLoader};

fn costs() -> CostTable {
    CostTable::new(1.6, 1024.0)
        .with("hack", 0.1)
        .with("grow", 0.15)
        .with("weaken", 0.15)
        .with("sleep", 0.0)
        .with("tprint", 0.0)
        .with("getServerMaxMoney", 0.1)
        .with("hacknet.purchaseNode", 4.0)
        .with("singularity.installAugmentations", 5.0)
}

fn ram(host: &Host, filename: &str) -> Option<f64> {
    let script = host.get_script(filename).unwrap();
    Script::get_ram_cost(&script, host.scripts(), &costs())
}

const LIB: &str = r#"
export async function doHack(ns, target) {
    return await ns.hack(target);
}

export async function doGrow(ns, target) {
    return await ns.grow(target);
}
"#;

const MAIN: &str = r#"
import { doHack } from "./lib.js";

/** @param {NS} ns */
export async function main(ns) {
    const target = ns.args[0] ?? "n00dles";
    while (true) {
        await doHack(ns, target);
        await ns.sleep(1000);
    }
}
"#;

#[test]
fn imported_function_charges_only_what_it_reaches() {
    let mut host = Host::new("home");
    host.write_script("lib.js", LIB).unwrap();
    host.write_script("main.js", MAIN).unwrap();

    assert_eq!(ram(&host, "main.js"), Some(1.7));
    assert_eq!(ram(&host, "lib.js"), Some(0.0));

    let main = host.get_script("main.js").unwrap();
    let main = main.borrow();
    let names: Vec<String> = main
        .ram_cost_entries()
        .iter()
        .map(|entry| entry.qualified_name())
        .collect();
    assert_eq!(names, vec!["hack"]);
}

#[test]
fn repeated_calls_are_counted_once_and_capped() {
    let mut host = Host::new("home");
    host.write_script(
        "buy.js",
        r#"export async function main(ns) {
            for (let i = 0; i < 10; i++) ns.hacknet.purchaseNode();
            ns.hacknet.purchaseNode();
            ns.singularity.installAugmentations();
        }"#,
    )
    .unwrap();
    assert_eq!(ram(&host, "buy.js"), Some(10.6));

    let script = host.get_script("buy.js").unwrap();
    let capped = CostTable {
        max: 8.0,
        ..costs()
    };
    Script::update_ram_cost(&script, host.scripts(), &capped);
    assert_eq!(script.borrow().ram_cost(), Some(8.0));
    assert!(script.borrow().ram_cost_error().is_none());
}

#[test]
fn handle_name_and_lookalike_functions() {
    let mut host = Host::new("home");
    host.write_script(
        "a.js",
        "export async function main(ns) { await ns.grow('x'); }",
    )
    .unwrap();
    host.write_script(
        "b.js",
        "export async function main(netscript) { await netscript.grow('x'); }",
    )
    .unwrap();
    host.write_script(
        "c.js",
        r#"
        function grow(list) { return list.concat([1]); }
        const weaken = (n) => n / 2;
        export async function main(ns) { grow([]); weaken(4); ns.tprint("ok"); }
        "#,
    )
    .unwrap();

    assert_eq!(ram(&host, "a.js"), Some(1.75));
    assert_eq!(ram(&host, "b.js"), ram(&host, "a.js"));
    assert_eq!(ram(&host, "c.js"), Some(0.0));
}

#[test]
fn namespace_import_of_a_class() {
    let mut host = Host::new("home");
    host.write_script(
        "lib/batch.js",
        r#"
        export class Batcher {
            #ns;
            constructor(ns) { this.#ns = ns; }
            async run(target) {
                await this.#ns.weaken(target);
                return this.#ns.getServerMaxMoney(target);
            }
        }
        "#,
    )
    .unwrap();
    host.write_script(
        "batch.js",
        r#"
        import * as batch from "lib/batch.js";
        export async function main(ns) {
            const batcher = new batch.Batcher(ns);
            await batcher.run("n00dles");
        }
        "#,
    )
    .unwrap();
    assert_eq!(ram(&host, "batch.js"), Some(1.85));
}

#[test]
fn parse_failure_is_reported_not_priced() {
    let mut host = Host::new("home");
    host.write_script("lib.js", "export function broken(ns) { ns.hack(; }")
        .unwrap();
    host.write_script(
        "main.js",
        "import { broken } from './lib.js';\nexport async function main(ns) { broken(ns); }",
    )
    .unwrap();

    assert_eq!(ram(&host, "main.js"), None);
    let main = host.get_script("main.js").unwrap();
    let error = main.borrow().ram_cost_error().map(str::to_string);
    assert!(error.unwrap().starts_with("lib.js: SyntaxError:"));
}

#[tokio::test(flavor = "current_thread")]
async fn editing_a_compiled_import_forces_recomputation() {
    let mut host = Host::new("home");
    host.write_script("lib.js", LIB).unwrap();
    let main = host.write_script("main.js", MAIN).unwrap();

    Compiler::new(SourceLoader)
        .compile(&main, host.scripts())
        .await
        .unwrap();
    assert_eq!(ram(&host, "main.js"), Some(1.7));

    host.write_script("lib.js", &LIB.replace("ns.hack(target)", "ns.weaken(target)"))
        .unwrap();
    assert_eq!(main.borrow().ram_cost(), None);
    assert_eq!(ram(&host, "main.js"), Some(1.75));
}

#[test]
fn deeply_nested_script_is_an_error_not_a_crash() {
    let mut host = Host::new("home");
    let depth = 5000;
    let code = format!(
        "export async function main(ns) {{ const x = {}ns{}; x.hack('x'); }}",
        "(".repeat(depth),
        ")".repeat(depth)
    );
    host.write_script("deep.js", &code).unwrap();
    host.write_script("ok.js", "export async function main(ns) { ns.hack('x'); }")
        .unwrap();

    assert_eq!(ram(&host, "deep.js"), None);
    let deep = host.get_script("deep.js").unwrap();
    let error = deep.borrow().ram_cost_error().map(str::to_string).unwrap();
    assert!(error.starts_with("deep.js: SyntaxError: nesting too deep"), "{error}");
    assert_eq!(ram(&host, "ok.js"), Some(1.7));
}
