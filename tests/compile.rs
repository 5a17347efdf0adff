use std::rc::Rc;

use netscript::error::CompileError;
use netscript::model::Host;
use netscript::processor::lookup::attribute_addresses;
use netscript::processor::resolver::{Compiler, SourceLoader};
use netscript::processor::resource::{ADDRESS_SCHEME, ResourcePool};

fn host_with(files: &[(&str, &str)]) -> Host {
    let mut host = Host::new("home");
    for (filename, code) in files {
        host.write_script(filename, code).unwrap();
    }
    host
}

#[tokio::test(flavor = "current_thread")]
async fn rewrites_imports_to_addresses() {
    let host = host_with(&[
        ("lib/math.js", "export const double = (n) => n * 2;"),
        ("lib/index.js", "export * from './math.js';"),
        (
            "main.js",
            "import { double } from \"./lib/index.js\";\nexport async function main(ns) { double(2); }",
        ),
    ]);
    let main = host.get_script("main.js").unwrap();
    let compiler = Compiler::new(SourceLoader);
    let module = compiler.compile(&main, host.scripts()).await.unwrap();

    let index = host.get_script("lib/index.js").unwrap();
    let math = host.get_script("lib/math.js").unwrap();
    let index_address = index.borrow().address().unwrap().to_string();
    let math_address = math.borrow().address().unwrap().to_string();
    assert!(module.address().starts_with(ADDRESS_SCHEME));

    let text = module.text().unwrap();
    assert!(text.starts_with(&format!("import {{ double }} from \"{index_address}\";")));
    assert!(text.ends_with("\n//# sourceURL=home/main.js"));
    let index_text = index.borrow().module().unwrap().text().unwrap();
    assert!(index_text.contains(&format!("export * from '{math_address}';")));

    let program = module.program().await.unwrap();
    assert!(program.has_main());
    assert!(!program.has_autocomplete());

    let main = main.borrow();
    let mut dependencies: Vec<&str> = main.dependency_addresses().collect();
    dependencies.sort();
    let mut expected = vec![index_address.as_str(), math_address.as_str()];
    expected.sort();
    assert_eq!(dependencies, expected);
    assert_eq!(
        main.filename_for_address(&math_address).as_deref(),
        Some("lib/math.js")
    );
}

#[tokio::test(flavor = "current_thread")]
async fn compile_is_idempotent_while_valid() {
    let host = host_with(&[("a.js", "export async function main(ns) {}")]);
    let script = host.get_script("a.js").unwrap();
    let compiler = Compiler::new(SourceLoader);

    let first = compiler.compile(&script, host.scripts()).await.unwrap();
    let second = compiler.compile(&script, host.scripts()).await.unwrap();
    assert_eq!(first.address(), second.address());
    assert_eq!(compiler.pool().len(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn mutual_imports_resolve_to_each_other() {
    let host = host_with(&[
        (
            "ping.js",
            "import { pong } from './pong.js';\nexport function ping(n) { return n && pong(n - 1); }\nexport async function main(ns) { ping(3); }",
        ),
        (
            "pong.js",
            "import { ping } from './ping.js';\nexport function pong(n) { return n && ping(n - 1); }",
        ),
    ]);
    let ping = host.get_script("ping.js").unwrap();
    let pong = host.get_script("pong.js").unwrap();
    let compiler = Compiler::new(SourceLoader);
    compiler.compile(&ping, host.scripts()).await.unwrap();

    let ping_address = ping.borrow().address().unwrap().to_string();
    let pong_address = pong.borrow().address().unwrap().to_string();
    let ping_text = compiler.pool().get(&ping_address).unwrap();
    let pong_text = compiler.pool().get(&pong_address).unwrap();
    assert!(ping_text.contains(&pong_address));
    assert!(pong_text.contains(&ping_address));
    assert!(!ping_text.contains("./pong.js"));
    assert!(!pong_text.contains("./ping.js"));

    // Either side changing takes both modules down.
    pong.borrow_mut().set_content("export function pong(n) { return n; }");
    assert!(pong.borrow().module().is_none());
    assert!(ping.borrow().module().is_none());
}

#[tokio::test(flavor = "current_thread")]
async fn cycle_members_share_transitive_dependencies() {
    let host = host_with(&[
        ("a.js", "import { b } from './b.js';\nimport { d } from './d.js';\nexport const a = 1;"),
        ("b.js", "import { c } from './c.js';\nexport const b = 1;"),
        ("c.js", "import { a } from './a.js';\nimport { d } from './d.js';\nexport const c = 1;"),
        ("d.js", "export const d = 1;"),
    ]);
    let b = host.get_script("b.js").unwrap();
    Compiler::new(SourceLoader)
        .compile(&b, host.scripts())
        .await
        .unwrap();

    let dependencies = |name: &str| {
        let script = host.get_script(name).unwrap();
        let script = script.borrow();
        let mut files: Vec<String> = script
            .dependency_addresses()
            .filter_map(|address| script.filename_for_address(address))
            .collect();
        files.sort();
        files
    };
    assert_eq!(dependencies("a.js"), vec!["b.js", "c.js", "d.js"]);
    assert_eq!(dependencies("b.js"), vec!["a.js", "c.js", "d.js"]);
    assert_eq!(dependencies("c.js"), vec!["a.js", "b.js", "d.js"]);
    assert!(dependencies("d.js").is_empty());

    let c_address = host
        .get_script("c.js")
        .unwrap()
        .borrow()
        .address()
        .unwrap()
        .to_string();
    let a = host.get_script("a.js").unwrap();
    let message = format!("Error: boom\n    at c ({c_address}:3:20)");
    assert_eq!(
        attribute_addresses(&message, &a.borrow()),
        "Error: boom\n    at c (home/c.js:3:20)"
    );
}

#[tokio::test(flavor = "current_thread")]
async fn invalidation_reaches_transitive_dependents_only() {
    let host = host_with(&[
        ("base.js", "export const x = 1;"),
        ("mid.js", "import { x } from './base.js';\nexport const y = x;"),
        ("top.js", "import { y } from './mid.js';\nexport async function main(ns) { y; }"),
        ("side.js", "import { x } from './base.js';\nexport async function main(ns) { x; }"),
        ("alone.js", "export async function main(ns) {}"),
    ]);
    let compiler = Compiler::new(SourceLoader);
    for name in ["top.js", "side.js", "alone.js"] {
        let script = host.get_script(name).unwrap();
        compiler.compile(&script, host.scripts()).await.unwrap();
    }
    let mid = host.get_script("mid.js").unwrap();
    mid.borrow_mut().invalidate();

    let compiled = |name: &str| host.get_script(name).unwrap().borrow().module().is_some();
    assert!(!compiled("mid.js"));
    assert!(!compiled("top.js"));
    assert!(compiled("base.js"));
    assert!(compiled("side.js"));
    assert!(compiled("alone.js"));

    // Repeating is harmless.
    mid.borrow_mut().invalidate();
    assert!(compiled("base.js"));
}

#[tokio::test(flavor = "current_thread")]
async fn load_failures_name_the_script() {
    let host = host_with(&[
        ("broken.js", "export async function main(ns) { ns.hack( }"),
        ("orphan.js", "import { gone } from './gone.js';\nexport async function main(ns) {}"),
    ]);
    let compiler = Compiler::new(SourceLoader);

    let broken = host.get_script("broken.js").unwrap();
    let CompileError::Load {
        hostname,
        filename,
        message,
    } = compiler.compile(&broken, host.scripts()).await.unwrap_err();
    assert_eq!((hostname.as_str(), filename.as_str()), ("home", "broken.js"));
    assert!(message.starts_with("SyntaxError:"), "{message}");
    assert!(broken.borrow().module().is_none());

    let orphan = host.get_script("orphan.js").unwrap();
    let err = compiler.compile(&orphan, host.scripts()).await.unwrap_err();
    assert!(err.to_string().starts_with("error loading home/orphan.js:"), "{err}");
    assert!(err.to_string().contains("./gone.js"), "{err}");
}

#[tokio::test(flavor = "current_thread")]
async fn revocation_waits_for_active_compilations() {
    let pool = ResourcePool::new();
    let host = host_with(&[
        ("lib.js", "export const v = 1;"),
        ("main.js", "import { v } from './lib.js';\nexport async function main(ns) { v; }"),
    ]);
    let compiler = Compiler::with_pool(Rc::clone(&pool), SourceLoader);
    let main = host.get_script("main.js").unwrap();
    compiler.compile(&main, host.scripts()).await.unwrap();
    let address = main.borrow().address().unwrap().to_string();

    let guard = pool.begin_compilation();
    main.borrow_mut().invalidate();
    assert!(pool.contains(&address));
    assert_eq!(pool.pending_revocations(), 1);

    drop(guard);
    assert!(!pool.contains(&address));
    assert_eq!(pool.pending_revocations(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn runtime_errors_are_attributed_to_files() {
    let host = host_with(&[
        ("lib.js", "export function f() { throw new Error('boom'); }"),
        ("main.js", "import { f } from './lib.js';\nexport async function main(ns) { f(); }"),
    ]);
    let main = host.get_script("main.js").unwrap();
    Compiler::new(SourceLoader)
        .compile(&main, host.scripts())
        .await
        .unwrap();

    let lib_address = host
        .get_script("lib.js")
        .unwrap()
        .borrow()
        .address()
        .unwrap()
        .to_string();
    let main = main.borrow();
    let main_address = main.address().unwrap().to_string();
    let message = format!("Error: boom\n    at f ({lib_address}:1:29)\n    at main ({main_address}:2:35)");
    assert_eq!(
        attribute_addresses(&message, &main),
        "Error: boom\n    at f (home/lib.js:1:29)\n    at main (home/main.js:2:35)"
    );
}
