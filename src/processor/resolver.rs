//! Turns a script plus its siblings into a loadable module.
//!
//! Resolution walks the import graph depth first. Each script gets an
//! address reserved in the [`ResourcePool`] before its imports are visited,
//! so an import cycle that leads back to a script still being rewritten
//! simply embeds that reserved address; the text behind it is filled in once
//! the script's own rewrite finishes.

use std::cmp::Reverse;
use std::fmt;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use tracing::{debug, info, trace, warn};

use super::ast::ModuleSource;
use super::lookup;
use super::resource::{CompilationGuard, ResourcePool};
use super::script_parser;
use crate::error::{CompileError, LoadError};
use crate::model::{ScriptMap, ScriptRef};

pub type ProgramResult = Result<Rc<LoadedProgram>, LoadError>;

/// What a loader hands back for a successfully instantiated module.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedProgram {
    pub address: String,
    pub exports: Vec<String>,
}

impl LoadedProgram {
    pub fn has_export(&self, name: &str) -> bool {
        self.exports.iter().any(|e| e == name)
    }

    /// `main`, the entry point the execution engine calls.
    pub fn has_main(&self) -> bool {
        self.has_export("main")
    }

    /// `autocomplete`, the optional terminal completion hook.
    pub fn has_autocomplete(&self) -> bool {
        self.has_export("autocomplete")
    }
}

/// Instantiates the module stored under an address.
pub trait ModuleLoader {
    fn load(&self, address: &str, pool: &Rc<ResourcePool>) -> LocalBoxFuture<'static, ProgramResult>;
}

/// Loads modules straight from the pool: the text must parse and every
/// import must name a live address.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceLoader;

impl ModuleLoader for SourceLoader {
    fn load(&self, address: &str, pool: &Rc<ResourcePool>) -> LocalBoxFuture<'static, ProgramResult> {
        let address = address.to_string();
        let pool = Rc::clone(pool);
        async move {
            let text = pool
                .get(&address)
                .ok_or_else(|| LoadError(format!("Failed to fetch module {address}")))?;
            let program = script_parser::parse_module(&text)?;
            for source in program.module_sources() {
                if !pool.contains(&source.value) {
                    return Err(LoadError(format!(
                        "Failed to resolve module specifier \"{}\"",
                        source.value
                    )));
                }
            }
            Ok(Rc::new(LoadedProgram {
                exports: program.exported_names(),
                address,
            }))
        }
        .boxed_local()
    }
}

/// Compiled artifact of one script at one point in time.
#[derive(Clone)]
pub struct Module {
    address: Rc<str>,
    pool: Rc<ResourcePool>,
    program: Shared<LocalBoxFuture<'static, ProgramResult>>,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Module {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Rewritten source text behind the address, while it is still live.
    pub fn text(&self) -> Option<Rc<str>> {
        self.pool.get(&self.address)
    }

    pub async fn program(&self) -> ProgramResult {
        self.program.clone().await
    }

    /// Schedule the address for revocation.
    pub(crate) fn dispose(&self) {
        self.pool.revoke(&self.address);
    }
}

pub struct Compiler {
    pool: Rc<ResourcePool>,
    loader: Rc<dyn ModuleLoader>,
}

impl Compiler {
    pub fn new(loader: impl ModuleLoader + 'static) -> Self {
        Self::with_pool(ResourcePool::new(), loader)
    }

    /// Share one pool between several compilers.
    pub fn with_pool(pool: Rc<ResourcePool>, loader: impl ModuleLoader + 'static) -> Self {
        Self {
            pool,
            loader: Rc::new(loader),
        }
    }

    pub fn pool(&self) -> &Rc<ResourcePool> {
        &self.pool
    }

    /// Compile `script` and load its module.
    ///
    /// An existing module is reused. When loading fails the script is
    /// invalidated and the error names the host and file.
    pub async fn compile(&self, script: &ScriptRef, scripts: &ScriptMap) -> Result<Module, CompileError> {
        let _guard: CompilationGuard = self.pool.begin_compilation();

        let cached = script.borrow().module.clone();
        let module = match cached {
            Some(module) => module,
            None => {
                let mut in_flight = Vec::new();
                let mut resolved = Vec::new();
                self.resolve(script, scripts, &mut in_flight, &mut resolved);
                close_dependencies(&resolved);
                script.borrow().module.clone().ok_or_else(|| {
                    let script = script.borrow();
                    CompileError::Load {
                        hostname: script.hostname().to_string(),
                        filename: script.filename().to_string(),
                        message: "module was invalidated during resolution".to_string(),
                    }
                })?
            }
        };

        match module.program().await {
            Ok(program) => {
                info!(address = %program.address, "module loaded");
                Ok(module)
            }
            Err(err) => {
                let mut script = script.borrow_mut();
                warn!(
                    hostname = script.hostname(),
                    filename = script.filename(),
                    error = %err,
                    "module failed to load"
                );
                script.invalidate();
                Err(CompileError::Load {
                    hostname: script.hostname().to_string(),
                    filename: script.filename().to_string(),
                    message: err.to_string(),
                })
            }
        }
    }

    /// Assign `script` an address, rewriting its imports to the addresses of
    /// its siblings first.
    ///
    /// `in_flight` is the chain of scripts currently being rewritten, each
    /// with the address reserved for it; the last entry imports `script`.
    /// Every script given a new module is appended to `resolved`.
    fn resolve(
        &self,
        script: &ScriptRef,
        scripts: &ScriptMap,
        in_flight: &mut Vec<(ScriptRef, Rc<str>)>,
        resolved: &mut Vec<ScriptRef>,
    ) -> Rc<str> {
        let existing = script.borrow().module.as_ref().map(|m| m.address.clone());
        if let Some(address) = existing {
            record_dependency(script, &address, in_flight);
            return address;
        }
        let reserved = in_flight
            .iter()
            .find(|(s, _)| Rc::ptr_eq(s, script))
            .map(|(_, address)| address.clone());
        if let Some(address) = reserved {
            trace!(%address, "import cycle, using reserved address");
            record_dependency(script, &address, in_flight);
            return address;
        }

        let (hostname, filename, code) = {
            let s = script.borrow();
            (
                s.hostname().to_string(),
                s.filename().to_string(),
                s.code().to_string(),
            )
        };
        let address = self.pool.reserve();

        let mut sources: Vec<ModuleSource> = match script_parser::parse_module(&code) {
            Ok(program) => program.module_sources().into_iter().cloned().collect(),
            Err(err) => {
                // The loader reports the syntax error when it parses the text.
                debug!(filename = %filename, error = %err, "not rewriting imports");
                Vec::new()
            }
        };
        sources.sort_by_key(|source| Reverse(source.span.start));

        let mut text = code;
        in_flight.push((script.clone(), address.clone()));
        for source in &sources {
            let Some((dep_name, dependency)) =
                lookup::find_imported_script(scripts, &filename, &source.value)
            else {
                debug!(filename = %filename, specifier = %source.value, "unresolved import");
                continue;
            };
            let dep_address = self.resolve(&dependency, scripts, in_flight, resolved);
            trace!(filename = %filename, import = %dep_name, address = %dep_address, "rewriting import");
            text.replace_range(source.inner_span().range(), &dep_address);
        }
        in_flight.pop();

        text.push_str(&format!("\n//# sourceURL={hostname}/{filename}"));
        self.pool.fill(&address, text);

        let program = self.loader.load(&address, &self.pool).shared();
        script.borrow_mut().module = Some(Module {
            address: address.clone(),
            pool: Rc::clone(&self.pool),
            program,
        });
        debug!(hostname = %hostname, filename = %filename, address = %address, "resolved module");

        record_dependency(script, &address, in_flight);
        resolved.push(script.clone());
        address
    }
}

/// Every script in `chain` now depends on `script`, and the last one imports
/// it directly. A script that was compiled earlier also contributes its own
/// dependencies to the chain.
fn record_dependency(script: &ScriptRef, address: &Rc<str>, chain: &[(ScriptRef, Rc<str>)]) {
    let Some((importer, _)) = chain.last() else {
        return;
    };
    if !Rc::ptr_eq(importer, script) {
        script.borrow_mut().add_dependent(importer);
    }
    let inherited: Vec<_> = script
        .borrow()
        .dependencies
        .iter()
        .map(|(a, s)| (a.clone(), s.clone()))
        .collect();
    for (dependent_ref, _) in chain {
        if Rc::ptr_eq(dependent_ref, script) {
            continue;
        }
        let mut dependent = dependent_ref.borrow_mut();
        dependent
            .dependencies
            .insert(address.to_string(), Rc::downgrade(script));
        for (a, s) in &inherited {
            if !std::ptr::eq(s.as_ptr(), Rc::as_ptr(dependent_ref)) {
                dependent.dependencies.entry(a.clone()).or_insert_with(|| s.clone());
            }
        }
    }
}

/// Propagate dependency sets between freshly resolved scripts until none
/// grows. A script deep inside an import cycle only hears about the cycle
/// members above it once the whole walk has finished.
fn close_dependencies(resolved: &[ScriptRef]) {
    loop {
        let mut changed = false;
        for script_ref in resolved {
            let direct: Vec<ScriptRef> = script_ref
                .borrow()
                .dependencies
                .values()
                .filter_map(Weak::upgrade)
                .collect();
            let mut inherited = Vec::new();
            for dependency in &direct {
                if Rc::ptr_eq(dependency, script_ref) {
                    continue;
                }
                for (address, s) in &dependency.borrow().dependencies {
                    if !std::ptr::eq(s.as_ptr(), Rc::as_ptr(script_ref)) {
                        inherited.push((address.clone(), s.clone()));
                    }
                }
            }
            let mut script = script_ref.borrow_mut();
            for (address, s) in inherited {
                if !script.dependencies.contains_key(&address) {
                    script.dependencies.insert(address, s);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    trace!(scripts = resolved.len(), "closed dependency sets");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Host;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        futures::executor::block_on(future)
    }

    #[test]
    fn test_script_without_imports() {
        let mut host = Host::new("home");
        let script = host
            .write_script("solo.js", "export async function main(ns) {}")
            .unwrap();
        let compiler = Compiler::new(SourceLoader);

        let module = block_on(compiler.compile(&script, host.scripts())).unwrap();
        let text = module.text().unwrap();
        assert_eq!(
            text.as_ref(),
            "export async function main(ns) {}\n//# sourceURL=home/solo.js"
        );
        let program = block_on(module.program()).unwrap();
        assert!(program.has_main());
        assert!(!program.has_autocomplete());
        assert_eq!(compiler.pool().active_compilations(), 0);
    }

    #[test]
    fn test_compile_is_idempotent_while_valid() {
        let mut host = Host::new("home");
        let script = host.write_script("a.js", "export const a = 1;").unwrap();
        let compiler = Compiler::new(SourceLoader);

        let first = block_on(compiler.compile(&script, host.scripts())).unwrap();
        let second = block_on(compiler.compile(&script, host.scripts())).unwrap();
        assert_eq!(first.address(), second.address());
        assert_eq!(compiler.pool().len(), 1);
    }

    #[test]
    fn test_imports_are_rewritten_back_to_front() {
        let mut host = Host::new("home");
        let a = host.write_script("a.js", "export const a = 1;").unwrap();
        let b = host.write_script("lib/b.js", "export const b = 2;").unwrap();
        let main = host
            .write_script(
                "main.js",
                "import { a } from \"./a.js\";\nimport { b } from '/lib/b';\nimport x from \"./missing.js\";",
            )
            .unwrap();
        let compiler = Compiler::new(SourceLoader);
        let mut in_flight = Vec::new();
        let mut resolved = Vec::new();
        compiler.resolve(&main, host.scripts(), &mut in_flight, &mut resolved);

        let a_address = a.borrow().address().unwrap().to_string();
        let b_address = b.borrow().address().unwrap().to_string();
        let text = main.borrow().module().unwrap().text().unwrap();
        assert_eq!(
            text.as_ref(),
            format!(
                "import {{ a }} from \"{a_address}\";\nimport {{ b }} from '{b_address}';\nimport x from \"./missing.js\";\n//# sourceURL=home/main.js"
            )
        );

        let main = main.borrow();
        assert_eq!(main.filename_for_address(&a_address).as_deref(), Some("a.js"));
        assert_eq!(main.filename_for_address(&b_address).as_deref(), Some("lib/b.js"));
        assert_eq!(a.borrow().dependents().len(), 1);
    }

    #[test]
    fn test_unresolved_import_fails_at_load() {
        let mut host = Host::new("home");
        let script = host
            .write_script("main.js", "import { x } from './nope.js';")
            .unwrap();
        let compiler = Compiler::new(SourceLoader);

        let err = block_on(compiler.compile(&script, host.scripts())).unwrap_err();
        assert_eq!(
            err,
            CompileError::Load {
                hostname: "home".into(),
                filename: "main.js".into(),
                message: "Failed to resolve module specifier \"./nope.js\"".into(),
            }
        );
        assert!(script.borrow().module().is_none());
        assert!(compiler.pool().is_empty());
    }

    #[test]
    fn test_syntax_error_is_a_load_error() {
        let mut host = Host::new("home");
        let script = host.write_script("bad.js", "export const = 1;").unwrap();
        let compiler = Compiler::new(SourceLoader);
        let err = block_on(compiler.compile(&script, host.scripts())).unwrap_err();
        let CompileError::Load { message, .. } = err;
        assert!(message.starts_with("SyntaxError:"), "{message}");
    }

    #[test]
    fn test_import_cycle_embeds_reserved_addresses() {
        let mut host = Host::new("home");
        let a = host
            .write_script("a.js", "import { b } from './b.js';\nexport const a = 1;")
            .unwrap();
        let b = host
            .write_script("b.js", "import { a } from './a.js';\nexport const b = 2;")
            .unwrap();
        let compiler = Compiler::new(SourceLoader);

        block_on(compiler.compile(&a, host.scripts())).unwrap();
        let a_address = a.borrow().address().unwrap().to_string();
        let b_address = b.borrow().address().unwrap().to_string();

        let a_text = a.borrow().module().unwrap().text().unwrap();
        let b_text = b.borrow().module().unwrap().text().unwrap();
        assert!(a_text.contains(&b_address));
        assert!(b_text.contains(&a_address));
        assert!(!a_text.contains("./b.js"));
        assert!(!b_text.contains("./a.js"));
        assert!(block_on(b.borrow().module().unwrap().program()).is_ok());

        // Editing either side clears both without recursing forever.
        b.borrow_mut().set_content("export const b = 3;");
        assert!(a.borrow().module().is_none());
        assert!(b.borrow().module().is_none());
        assert!(compiler.pool().is_empty());
    }

    #[test]
    fn test_revocation_waits_for_active_compilations() {
        let mut host = Host::new("home");
        let lib = host.write_script("lib.js", "export const x = 1;").unwrap();
        let compiler = Compiler::new(SourceLoader);
        block_on(compiler.compile(&lib, host.scripts())).unwrap();
        let address = lib.borrow().address().unwrap().to_string();

        let guard = compiler.pool().begin_compilation();
        lib.borrow_mut().invalidate();
        assert!(compiler.pool().contains(&address));
        drop(guard);
        assert!(!compiler.pool().contains(&address));
    }

    struct FailingLoader;

    impl ModuleLoader for FailingLoader {
        fn load(&self, _address: &str, _pool: &Rc<ResourcePool>) -> LocalBoxFuture<'static, ProgramResult> {
            async { Err(LoadError("Error: top-level throw".into())) }.boxed_local()
        }
    }

    #[test]
    fn test_load_failure_invalidates() {
        let mut host = Host::new("n00dles");
        let script = host.write_script("x.js", "throw new Error('boom');").unwrap();
        let compiler = Compiler::new(FailingLoader);
        let err = block_on(compiler.compile(&script, host.scripts())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "error loading n00dles/x.js: Error: top-level throw"
        );
        assert!(script.borrow().module().is_none());
    }
}
