//! The functional core: parsing, RAM analysis and module compilation.
pub mod ast;
pub mod lexer;
pub mod lookup;
pub mod ram_calc;
pub mod resolver;
pub mod resource;
pub mod script_parser;

use anyhow::Result;
use tracing::{info, warn};

use crate::error::HostError;
use crate::model::{CompiledModule, CostTable, Host, Script, ScriptRam, ScriptRef};
use resolver::{Compiler, SourceLoader};

/// The scripts a run works on: every script on `host`, or the named ones.
pub fn select_scripts(host: &Host, files: &[String]) -> Result<Vec<ScriptRef>> {
    if files.is_empty() {
        return Ok(host.scripts().values().cloned().collect());
    }
    let mut selected = Vec::with_capacity(files.len());
    for filename in files {
        let script = host
            .get_script(filename)
            .ok_or_else(|| HostError::NotFound {
                filename: filename.clone(),
                host: host.hostname.clone(),
            })?;
        selected.push(script);
    }
    Ok(selected)
}

/// Static RAM cost of each script, cached on the script.
pub fn ram_usage(host: &Host, scripts: &[ScriptRef], costs: &CostTable) -> Vec<ScriptRam> {
    let mut report = Vec::with_capacity(scripts.len());
    for script in scripts {
        let ram = Script::get_ram_cost(script, host.scripts(), costs);
        let script = script.borrow();
        if let Some(error) = script.ram_cost_error() {
            warn!(filename = script.filename(), error, "cannot compute RAM usage");
        }
        report.push(ScriptRam {
            filename: script.filename().to_string(),
            ram,
            entries: script.ram_cost_entries().to_vec(),
            error: script.ram_cost_error().map(str::to_string),
        });
    }
    info!(hostname = %host.hostname, scripts = report.len(), "RAM analysis done");
    report
}

/// Compile each script with the default loader, collecting texts and errors.
pub async fn compile(host: &Host, scripts: &[ScriptRef]) -> Vec<CompiledModule> {
    let compiler = Compiler::new(SourceLoader);
    let mut modules = Vec::with_capacity(scripts.len());
    for script in scripts {
        let filename = script.borrow().filename().to_string();
        let compiled = match compiler.compile(script, host.scripts()).await {
            Ok(module) => {
                let exports = match module.program().await {
                    Ok(program) => program.exports.clone(),
                    Err(_) => Vec::new(),
                };
                let script = script.borrow();
                let dependencies = script
                    .dependency_addresses()
                    .filter_map(|address| script.filename_for_address(address))
                    .collect();
                CompiledModule {
                    filename,
                    address: Some(module.address().to_string()),
                    text: module.text().map(|text| text.to_string()),
                    exports,
                    dependencies,
                    error: None,
                }
            }
            Err(err) => {
                warn!(error = %err, "compile failed");
                CompiledModule {
                    filename,
                    address: None,
                    text: None,
                    exports: Vec::new(),
                    dependencies: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        };
        modules.push(compiled);
    }
    info!(
        hostname = %host.hostname,
        modules = modules.len(),
        addresses = compiler.pool().len(),
        "compilation done"
    );
    modules
}
