//! Data model: scripts, hosts, the API cost table and run reports.
mod cost_table;
mod host;
mod report;
mod script;

pub use cost_table::{BASE_COST, CostNode, CostTable, MAX_COST};
pub use host::{Host, RunningScript, ScriptArg, ScriptMap, normalize_script_filename};
pub use report::{CompiledModule, ProcessedHost, ScriptRam};
pub use script::{RamCostEntry, Script, ScriptRef};
