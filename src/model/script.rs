use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use super::cost_table::CostTable;
use super::host::{Host, ScriptMap};
use crate::error::HostError;
use crate::processor::ram_calc;
use crate::processor::resolver::Module;

pub type ScriptRef = Rc<RefCell<Script>>;

/// One capability-API function that contributed to a script's RAM cost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RamCostEntry {
    /// Dotted namespace path below the handle; empty for top-level functions.
    pub namespace: String,
    pub name: String,
    pub cost: f64,
}

impl RamCostEntry {
    /// `hack`, `hacknet.purchaseNode`
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// A source file on one host together with everything derived from it.
#[derive(Debug)]
pub struct Script {
    filename: String,
    hostname: String,
    code: String,
    pub(crate) module: Option<Module>,
    /// Scripts that import this one.
    pub(crate) dependents: Vec<Weak<RefCell<Script>>>,
    /// Every script this one imports directly or transitively, by address.
    pub(crate) dependencies: IndexMap<String, Weak<RefCell<Script>>>,
    ram_cost: Option<f64>,
    ram_cost_entries: Vec<RamCostEntry>,
    ram_cost_error: Option<String>,
}

impl Script {
    pub fn new(
        filename: impl Into<String>,
        code: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            hostname: hostname.into(),
            code: code.into(),
            module: None,
            dependents: Vec::new(),
            dependencies: IndexMap::new(),
            ram_cost: None,
            ram_cost_entries: Vec::new(),
            ram_cost_error: None,
        }
    }

    pub fn into_ref(self) -> ScriptRef {
        Rc::new(RefCell::new(self))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn module(&self) -> Option<&Module> {
        self.module.as_ref()
    }

    pub fn address(&self) -> Option<&str> {
        self.module.as_ref().map(Module::address)
    }

    pub fn ram_cost(&self) -> Option<f64> {
        self.ram_cost
    }

    pub fn ram_cost_entries(&self) -> &[RamCostEntry] {
        &self.ram_cost_entries
    }

    pub fn ram_cost_error(&self) -> Option<&str> {
        self.ram_cost_error.as_deref()
    }

    /// Live scripts importing this one.
    pub fn dependents(&self) -> Vec<ScriptRef> {
        self.dependents.iter().filter_map(Weak::upgrade).collect()
    }

    /// Addresses of every script this one depends on.
    pub fn dependency_addresses(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }

    /// Replace the source text; unchanged text keeps every cached result.
    pub fn set_content(&mut self, code: impl Into<String>) {
        let code = code.into();
        if code == self.code {
            return;
        }
        self.code = code;
        self.invalidate();
    }

    /// Drop the compiled module and cached RAM results, and do the same for
    /// every script that (transitively) imports this one.
    ///
    /// Dependents that are currently borrowed are part of the invalidation
    /// already in progress (an import cycle) and are skipped.
    pub fn invalidate(&mut self) {
        self.ram_cost = None;
        self.ram_cost_entries.clear();
        self.ram_cost_error = None;

        let Some(module) = self.module.take() else {
            return;
        };
        debug!(
            hostname = %self.hostname,
            filename = %self.filename,
            address = module.address(),
            "invalidating module"
        );
        module.dispose();

        for dependent in std::mem::take(&mut self.dependents) {
            let Some(dependent) = dependent.upgrade() else {
                continue;
            };
            if let Ok(mut dependent) = dependent.try_borrow_mut() {
                dependent.invalidate();
            }
        }
        self.dependencies.clear();
    }

    pub(crate) fn add_dependent(&mut self, dependent: &ScriptRef) {
        let known = self
            .dependents
            .iter()
            .any(|d| std::ptr::eq(d.as_ptr(), Rc::as_ptr(dependent)));
        if !known {
            self.dependents.push(Rc::downgrade(dependent));
        }
    }

    /// Filename of the script compiled under `address`, searching this script
    /// and its dependencies.
    pub fn filename_for_address(&self, address: &str) -> Option<String> {
        if self.address() == Some(address) {
            return Some(self.filename.clone());
        }
        let dependency = self.dependencies.get(address)?.upgrade()?;
        let filename = dependency.try_borrow().ok()?.filename.clone();
        Some(filename)
    }

    /// Cached RAM cost, computing it first when nothing is cached.
    pub fn get_ram_cost(this: &ScriptRef, scripts: &ScriptMap, costs: &CostTable) -> Option<f64> {
        if let Some(cost) = this.borrow().ram_cost {
            return Some(cost);
        }
        Script::update_ram_cost(this, scripts, costs);
        this.borrow().ram_cost
    }

    /// Run the static analysis and store its outcome.
    pub fn update_ram_cost(this: &ScriptRef, scripts: &ScriptMap, costs: &CostTable) {
        let (filename, code) = {
            let script = this.borrow();
            (script.filename.clone(), script.code.clone())
        };
        let result = ram_calc::calculate_ram_usage(&code, &filename, scripts, costs);

        let mut script = this.borrow_mut();
        match result {
            Ok(calculation) => {
                script.ram_cost = Some(calculation.cost);
                script.ram_cost_entries = calculation.entries;
                script.ram_cost_error = None;
            }
            Err(err) => {
                debug!(filename = %filename, error = %err, "RAM calculation failed");
                script.ram_cost = None;
                script.ram_cost_entries.clear();
                script.ram_cost_error = Some(err.to_string());
            }
        }
    }

    /// Remove this script from `host`, refusing while it is running there.
    pub fn delete_from_host(this: &ScriptRef, host: &mut Host) -> Result<(), HostError> {
        let filename = {
            let script = this.borrow();
            if script.hostname != host.hostname {
                return Err(HostError::WrongHost {
                    filename: script.filename.clone(),
                    owner: script.hostname.clone(),
                    host: host.hostname.clone(),
                });
            }
            script.filename.clone()
        };
        if host.is_running(&filename) {
            return Err(HostError::ScriptRunning { filename });
        }
        this.borrow_mut().invalidate();
        host.remove_script(&filename);
        Ok(())
    }
}
