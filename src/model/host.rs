use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::script::{Script, ScriptRef};
use crate::error::HostError;
use crate::processor::lookup;

/// File table of one host, keyed by filename.
pub type ScriptMap = IndexMap<String, ScriptRef>;

/// A command-line argument passed to a running script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptArg {
    Bool(bool),
    Number(f64),
    String(String),
}

impl fmt::Display for ScriptArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptArg::Bool(b) => write!(f, "{b}"),
            ScriptArg::Number(n) => write!(f, "{n}"),
            ScriptArg::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for ScriptArg {
    fn from(s: &str) -> Self {
        ScriptArg::String(s.to_string())
    }
}

impl From<f64> for ScriptArg {
    fn from(n: f64) -> Self {
        ScriptArg::Number(n)
    }
}

impl From<bool> for ScriptArg {
    fn from(b: bool) -> Self {
        ScriptArg::Bool(b)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunningScript {
    pub pid: u32,
    pub filename: String,
    pub hostname: String,
    pub args: Vec<ScriptArg>,
}

#[derive(Debug)]
pub struct Host {
    pub hostname: String,
    scripts: ScriptMap,
    /// Running instances grouped by [`lookup::script_key`].
    running: IndexMap<String, IndexMap<u32, RunningScript>>,
    next_pid: u32,
}

/// Strip a leading `/` and reject anything that is not a plain `.js` path.
pub fn normalize_script_filename(filename: &str) -> Result<String, HostError> {
    let name = filename.strip_prefix('/').unwrap_or(filename);
    let valid = name.ends_with(".js")
        && name.len() > ".js".len()
        && !name.chars().any(char::is_whitespace)
        && name
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(name.to_string())
    } else {
        Err(HostError::InvalidFilename(filename.to_string()))
    }
}

impl Host {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            scripts: ScriptMap::new(),
            running: IndexMap::new(),
            next_pid: 1,
        }
    }

    pub fn scripts(&self) -> &ScriptMap {
        &self.scripts
    }

    pub fn get_script(&self, filename: &str) -> Option<ScriptRef> {
        let name = filename.strip_prefix('/').unwrap_or(filename);
        self.scripts.get(name).cloned()
    }

    /// Create a script, or replace the content of an existing one.
    pub fn write_script(&mut self, filename: &str, code: &str) -> Result<ScriptRef, HostError> {
        let filename = normalize_script_filename(filename)?;
        if let Some(script) = self.scripts.get(&filename) {
            debug!(hostname = %self.hostname, filename = %filename, "updating script");
            script.borrow_mut().set_content(code);
            return Ok(script.clone());
        }
        debug!(hostname = %self.hostname, filename = %filename, "creating script");
        let script = Script::new(filename.clone(), code, self.hostname.clone()).into_ref();
        self.scripts.insert(filename, script.clone());
        Ok(script)
    }

    pub fn delete_script(&mut self, filename: &str) -> Result<(), HostError> {
        let script = self
            .get_script(filename)
            .ok_or_else(|| HostError::NotFound {
                filename: filename.to_string(),
                host: self.hostname.clone(),
            })?;
        Script::delete_from_host(&script, self)
    }

    pub(crate) fn remove_script(&mut self, filename: &str) -> Option<ScriptRef> {
        self.scripts.shift_remove(filename)
    }

    /// Register a running instance of `filename` and return its pid.
    pub fn run_script(&mut self, filename: &str, args: Vec<ScriptArg>) -> Result<u32, HostError> {
        let script = self
            .get_script(filename)
            .ok_or_else(|| HostError::NotFound {
                filename: filename.to_string(),
                host: self.hostname.clone(),
            })?;
        let filename = script.borrow().filename().to_string();

        let pid = self.next_pid;
        self.next_pid += 1;
        let key = lookup::script_key(&filename, &args);
        info!(hostname = %self.hostname, filename = %filename, pid, "starting script");
        self.running.entry(key).or_default().insert(
            pid,
            RunningScript {
                pid,
                filename,
                hostname: self.hostname.clone(),
                args,
            },
        );
        Ok(pid)
    }

    pub fn kill(&mut self, pid: u32) -> Option<RunningScript> {
        let key = self
            .running
            .iter()
            .find(|(_, instances)| instances.contains_key(&pid))
            .map(|(key, _)| key.clone())?;
        let instances = self.running.get_mut(&key)?;
        let killed = instances.shift_remove(&pid);
        if instances.is_empty() {
            self.running.shift_remove(&key);
        }
        if let Some(killed) = &killed {
            info!(hostname = %self.hostname, filename = %killed.filename, pid, "killed script");
        }
        killed
    }

    pub fn is_running(&self, filename: &str) -> bool {
        self.running_scripts().any(|r| r.filename == filename)
    }

    pub fn running_scripts(&self) -> impl Iterator<Item = &RunningScript> {
        self.running.values().flat_map(IndexMap::values)
    }

    pub(crate) fn running_by_key(&self, key: &str) -> Option<&IndexMap<u32, RunningScript>> {
        self.running.get(key)
    }
}
