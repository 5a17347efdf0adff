use serde::Serialize;

use super::script::RamCostEntry;

/// Everything one CLI run produced for a host, ready for the writers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessedHost {
    pub hostname: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ram: Vec<ScriptRam>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<CompiledModule>,
}

/// RAM analysis outcome for one script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptRam {
    pub filename: String,
    /// `None` when the script (or something it imports) failed to parse.
    pub ram: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<RamCostEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Compile outcome for one script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledModule {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Import-rewritten module text; written as its own file.
    #[serde(skip)]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<String>,
    /// Filenames of every script this one imports, directly or not.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
