//! Per-function RAM costs of the capability API.
//!
//! On disk the table is a JSON object:
//!
//! ```json
//! { "base": 1.6, "max": 1024, "functions": { "hack": 0.1, "hacknet": { "purchaseNode": 0 } } }
//! ```
//!
//! Nested objects are namespaces reachable as properties of the handle,
//! numbers are the cost of a function.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CostTableError;

pub const BASE_COST: f64 = 1.6;
pub const MAX_COST: f64 = 1024.0;

/// Representative subset of the API, used when no table is supplied.
const DEFAULT_COSTS: &[(&str, f64)] = &[
    ("hack", 0.1),
    ("grow", 0.15),
    ("weaken", 0.15),
    ("hackAnalyze", 1.0),
    ("hackAnalyzeThreads", 1.0),
    ("hackAnalyzeChance", 1.0),
    ("growthAnalyze", 1.0),
    ("weakenAnalyze", 1.0),
    ("sleep", 0.0),
    ("print", 0.0),
    ("tprint", 0.0),
    ("disableLog", 0.0),
    ("scan", 0.2),
    ("nuke", 0.05),
    ("brutessh", 0.05),
    ("ftpcrack", 0.05),
    ("relaysmtp", 0.05),
    ("httpworm", 0.05),
    ("sqlinject", 0.05),
    ("exec", 1.3),
    ("run", 1.0),
    ("spawn", 2.0),
    ("scp", 0.6),
    ("kill", 0.5),
    ("killall", 0.5),
    ("ps", 0.2),
    ("ls", 0.2),
    ("fileExists", 0.1),
    ("isRunning", 0.1),
    ("hasRootAccess", 0.05),
    ("getHackingLevel", 0.05),
    ("getServer", 2.0),
    ("getServerMaxRam", 0.05),
    ("getServerUsedRam", 0.05),
    ("getServerMaxMoney", 0.1),
    ("getServerMoneyAvailable", 0.1),
    ("getServerSecurityLevel", 0.1),
    ("getServerMinSecurityLevel", 0.1),
    ("getServerRequiredHackingLevel", 0.1),
    ("getServerNumPortsRequired", 0.1),
    ("getPurchasedServers", 1.05),
    ("getPurchasedServerCost", 0.25),
    ("purchaseServer", 2.25),
    ("deleteServer", 2.25),
    ("getPlayer", 0.5),
    ("hacknet.numNodes", 0.0),
    ("hacknet.purchaseNode", 0.0),
    ("hacknet.getPurchaseNodeCost", 0.0),
    ("hacknet.getNodeStats", 0.0),
    ("hacknet.upgradeLevel", 0.0),
    ("stock.getSymbols", 2.0),
    ("stock.getPrice", 2.0),
    ("stock.getPosition", 2.0),
    ("stock.buyStock", 2.5),
    ("stock.sellStock", 2.5),
    ("singularity.getOwnedAugmentations", 5.0),
    ("singularity.purchaseAugmentation", 5.0),
    ("singularity.installAugmentations", 5.0),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CostNode {
    Cost(f64),
    Namespace(IndexMap<String, CostNode>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostTable {
    pub base: f64,
    pub max: f64,
    #[serde(default)]
    pub functions: IndexMap<String, CostNode>,
}

impl CostTable {
    pub fn new(base: f64, max: f64) -> Self {
        Self {
            base,
            max,
            functions: IndexMap::new(),
        }
    }

    /// Insert a function by dotted path, e.g. `"hacknet.purchaseNode"`.
    pub fn insert(&mut self, path: &str, cost: f64) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(name) = segments.pop() else {
            return;
        };
        let mut level = &mut self.functions;
        for segment in segments {
            let node = level
                .entry(segment.to_string())
                .or_insert_with(|| CostNode::Namespace(IndexMap::new()));
            if let CostNode::Cost(_) = node {
                *node = CostNode::Namespace(IndexMap::new());
            }
            level = match node {
                CostNode::Namespace(children) => children,
                CostNode::Cost(_) => return,
            };
        }
        level.insert(name.to_string(), CostNode::Cost(cost));
    }

    /// Builder form of [`CostTable::insert`].
    pub fn with(mut self, path: &str, cost: f64) -> Self {
        self.insert(path, cost);
        self
    }

    /// Member `name` of the namespace at `namespace` (empty = the handle itself).
    pub fn member(&self, namespace: &[String], name: &str) -> Option<&CostNode> {
        let mut level = &self.functions;
        for segment in namespace {
            match level.get(segment) {
                Some(CostNode::Namespace(children)) => level = children,
                _ => return None,
            }
        }
        level.get(name)
    }

    /// Cost of a function by dotted path.
    pub fn cost_of(&self, path: &str) -> Option<f64> {
        let mut segments: Vec<String> = path.split('.').map(str::to_string).collect();
        let name = segments.pop()?;
        match self.member(&segments, &name)? {
            CostNode::Cost(cost) => Some(*cost),
            CostNode::Namespace(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), CostTableError> {
        check_cost("base", self.base)?;
        check_cost("max", self.max)?;
        if self.max < self.base {
            return Err(CostTableError::MaxBelowBase {
                base: self.base,
                max: self.max,
            });
        }
        validate_level(&self.functions, "")
    }
}

fn check_cost(path: &str, cost: f64) -> Result<(), CostTableError> {
    if cost.is_finite() && cost >= 0.0 {
        Ok(())
    } else {
        Err(CostTableError::InvalidCost {
            path: path.to_string(),
            cost,
        })
    }
}

fn validate_level(level: &IndexMap<String, CostNode>, prefix: &str) -> Result<(), CostTableError> {
    for (name, node) in level {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match node {
            CostNode::Cost(cost) => check_cost(&path, *cost)?,
            CostNode::Namespace(children) => validate_level(children, &path)?,
        }
    }
    Ok(())
}

impl Default for CostTable {
    fn default() -> Self {
        DEFAULT_COSTS
            .iter()
            .fold(CostTable::new(BASE_COST, MAX_COST), |table, (path, cost)| {
                table.with(path, *cost)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_namespaces_from_json() {
        let json = r#"{
            "base": 1.6,
            "max": 64,
            "functions": {
                "hack": 0.1,
                "hacknet": { "purchaseNode": 0.5, "formulas": { "cost": 2 } }
            }
        }"#;
        let table: CostTable = serde_json::from_str(json).unwrap();
        table.validate().unwrap();

        assert_eq!(table.cost_of("hack"), Some(0.1));
        assert_eq!(table.cost_of("hacknet.purchaseNode"), Some(0.5));
        assert_eq!(table.cost_of("hacknet.formulas.cost"), Some(2.0));
        assert_eq!(table.cost_of("hacknet"), None);
        assert_eq!(table.cost_of("missing"), None);
        assert!(matches!(
            table.member(&[], "hacknet"),
            Some(CostNode::Namespace(_))
        ));
    }

    #[test]
    fn test_insert_replaces_function_with_namespace() {
        let table = CostTable::new(1.0, 10.0)
            .with("a", 1.0)
            .with("a.b", 2.0);
        assert_eq!(table.cost_of("a"), None);
        assert_eq!(table.cost_of("a.b"), Some(2.0));
    }

    #[test]
    fn test_validation_errors() {
        let table = CostTable::new(2.0, 1.0);
        assert_eq!(
            table.validate(),
            Err(CostTableError::MaxBelowBase { base: 2.0, max: 1.0 })
        );

        let table = CostTable::new(1.0, 10.0).with("stock.buy", -1.0);
        assert_eq!(
            table.validate(),
            Err(CostTableError::InvalidCost {
                path: "stock.buy".into(),
                cost: -1.0
            })
        );
    }

    #[test]
    fn test_default_table_is_valid() {
        let table = CostTable::default();
        table.validate().unwrap();
        assert_eq!(table.base, BASE_COST);
        assert_eq!(table.cost_of("grow"), Some(0.15));
        assert_eq!(table.cost_of("stock.buyStock"), Some(2.5));
    }
}
