//! Nested view of one fetch cycle, used only for debug logging.
//!
//! Output paths are flat (`environment.forecast.wind.speed`); the summary
//! groups them by their first segment below the environment prefix so a whole
//! cycle reads as one compact JSON object. Emission never goes through here.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

const FORECAST_PREFIX: &str = "environment.forecast.";
const ENVIRONMENT_PREFIX: &str = "environment.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SummaryNode {
    Leaf(Value),
    Group(BTreeMap<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ForecastSummary {
    /// Set on the cycle that captured the API metadata.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub initial: bool,
    /// Unix seconds of the selected forecast slot.
    pub time: Option<i64>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, SummaryNode>,
}

impl ForecastSummary {
    pub fn new(time: Option<i64>, initial: bool) -> Self {
        Self {
            initial,
            time,
            fields: BTreeMap::new(),
        }
    }

    /// Places `value` under the group named by the path's first segment.
    /// Paths deeper than two segments are kept flat under their full key.
    pub fn insert(&mut self, path: &str, value: Value) {
        let relative = relative_path(path);
        let segments: Vec<&str> = relative.split('.').collect();
        match segments.as_slice() {
            [leaf] => {
                self.fields.insert(leaf.to_string(), SummaryNode::Leaf(value));
            }
            [group, leaf] => {
                let node = self
                    .fields
                    .entry(group.to_string())
                    .or_insert_with(|| SummaryNode::Group(BTreeMap::new()));
                // a group replaces a leaf of the same name
                if !matches!(*node, SummaryNode::Group(_)) {
                    *node = SummaryNode::Group(BTreeMap::new());
                }
                if let SummaryNode::Group(children) = node {
                    children.insert(leaf.to_string(), value);
                }
            }
            _ => {
                self.fields.insert(relative.to_string(), SummaryNode::Leaf(value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&SummaryNode> {
        self.fields.get(key)
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unrenderable summary: {}>", e))
    }
}

/// Current readings keep their `outside.` segment; forecast paths drop the
/// whole forecast prefix.
fn relative_path(path: &str) -> &str {
    let prefix = if path.contains("outside") {
        ENVIRONMENT_PREFIX
    } else {
        FORECAST_PREFIX
    };
    path.strip_prefix(prefix).unwrap_or(path)
}
