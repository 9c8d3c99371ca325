//! The `byTimestamp` view backing time-range queries

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Design document name (without the `_design/` prefix).
pub const DESIGN_NAME: &str = "Logs";

/// Reserved id of the design document.
pub const DESIGN_DOC_ID: &str = "_design/Logs";

/// View keyed by `params.timestamp`.
pub const VIEW_NAME: &str = "byTimestamp";

/// Map function of the view, evaluated by CouchDB.
pub const MAP_FUNCTION: &str = "function (doc) {\n  if (doc.resource === 'log') {\n    emit(doc.params.timestamp, doc);\n  }\n}";

/// A single view inside a design document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub map: String,
}

/// Design document holding the log views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    #[serde(rename = "_id")]
    pub id: String,
    pub views: BTreeMap<String, ViewDefinition>,
}

impl IndexDefinition {
    /// The design document this transport provisions.
    pub fn logs() -> Self {
        let mut views = BTreeMap::new();
        views.insert(
            VIEW_NAME.to_string(),
            ViewDefinition {
                map: MAP_FUNCTION.to_string(),
            },
        );
        Self {
            id: DESIGN_DOC_ID.to_string(),
            views,
        }
    }

    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn has_view(&self, name: &str) -> bool {
        self.views.contains_key(name)
    }
}
