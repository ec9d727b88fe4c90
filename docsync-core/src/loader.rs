//! Document loader: read the watched file and parse it into a [`Payload`].
//!
//! `.json` files go through `serde_json`; everything else is treated as YAML
//! (a superset of JSON for our purposes). No retries happen here: a read that
//! races an in-progress editor write fails this cycle and the next settle
//! signal gets a fresh attempt.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::LoadError;
use crate::types::Payload;

/// Read and parse the document at `path`.
pub fn load_document(path: &Path) -> Result<Payload, LoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(path, &contents)
}

/// Parse already-read `contents`; `path` picks the format and labels errors.
pub fn parse_document(path: &Path, contents: &str) -> Result<Payload, LoadError> {
    let parse_err = |message: String| LoadError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let value = if is_json(path) {
        serde_json::from_str::<Value>(contents).map_err(|e| parse_err(e.to_string()))?
    } else if contents.trim().is_empty() {
        // An empty YAML document is an empty mapping, not `null`.
        Value::Object(Map::new())
    } else {
        let mut yaml: serde_yaml::Value =
            serde_yaml::from_str(contents).map_err(|e| parse_err(e.to_string()))?;
        // `<<` merge keys are left as literal entries unless applied explicitly.
        yaml.apply_merge().map_err(|e| parse_err(e.to_string()))?;
        serde_json::to_value(yaml).map_err(|e| parse_err(e.to_string()))?
    };

    Payload::try_from(value).map_err(|_| LoadError::NotAMapping {
        path: path.to_path_buf(),
    })
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
