//! Property lists stored in the administrative area

use crate::error::{IoResultExt, Result, WcError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Name → value map for one node
pub type PropList = BTreeMap<String, String>;

/// One incoming property change; `value: None` deletes the property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropChange {
    pub name: String,
    pub value: Option<String>,
}

impl PropChange {
    pub fn set(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value.to_string()),
        }
    }

    pub fn delete(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
        }
    }
}

/// Read a property file; a missing file is an empty list
pub fn load_props(path: &Path) -> Result<PropList> {
    match std::fs::read(path) {
        Ok(data) => serde_json::from_slice(&data)
            .map_err(|e| WcError::corrupt(path, format!("unreadable property file: {}", e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PropList::new()),
        Err(e) => Err(WcError::io(path, e)),
    }
}

/// Serialize a property list into `path` (no rename; callers stage into tmp/)
pub fn write_props(path: &Path, props: &PropList) -> Result<()> {
    let data = serde_json::to_vec_pretty(props)?;
    std::fs::write(path, data).at(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let props = load_props(&temp_dir.path().join("none")).unwrap();
        assert!(props.is_empty());
    }

    #[test]
    fn test_write_then_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("p");
        let mut props = PropList::new();
        props.insert("color".to_string(), "blue".to_string());
        write_props(&path, &props).unwrap();
        assert_eq!(load_props(&path).unwrap(), props);
    }

    #[test]
    fn test_garbage_is_corruption() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("p");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            load_props(&path),
            Err(WcError::CorruptWorkingCopy { .. })
        ));
    }
}
