//! Local modification checks against the pristine copies

use wc_core::adm::mtime_micros;
use wc_core::props::load_props;
use wc_core::{hash_file, AdmArea, Result, WorkingEntry};

/// Whether the working file differs from its pristine text
///
/// A recorded timestamp equal to the file's mtime short-circuits to
/// "unmodified". A missing working file counts as unmodified so an update
/// restores it.
pub fn text_modified(area: &AdmArea, entry: &WorkingEntry) -> Result<bool> {
    let working = area.working_path(&entry.name);
    let mtime = match mtime_micros(&working)? {
        Some(mtime) => mtime,
        None => return Ok(false),
    };
    if entry.text_time == Some(mtime) {
        return Ok(false);
    }

    let working_sum = hash_file(&working)?;
    if let Some(expected) = entry.checksum {
        return Ok(working_sum != expected);
    }
    let base = area.text_base_path(&entry.name);
    if !base.exists() {
        return Ok(true);
    }
    Ok(working_sum != hash_file(&base)?)
}

/// Whether the working properties of `name` differ from the pristine ones
pub fn props_modified(area: &AdmArea, name: &str, entry: Option<&WorkingEntry>) -> Result<bool> {
    let props_path = area.props_path(name);
    if let Some(entry) = entry {
        if entry.prop_time.is_some() && entry.prop_time == mtime_micros(&props_path)? {
            return Ok(false);
        }
    }
    Ok(load_props(&props_path)? != load_props(&area.prop_base_path(name))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use wc_core::entries::init_admin_area;
    use wc_core::props::write_props;
    use wc_core::{hash_bytes, NodeKind, PropList, WcConfig};

    fn setup() -> (tempfile::TempDir, AdmArea, WorkingEntry) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = WcConfig::default();
        let area = AdmArea::new(temp_dir.path(), &config);
        init_admin_area(&area, "http://repo", Some(1), &config).unwrap();

        fs::write(area.working_path("f"), b"text\n").unwrap();
        fs::write(area.text_base_path("f"), b"text\n").unwrap();
        let mut entry = WorkingEntry::new("f", NodeKind::File);
        entry.revision = Some(1);
        entry.checksum = Some(hash_bytes(b"text\n"));
        (temp_dir, area, entry)
    }

    #[test]
    fn test_text_modified() {
        let (_tmp, area, mut entry) = setup();
        assert!(!text_modified(&area, &entry).unwrap());

        fs::write(area.working_path("f"), b"edited\n").unwrap();
        assert!(text_modified(&area, &entry).unwrap());

        // Without a checksum the pristine file is compared
        entry.checksum = None;
        assert!(text_modified(&area, &entry).unwrap());
        fs::write(area.working_path("f"), b"text\n").unwrap();
        assert!(!text_modified(&area, &entry).unwrap());
    }

    #[test]
    fn test_matching_timestamp_short_circuits() {
        let (_tmp, area, mut entry) = setup();
        fs::write(area.working_path("f"), b"edited\n").unwrap();
        entry.text_time = mtime_micros(&area.working_path("f")).unwrap();
        assert!(!text_modified(&area, &entry).unwrap());
    }

    #[test]
    fn test_missing_working_file_is_unmodified() {
        let (_tmp, area, entry) = setup();
        fs::remove_file(area.working_path("f")).unwrap();
        assert!(!text_modified(&area, &entry).unwrap());
    }

    #[test]
    fn test_props_modified() {
        let (_tmp, area, entry) = setup();
        assert!(!props_modified(&area, "f", Some(&entry)).unwrap());

        let mut props = PropList::new();
        props.insert("p".to_string(), "v".to_string());
        write_props(&area.props_path("f"), &props).unwrap();
        assert!(props_modified(&area, "f", Some(&entry)).unwrap());

        write_props(&area.prop_base_path("f"), &props).unwrap();
        assert!(!props_modified(&area, "f", None).unwrap());
    }
}
