//! Conflict marker handling
//!
//! This module provides utilities for:
//! - Emitting diff3-style conflict blocks into merged text
//! - Detecting leftover conflict markers
//! - Parsing conflict regions back out of a file

use std::io::Write;

/// Conflict marker strings (diff3-compatible)
pub const CONFLICT_MARKER_START: &str = "<<<<<<<";
pub const CONFLICT_MARKER_BASE: &str = "|||||||";
pub const CONFLICT_MARKER_SEPARATOR: &str = "=======";
pub const CONFLICT_MARKER_END: &str = ">>>>>>>";

/// Labels printed after the markers of each conflict block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictLabels {
    pub mine: String,
    pub older: String,
    pub theirs: String,
}

impl ConflictLabels {
    /// Labels naming the backup files of a text conflict
    pub fn for_revisions(old_rev: Option<u64>, new_rev: u64) -> Self {
        let older = match old_rev {
            Some(rev) => format!(".r{}", rev),
            None => ".older".to_string(),
        };
        Self {
            mine: ".mine".to_string(),
            older,
            theirs: format!(".r{}", new_rev),
        }
    }

    /// Replace labels with configured overrides
    pub fn with_overrides(
        mut self,
        mine: Option<&str>,
        older: Option<&str>,
        theirs: Option<&str>,
    ) -> Self {
        if let Some(label) = mine {
            self.mine = label.to_string();
        }
        if let Some(label) = older {
            self.older = label.to_string();
        }
        if let Some(label) = theirs {
            self.theirs = label.to_string();
        }
        self
    }
}

/// Append one conflict block to `out`
///
/// # Format
/// ```text
/// <<<<<<< .mine
/// local lines
/// ||||||| .r1
/// original lines
/// =======
/// incoming lines
/// >>>>>>> .r2
/// ```
/// The base section is only written when `base` is given.
pub fn write_conflict_block(
    out: &mut Vec<u8>,
    mine: &[&[u8]],
    base: Option<&[&[u8]]>,
    theirs: &[&[u8]],
    labels: &ConflictLabels,
) {
    // Writes into a Vec cannot fail
    let _ = writeln!(out, "{} {}", CONFLICT_MARKER_START, labels.mine);
    push_lines(out, mine);
    if let Some(base) = base {
        let _ = writeln!(out, "{} {}", CONFLICT_MARKER_BASE, labels.older);
        push_lines(out, base);
    }
    let _ = writeln!(out, "{}", CONFLICT_MARKER_SEPARATOR);
    push_lines(out, theirs);
    let _ = writeln!(out, "{} {}", CONFLICT_MARKER_END, labels.theirs);
}

fn push_lines(out: &mut Vec<u8>, lines: &[&[u8]]) {
    for line in lines {
        out.extend_from_slice(line);
    }
    // Keep the next marker on its own line
    if !out.is_empty() && out.last() != Some(&b'\n') {
        out.push(b'\n');
    }
}

/// Check if content still contains conflict markers
pub fn has_conflict_markers(content: &[u8]) -> bool {
    let text = String::from_utf8_lossy(content);
    let mut start = false;
    for line in text.lines() {
        if line.starts_with(CONFLICT_MARKER_START) {
            start = true;
        } else if start && line.starts_with(CONFLICT_MARKER_END) {
            return true;
        }
    }
    false
}

/// Count the number of conflict regions
pub fn count_conflicts(content: &str) -> usize {
    content
        .lines()
        .filter(|line| line.starts_with(CONFLICT_MARKER_START))
        .count()
}

/// One conflict region found in a file
#[derive(Debug, Clone)]
pub struct ConflictRegion {
    /// Start line number (1-indexed)
    pub start_line: usize,
    /// End line number (1-indexed)
    pub end_line: usize,
    pub ours: String,
    pub base: Option<String>,
    pub theirs: String,
}

#[derive(Clone, Copy)]
enum Section {
    Ours,
    Base,
    Theirs,
}

/// Parse conflict regions from file content
pub fn parse_conflict_regions(content: &str) -> Vec<ConflictRegion> {
    let mut regions = Vec::new();
    let lines: Vec<&str> = content.lines().collect();

    let mut i = 0;
    while i < lines.len() {
        if lines[i].starts_with(CONFLICT_MARKER_START) {
            let start_line = i + 1;
            let mut ours = String::new();
            let mut base: Option<String> = None;
            let mut theirs = String::new();
            let mut section = Section::Ours;

            i += 1;
            while i < lines.len() {
                let line = lines[i];
                if line.starts_with(CONFLICT_MARKER_BASE) {
                    section = Section::Base;
                    base = Some(String::new());
                } else if line.starts_with(CONFLICT_MARKER_SEPARATOR) {
                    section = Section::Theirs;
                } else if line.starts_with(CONFLICT_MARKER_END) {
                    regions.push(ConflictRegion {
                        start_line,
                        end_line: i + 1,
                        ours,
                        base,
                        theirs,
                    });
                    break;
                } else {
                    let target = match section {
                        Section::Ours => &mut ours,
                        Section::Base => base.get_or_insert_with(String::new),
                        Section::Theirs => &mut theirs,
                    };
                    if !target.is_empty() {
                        target.push('\n');
                    }
                    target.push_str(line);
                }
                i += 1;
            }
        }
        i += 1;
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> ConflictLabels {
        ConflictLabels::for_revisions(Some(1), 2)
    }

    #[test]
    fn test_write_conflict_block() {
        let mut out = Vec::new();
        let mine: [&[u8]; 1] = [b"local\n"];
        let base: [&[u8]; 1] = [b"base\n"];
        let theirs: [&[u8]; 1] = [b"remote"];
        write_conflict_block(&mut out, &mine, Some(&base), &theirs, &labels());
        let content = String::from_utf8(out).unwrap();
        assert_eq!(
            content,
            "<<<<<<< .mine\nlocal\n||||||| .r1\nbase\n=======\nremote\n>>>>>>> .r2\n"
        );
    }

    #[test]
    fn test_label_overrides() {
        let labels = labels().with_overrides(Some("WORKING"), None, Some("INCOMING"));
        assert_eq!(labels.mine, "WORKING");
        assert_eq!(labels.older, ".r1");
        assert_eq!(labels.theirs, "INCOMING");
        assert_eq!(ConflictLabels::for_revisions(None, 3).older, ".older");
    }

    #[test]
    fn test_has_conflict_markers() {
        assert!(!has_conflict_markers(b"normal content"));
        assert!(has_conflict_markers(
            b"<<<<<<< .mine\ncontent\n=======\nother\n>>>>>>> .r2\n"
        ));
        // An end marker alone is not a conflict
        assert!(!has_conflict_markers(b">>>>>>> quoted\n"));
    }

    #[test]
    fn test_parse_conflict_regions() {
        let content = r#"some code
<<<<<<< .mine
local version
||||||| .r1
original version
=======
remote version
>>>>>>> .r2
more code
"#;

        let regions = parse_conflict_regions(content);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].start_line, 2);
        assert_eq!(regions[0].end_line, 8);
        assert_eq!(regions[0].ours, "local version");
        assert_eq!(regions[0].base.as_deref(), Some("original version"));
        assert_eq!(regions[0].theirs, "remote version");
    }

    #[test]
    fn test_count_conflicts() {
        let content = "<<<<<<< A\n=======\n>>>>>>> B\nsome code\n<<<<<<< A\n=======\n>>>>>>> B\n";
        assert_eq!(count_conflicts(content), 2);
    }
}
