//! Three-way text merge
//!
//! Both sides are diffed line by line against the common ancestor with
//! `similar`; change hunks that touch the same ancestor region are merged
//! into one region and either resolve trivially (only one side changed it,
//! or both made the same change) or become a conflict block.

use crate::conflicts::{write_conflict_block, ConflictLabels};
use similar::{capture_diff_slices, Algorithm, DiffTag};
use std::ops::Range;
use std::path::Path;
use tracing::debug;
use wc_core::{IoResultExt, Result};

/// How much of a text is sniffed for NUL bytes
const BINARY_SNIFF_LEN: usize = 8000;

/// Result classification of a three-way text merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The merged text is identical to the local text
    Unchanged,
    /// Incoming changes were applied cleanly
    Merged,
    /// At least one conflict block was written
    Conflicted,
    /// Content is not mergeable text; the local text is left alone
    NoMerge,
}

/// Options for a text merge
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub labels: ConflictLabels,
    /// Include the ancestor section in conflict blocks
    pub show_base: bool,
}

/// Merge result
#[derive(Debug, Clone)]
pub struct TextMerge {
    pub outcome: MergeOutcome,
    pub merged: Vec<u8>,
    pub conflicts: usize,
}

/// A changed region: ancestor lines `base` were replaced by side lines `side`
#[derive(Debug, Clone)]
struct Hunk {
    base: Range<usize>,
    side: Range<usize>,
}

/// Check for NUL bytes near the start of the content
pub fn is_binary(data: &[u8]) -> bool {
    data[..data.len().min(BINARY_SNIFF_LEN)].contains(&0)
}

/// Split into lines, keeping terminators
pub fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    data.split_inclusive(|b| *b == b'\n').collect()
}

fn hunks(base: &[&[u8]], side: &[&[u8]]) -> Vec<Hunk> {
    let mut hunks: Vec<Hunk> = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, base, side) {
        let (tag, old, new) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            continue;
        }
        match hunks.last_mut() {
            Some(last) if last.base.end == old.start && last.side.end == new.start => {
                last.base.end = old.end;
                last.side.end = new.end;
            }
            _ => hunks.push(Hunk {
                base: old,
                side: new,
            }),
        }
    }
    hunks
}

fn overlaps(hunk: &Hunk, start: usize, end: usize) -> bool {
    hunk.base.start < end || hunk.base.start == start
}

/// Side lines covering the ancestor region `start..end`, if the side changed it
fn side_range(hunks: &[Hunk], start: usize, end: usize) -> Option<Range<usize>> {
    let first = hunks.first()?;
    let last = hunks.last()?;
    Some(first.side.start - (first.base.start - start)..last.side.end + (end - last.base.end))
}

/// Three-way merge of `mine` and `yours` against their ancestor `older`
pub fn merge_text(older: &[u8], mine: &[u8], yours: &[u8], options: &MergeOptions) -> TextMerge {
    if is_binary(older) || is_binary(mine) || is_binary(yours) {
        return TextMerge {
            outcome: MergeOutcome::NoMerge,
            merged: mine.to_vec(),
            conflicts: 0,
        };
    }
    if mine == yours || older == yours {
        return finish(mine, mine.to_vec(), 0);
    }
    if older == mine {
        return finish(mine, yours.to_vec(), 0);
    }

    let base = split_lines(older);
    let a = split_lines(mine);
    let b = split_lines(yours);
    let ha = hunks(&base, &a);
    let hb = hunks(&base, &b);

    let mut out = Vec::with_capacity(mine.len().max(yours.len()));
    let mut conflicts = 0;
    let (mut i, mut j, mut pos) = (0, 0, 0);

    loop {
        let start = match (ha.get(i), hb.get(j)) {
            (None, None) => break,
            (Some(x), None) => x.base.start,
            (None, Some(y)) => y.base.start,
            (Some(x), Some(y)) => x.base.start.min(y.base.start),
        };

        // Grow the region while either side has a hunk touching it
        let (a_first, b_first) = (i, j);
        let mut end = start;
        loop {
            let mut grew = false;
            if let Some(h) = ha.get(i).filter(|h| overlaps(h, start, end)) {
                end = end.max(h.base.end);
                i += 1;
                grew = true;
            }
            if let Some(h) = hb.get(j).filter(|h| overlaps(h, start, end)) {
                end = end.max(h.base.end);
                j += 1;
                grew = true;
            }
            if !grew {
                break;
            }
        }

        extend(&mut out, &base[pos..start]);
        let a_side = side_range(&ha[a_first..i], start, end);
        let b_side = side_range(&hb[b_first..j], start, end);
        match (a_side, b_side) {
            (Some(ra), None) => extend(&mut out, &a[ra]),
            (None, Some(rb)) => extend(&mut out, &b[rb]),
            (Some(ra), Some(rb)) if a[ra.clone()] == b[rb.clone()] => extend(&mut out, &a[ra]),
            (Some(ra), Some(rb)) => {
                let base_lines = options.show_base.then(|| &base[start..end]);
                write_conflict_block(&mut out, &a[ra], base_lines, &b[rb], &options.labels);
                conflicts += 1;
            }
            (None, None) => extend(&mut out, &base[start..end]),
        }
        pos = end;
    }
    extend(&mut out, &base[pos..]);

    debug!("diff3: {} conflict regions", conflicts);
    finish(mine, out, conflicts)
}

fn extend(out: &mut Vec<u8>, lines: &[&[u8]]) {
    for line in lines {
        out.extend_from_slice(line);
    }
}

fn finish(mine: &[u8], merged: Vec<u8>, conflicts: usize) -> TextMerge {
    let outcome = if conflicts > 0 {
        MergeOutcome::Conflicted
    } else if merged == mine {
        MergeOutcome::Unchanged
    } else {
        MergeOutcome::Merged
    };
    TextMerge {
        outcome,
        merged,
        conflicts,
    }
}

/// Merge three files on disk
pub fn merge_files(
    older: &Path,
    mine: &Path,
    yours: &Path,
    options: &MergeOptions,
) -> Result<TextMerge> {
    let older_text = std::fs::read(older).at(older)?;
    let mine_text = std::fs::read(mine).at(mine)?;
    let yours_text = std::fs::read(yours).at(yours)?;
    Ok(merge_text(&older_text, &mine_text, &yours_text, options))
}
