//! Text delta windows and the sink that applies them
//!
//! A delta is a stream of windows. Each window rebuilds one contiguous
//! chunk of the new text from a view of the old text (`CopySource`), from
//! bytes already produced in the same window (`CopyTarget`), and from
//! literal bytes (`NewData`). `None` ends the stream.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use wc_core::{Checksum, IncrementalHasher, IoResultExt, Result, WcError};

/// Default size of windows built from full texts
pub const DEFAULT_WINDOW_SIZE: usize = 100 * 1024;

/// One instruction of a delta window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeltaOp {
    /// Copy from the source view
    CopySource { offset: u64, len: u64 },
    /// Copy from the target produced so far in this window; may overlap itself
    CopyTarget { offset: u64, len: u64 },
    /// Take the next `len` bytes of `new_data`
    NewData { len: u64 },
}

/// One delta window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaWindow {
    pub source_offset: u64,
    pub source_len: u64,
    pub target_len: u64,
    pub ops: Vec<DeltaOp>,
    #[serde(default)]
    pub new_data: Vec<u8>,
}

fn malformed(reason: &str) -> WcError {
    WcError::ProtocolViolation(format!("malformed delta window: {}", reason))
}

fn span(offset: u64, len: u64, limit: usize) -> Result<std::ops::Range<usize>> {
    let start = usize::try_from(offset).map_err(|_| malformed("offset overflow"))?;
    let len = usize::try_from(len).map_err(|_| malformed("length overflow"))?;
    let end = start.checked_add(len).ok_or_else(|| malformed("range overflow"))?;
    if end > limit {
        return Err(malformed("range outside its buffer"));
    }
    Ok(start..end)
}

impl DeltaWindow {
    /// Window that carries `data` literally
    pub fn literal(data: &[u8]) -> Self {
        Self {
            source_offset: 0,
            source_len: 0,
            target_len: data.len() as u64,
            ops: vec![DeltaOp::NewData {
                len: data.len() as u64,
            }],
            new_data: data.to_vec(),
        }
    }

    /// Rebuild this window's target chunk and append it to `target`
    pub fn apply(&self, source: &[u8], target: &mut Vec<u8>) -> Result<()> {
        let view = &source[span(self.source_offset, self.source_len, source.len())?];
        let expected = usize::try_from(self.target_len).map_err(|_| malformed("target overflow"))?;
        let mut out: Vec<u8> = Vec::with_capacity(expected);
        let mut data_pos = 0usize;

        for op in &self.ops {
            match *op {
                DeltaOp::CopySource { offset, len } => {
                    out.extend_from_slice(&view[span(offset, len, view.len())?]);
                }
                DeltaOp::CopyTarget { offset, len } => {
                    let start = usize::try_from(offset).map_err(|_| malformed("offset overflow"))?;
                    if start >= out.len() && len > 0 {
                        return Err(malformed("target copy starts past produced data"));
                    }
                    let len = usize::try_from(len).map_err(|_| malformed("length overflow"))?;
                    match out.len().checked_add(len) {
                        Some(end) if end <= expected => {}
                        _ => return Err(malformed("window produces more than target_len")),
                    }
                    // Byte at a time: the copy may read what it is writing
                    for i in 0..len {
                        let byte = out[start + i];
                        out.push(byte);
                    }
                }
                DeltaOp::NewData { len } => {
                    let range = span(data_pos as u64, len, self.new_data.len())?;
                    data_pos = range.end;
                    out.extend_from_slice(&self.new_data[range]);
                }
            }
            if out.len() > expected {
                return Err(malformed("window produces more than target_len"));
            }
        }

        if out.len() != expected {
            return Err(malformed("window produces less than target_len"));
        }
        target.extend_from_slice(&out);
        Ok(())
    }
}

/// Literal windows carrying a full text
pub fn text_windows(text: &[u8], window_size: usize) -> Vec<DeltaWindow> {
    text.chunks(window_size.max(1))
        .map(DeltaWindow::literal)
        .collect()
}

/// Single window turning `source` into `target`
///
/// Shared prefix and suffix are copied from the source; the middle is sent
/// literally.
pub fn delta_window(source: &[u8], target: &[u8]) -> DeltaWindow {
    let prefix = source
        .iter()
        .zip(target)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = source[prefix..]
        .iter()
        .rev()
        .zip(target[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let middle = &target[prefix..target.len() - suffix];
    let mut ops = Vec::new();
    if prefix > 0 {
        ops.push(DeltaOp::CopySource {
            offset: 0,
            len: prefix as u64,
        });
    }
    if !middle.is_empty() {
        ops.push(DeltaOp::NewData {
            len: middle.len() as u64,
        });
    }
    if suffix > 0 {
        ops.push(DeltaOp::CopySource {
            offset: (source.len() - suffix) as u64,
            len: suffix as u64,
        });
    }

    DeltaWindow {
        source_offset: 0,
        source_len: source.len() as u64,
        target_len: target.len() as u64,
        ops,
        new_data: middle.to_vec(),
    }
}

/// Receiver of a delta stream
pub trait WindowHandler {
    /// Handle one window; `None` marks the end of the stream
    fn handle_window(&mut self, window: Option<&DeltaWindow>) -> Result<()>;
}

/// Reconstructed text waiting in the administrative `tmp/` directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedText {
    pub path: PathBuf,
    pub checksum: Checksum,
    pub len: u64,
}

/// Slot shared between a sink and the file it belongs to
pub type StagedSlot = Arc<Mutex<Option<StagedText>>>;

/// Sink that applies windows against a source text into a staging file
pub struct ApplyDelta {
    source: Vec<u8>,
    path: PathBuf,
    out: Option<BufWriter<File>>,
    hasher: Option<IncrementalHasher>,
    len: u64,
    scratch: Vec<u8>,
    slot: StagedSlot,
}

impl ApplyDelta {
    pub fn new(source: Vec<u8>, path: PathBuf, slot: StagedSlot) -> Result<Self> {
        let file = File::create(&path).at(&path)?;
        Ok(Self {
            source,
            path,
            out: Some(BufWriter::new(file)),
            hasher: Some(IncrementalHasher::new()),
            len: 0,
            scratch: Vec::new(),
            slot,
        })
    }

    fn finish(&mut self) -> Result<()> {
        let (out, hasher) = match (self.out.take(), self.hasher.take()) {
            (Some(out), Some(hasher)) => (out, hasher),
            _ => return Err(WcError::ProtocolViolation("delta stream ended twice".into())),
        };
        let file = out
            .into_inner()
            .map_err(|e| WcError::io(&self.path, e.into_error()))?;
        file.sync_all().at(&self.path)?;

        let staged = StagedText {
            path: self.path.clone(),
            checksum: hasher.finalize(),
            len: self.len,
        };
        debug!("Staged {} bytes in {}", staged.len, staged.path.display());
        *self.slot.lock() = Some(staged);
        Ok(())
    }
}

impl WindowHandler for ApplyDelta {
    fn handle_window(&mut self, window: Option<&DeltaWindow>) -> Result<()> {
        let window = match window {
            Some(window) => window,
            None => return self.finish(),
        };
        let (out, hasher) = match (self.out.as_mut(), self.hasher.as_mut()) {
            (Some(out), Some(hasher)) => (out, hasher),
            _ => {
                return Err(WcError::ProtocolViolation(
                    "delta window after end of stream".into(),
                ))
            }
        };

        self.scratch.clear();
        window.apply(&self.source, &mut self.scratch)?;
        out.write_all(&self.scratch).at(&self.path)?;
        hasher.update(&self.scratch);
        self.len += self.scratch.len() as u64;
        Ok(())
    }
}

/// Feed every window and the end marker into a handler
pub fn send_windows(handler: &mut dyn WindowHandler, windows: &[DeltaWindow]) -> Result<()> {
    for window in windows {
        handler.handle_window(Some(window))?;
    }
    handler.handle_window(None)
}
