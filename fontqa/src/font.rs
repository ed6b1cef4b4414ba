//! Font files as check inputs.

use std::{
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
};

use checkrunner::CheckError;
use skrifa::{
    raw::{FontRef, ReadError, TableProvider},
    Tag,
};

/// A font file read into memory.
///
/// Parsing is cheap and borrows from the bytes, so we keep the bytes and
/// hand out [`FontRef`]s on demand.
pub struct TtFont {
    path: PathBuf,
    data: Vec<u8>,
}

impl TtFont {
    /// Read and validate the font at `path`.
    pub fn load(path: &Path) -> Result<TtFont, CheckError> {
        let data = fs::read(path)
            .map_err(|e| CheckError::new(format!("Unable to read {}: {e}", path.display())))?;
        TtFont::new(path, data)
    }

    pub fn new(path: &Path, data: Vec<u8>) -> Result<TtFont, CheckError> {
        FontRef::new(&data).map_err(|e| read_error(path, e))?;
        Ok(TtFont {
            path: path.to_path_buf(),
            data,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn font(&self) -> Result<FontRef<'_>, CheckError> {
        FontRef::new(&self.data).map_err(|e| read_error(&self.path, e))
    }

    pub fn has_table(&self, tag: &[u8; 4]) -> bool {
        self.font()
            .map(|font| font.table_data(Tag::new(tag)).is_some())
            .unwrap_or_default()
    }

    pub fn units_per_em(&self) -> Result<u16, CheckError> {
        let head = self.font()?.head().map_err(|e| read_error(&self.path, e))?;
        Ok(head.units_per_em())
    }

    /// Advance width of every glyph, long metrics extended by the last one.
    pub fn advances(&self) -> Result<Vec<u16>, CheckError> {
        let font = self.font()?;
        let num_glyphs = font
            .maxp()
            .map_err(|e| read_error(&self.path, e))?
            .num_glyphs();
        let hmtx = font.hmtx().map_err(|e| read_error(&self.path, e))?;
        let metrics = hmtx.h_metrics();
        let Some(last) = metrics.last() else {
            return Ok(Vec::new());
        };
        Ok((0..num_glyphs as usize)
            .map(|gid| metrics.get(gid).unwrap_or(last).advance())
            .collect())
    }
}

impl Debug for TtFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtFont")
            .field("path", &self.path)
            .field("len", &self.data.len())
            .finish()
    }
}

pub(crate) fn read_error(path: &Path, e: ReadError) -> CheckError {
    CheckError::new(format!("{}: {e}", path.display()))
}
