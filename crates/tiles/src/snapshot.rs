use std::io::{Read, Write};

use model::TileGrid;
use serde::{Deserialize, Serialize};

use crate::CompressError;
use crate::dedup::{DedupRecord, DedupTable};

/// Serialized dedup table, stored next to the compiled atlas so later builds can skip the
/// pairwise scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupSnapshot {
    pub columns: u32,
    pub unique_count: usize,
    /// Width in pixels of the compacted atlas this table produced.
    pub compacted_width: u32,
    pub minimized: bool,
    pub records: Vec<DedupRecord>,
}

impl DedupSnapshot {
    pub fn new(table: &DedupTable, compacted_width: u32, minimized: bool) -> Self {
        Self {
            columns: table.grid().columns(),
            unique_count: table.unique_count(),
            compacted_width,
            minimized,
            records: table.records().to_vec(),
        }
    }

    /// A snapshot taken with a different minimization setting indexes a different atlas.
    pub const fn is_compatible(&self, minimized: bool) -> bool {
        self.minimized == minimized
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), CompressError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn read_json<R: Read>(reader: R) -> Result<Self, CompressError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn to_json_string(&self) -> Result<String, CompressError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CompressError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Rebuilds the table for an atlas of `grid`, validating the stored records.
    pub fn into_table(self, grid: TileGrid) -> Result<DedupTable, CompressError> {
        if self.columns != grid.columns() {
            return Err(CompressError::SnapshotMismatch {
                expected: grid.tile_count(),
                found: self.records.len(),
            });
        }
        let table = DedupTable::from_records(grid, self.records)?;
        if table.unique_count() != self.unique_count {
            return Err(CompressError::SnapshotMismatch {
                expected: self.unique_count,
                found: table.unique_count(),
            });
        }
        Ok(table)
    }
}
