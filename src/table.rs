//! Per-clump attribute tables.
//!
//! A table is indexed by clump id: row `i` holds the
//! attributes of clump `i` in every column, and row 0 is
//! the background. Columns are either integer or real.

use std::collections::BTreeMap;

use anyhow::bail;
use serde_derive::{Deserialize, Serialize};

use crate::error::CalcError;
use crate::Result;

/// Column names used by the cloud shadow fit.
pub mod columns {
    pub const HISTOGRAM: &str = "Histogram";
    pub const MIN_X: &str = "MinX";
    pub const MAX_X: &str = "MaxX";
    pub const MIN_Y: &str = "MinY";
    pub const MAX_Y: &str = "MaxY";
    pub const MIN_T: &str = "MinT";
    pub const MAX_T: &str = "MaxT";
    pub const CLOUD_BASE: &str = "CloudBase";
    pub const H_BASE_MIN: &str = "HBaseMin";
    pub const H_BASE_MAX: &str = "HBaseMax";
    pub const FIT_BASE_LINE: &str = "FitBaseLine";
    pub const NUM_PXL_OVERLAP: &str = "NumPxlOverlap";
    pub const FIT_OVERLAP: &str = "FitOverlap";
    pub const FIT_BASE_LINE_EDIT: &str = "FitBaseLineEdit";
}

/// Column access to a clump attribute table.
pub trait AttributeTable {
    fn row_count(&self) -> usize;

    fn has_column(&self, name: &str) -> bool;

    /// Read a whole column as integers. Real columns are
    /// rounded.
    fn read_int_column(&self, name: &str) -> Result<Vec<i64>>;

    /// Read a whole column as reals.
    fn read_real_column(&self, name: &str) -> Result<Vec<f64>>;

    /// Create or replace a real column. `values` must hold
    /// one value per row.
    fn write_real_column(&mut self, name: &str, values: &[f64]) -> Result<()>;

    fn write_int_column(&mut self, name: &str, values: &[i64]) -> Result<()>;
}

/// An [`AttributeTable`] held in memory.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemAttributeTable {
    rows: usize,
    ints: BTreeMap<String, Vec<i64>>,
    reals: BTreeMap<String, Vec<f64>>,
}

impl MemAttributeTable {
    /// An empty table with `rows` rows (clump ids
    /// `0..rows`).
    pub fn with_rows(rows: usize) -> Self {
        MemAttributeTable {
            rows,
            ..Default::default()
        }
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.rows {
            bail!(CalcError::Mismatch {
                what: "column length",
                found: len,
                expected: self.rows,
            });
        }
        Ok(())
    }
}

impl AttributeTable for MemAttributeTable {
    fn row_count(&self) -> usize {
        self.rows
    }

    fn has_column(&self, name: &str) -> bool {
        self.ints.contains_key(name) || self.reals.contains_key(name)
    }

    fn read_int_column(&self, name: &str) -> Result<Vec<i64>> {
        if let Some(col) = self.ints.get(name) {
            return Ok(col.clone());
        }
        match self.reals.get(name) {
            Some(col) => Ok(col.iter().map(|v| v.round() as i64).collect()),
            None => bail!(CalcError::MissingColumn(name.into())),
        }
    }

    fn read_real_column(&self, name: &str) -> Result<Vec<f64>> {
        if let Some(col) = self.reals.get(name) {
            return Ok(col.clone());
        }
        match self.ints.get(name) {
            Some(col) => Ok(col.iter().map(|v| *v as f64).collect()),
            None => bail!(CalcError::MissingColumn(name.into())),
        }
    }

    fn write_real_column(&mut self, name: &str, values: &[f64]) -> Result<()> {
        self.check_len(values.len())?;
        self.ints.remove(name);
        self.reals.insert(name.into(), values.to_vec());
        Ok(())
    }

    fn write_int_column(&mut self, name: &str, values: &[i64]) -> Result<()> {
        self.check_len(values.len())?;
        self.reals.remove(name);
        self.ints.insert(name.into(), values.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_convert() -> Result<()> {
        let mut table = MemAttributeTable::with_rows(3);
        table.write_int_column(columns::HISTOGRAM, &[0, 12, 40])?;
        table.write_real_column(columns::MIN_T, &[0., 1.6, -2.4])?;

        assert_eq!(table.read_real_column(columns::HISTOGRAM)?, vec![0., 12., 40.]);
        assert_eq!(table.read_int_column(columns::MIN_T)?, vec![0, 2, -2]);
        assert!(table.has_column(columns::MIN_T));

        let err = table.read_real_column(columns::MAX_T).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CalcError>(),
            Some(&CalcError::MissingColumn("MaxT".into()))
        );
        assert!(table.write_real_column(columns::MAX_T, &[1.]).is_err());
        Ok(())
    }
}
