pub use crate::{CalcError, Error, Result};

pub use crate::align::*;
pub use crate::calc::*;
pub use crate::chunking::*;
pub use crate::geometry::*;
pub use crate::raster::*;
#[cfg(feature = "gdal")]
pub use crate::reader::*;

pub use crate::columns::*;
pub use crate::histogram::*;
pub use crate::stats::*;
pub use crate::table::{AttributeTable, MemAttributeTable};
