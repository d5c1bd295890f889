pub mod cell_value;

pub use cell_value::{CellParseError, CellValue};
