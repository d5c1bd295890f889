pub mod csv_inspector;
pub mod row_validator;

pub use csv_inspector::{CsvFileInspector, CsvInspection, FileLimits, FileValidationError};
pub use row_validator::{FieldIssue, RowValidator, ValidatedRow};
