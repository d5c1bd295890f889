pub mod batch_import_job;
pub mod catalog_schema;
pub mod product_command;
pub mod row_error;
