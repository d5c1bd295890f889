pub mod batch_import_in_memory;
pub mod batch_import_postgres;
pub mod catalog_in_memory;
