pub mod batch_import_job_repository;
pub mod catalog_repository;

pub use batch_import_job_repository::{BatchImportJobRepository, BatchImportListParams};
pub use catalog_repository::CatalogRepository;
