pub mod errors;
pub mod staging;

pub use errors::StagingError;
pub use staging::{detect_format, export_shape, import_named, import_shape};
