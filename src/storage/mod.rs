mod azure_blob;
mod base;
mod file;

pub use azure_blob::AzureBlobStorage;
pub use base::{get_storage, Storage};
pub use file::FileStorage;
