pub mod deleted_docs;

pub use deleted_docs::{DeletedDocs, DeletedDocsFormat, DocOffset, DELETED_DOCS_SUFFIX};
