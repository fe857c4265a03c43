pub mod catalog;
pub mod emlc;
pub mod envelope;
pub mod error;
pub mod extractor;
pub mod position;
pub mod xml;

pub use catalog::{IconCatalog, TypeCodeCatalog};
pub use envelope::{parse_envelope, render_envelope};
pub use error::ContentError;
pub use extractor::{ContentExtractor, ContentVariant, prepare_message};
pub use position::{apply_position, reposition};
