//! XML serialization for documents and wire messages

pub mod model_xml;
pub mod xml;

pub use model_xml::{read_result_document, write_result_document};
pub use xml::XmlNode;
