pub mod document;
pub mod package;
pub mod xml;
