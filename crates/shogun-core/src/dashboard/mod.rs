//! Section-aware editing of the shared dashboard document.
//!
//! The dashboard is a markdown file whose `## ` headings name sections such
//! as "In Progress" or "Results". Edits locate a section by a keyword in its
//! heading, then work on that section's line range only. Every other line
//! is preserved byte-for-byte.

mod document;
mod template;

pub use document::{Document, HEADING_MARKER, Section, table_row};
pub use template::DEFAULT_TEMPLATE;
