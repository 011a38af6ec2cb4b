//! Strategy tables.
//!
//! Only the demo strategies live here today. They produce annotator streams
//! and adjudication decisions for smoke runs of the pipeline and are never
//! consulted by consolidation, tagging or linking.

#[path = "rules/demo.rs"]
pub(crate) mod demo;
