//! Persisted output.
//!
//! Each completed run writes one pretty-printed JSON file under the output
//! directory:
//!
//! ```text
//! output/
//! ├── articles_20250217_202900.json
//! └── companies_20250217_203512.json
//! ```

pub mod json;
