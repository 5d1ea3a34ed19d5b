//! Language metadata shared by the HTTP surface and the router.
//!
//! - `registry`: code to English-name table with an upper-cased fallback

mod registry;

pub use registry::{LanguageInfo, LanguageRegistry};
