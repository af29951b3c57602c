//! # Codeplay Lines
//!
//! Language-aware "meaningful line" classification.
//!
//! A line is meaningful when, after trimming, it is not empty, is not a lone
//! punctuation character, and does not start with a comment marker of its
//! language family.
//!
//! ```text
//! raw line + language tag
//!     │
//!     ├──> trim, reject empty
//!     ├──> reject lone `{ } [ ] ( ) ; ,`
//!     └──> reject family comment prefix
//! ```
//!
//! ## Example
//!
//! ```rust
//! use codeplay_lines::{count_meaningful_lines, is_meaningful};
//!
//! assert!(is_meaningful("let x = 1;", "rust"));
//! assert!(!is_meaningful("// note", "rust"));
//! assert!(!is_meaningful("}", "rust"));
//!
//! let text = "fn main() {\n    // entry\n    run();\n}\n";
//! assert_eq!(count_meaningful_lines(text, "rust"), 2);
//! ```

mod classifier;
mod language;

pub use classifier::{count_meaningful_lines, is_meaningful, split_lines, TRIVIAL_PUNCTUATION};
pub use language::LanguageFamily;
