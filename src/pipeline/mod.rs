//! Pipeline stages for formula rasterisation.
//!
//! Each submodule implements exactly one step, so each can be tested
//! without the others and without the network.
//!
//! ## Data Flow
//!
//! ```text
//! document ──▶ matcher ──▶ identify ──▶ fetch ──▶ rewrite ──▶ document
//!  (read)      (regex)     (md5 id)    (HTTP)    (templates)   (write)
//!
//! after all documents: preamble (tree-wide adjustbox declaration)
//! ```
//!
//! 1. [`document`] — discover `.tex` files, read them, write them back atomically
//! 2. [`matcher`]  — extract equation environments and keyword-bearing inline math
//! 3. [`identify`] — content-address each fragment to `<download_path>/<id>.png`
//! 4. [`fetch`]    — download missing images with bounded concurrency and
//!    retry; the only stage with network I/O
//! 5. [`rewrite`]  — substitute fragments with `\includegraphics` templates
//! 6. [`preamble`] — declare `adjustbox` where the tree lacks it

pub mod document;
pub mod fetch;
pub mod identify;
pub mod matcher;
pub mod preamble;
pub mod rewrite;
