//! Transport layer: HTTP and stdio surfaces over the same tool dispatcher
//! (spec.md §6). Both are thin — the entirety of the decision logic lives
//! in `AssignmentEngine`; this module only decodes requests and encodes
//! responses.

pub mod http;
pub mod stdio;
pub mod tools;

pub use http::ApiServer;
pub use tools::AppState;
