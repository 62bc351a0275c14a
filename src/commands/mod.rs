//! CLI commands implementation

pub mod init;
pub mod query;
pub mod regions;
pub mod status;
pub mod sync;

pub use init::*;
pub use query::*;
pub use regions::*;
pub use status::*;
pub use sync::*;
