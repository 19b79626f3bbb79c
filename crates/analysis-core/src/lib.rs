pub mod dashboard;
pub mod result;
pub mod types;

pub use dashboard::*;
pub use result::*;
pub use types::*;
