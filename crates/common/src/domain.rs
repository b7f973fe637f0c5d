mod analytics;
mod result;
mod transaction;

pub use analytics::*;
pub use result::*;
pub use transaction::*;
