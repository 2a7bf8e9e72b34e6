pub mod error;
pub mod operation;
pub mod result;

pub use error::VcsError;
pub use operation::{operation, Retry, RetryPolicy, Timed, VcsOperation};
pub use result::VcsResult;
