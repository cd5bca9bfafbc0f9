mod classify;

pub use classify::{ErrorClass, ErrorKind};
pub use http::StatusCode;
