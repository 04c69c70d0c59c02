//! Canvas API service implementations.

mod assignment_groups;
mod progress;
mod submissions;

pub use assignment_groups::*;
pub use progress::*;
pub use submissions::*;
