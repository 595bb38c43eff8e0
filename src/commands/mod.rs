pub mod invocation;
pub mod sync;

pub use invocation::{parse_endpoint, Invocation, Mode};
pub use sync::{execute, run_invocation};
