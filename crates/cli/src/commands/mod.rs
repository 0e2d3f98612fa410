pub mod project;
pub mod recover;
pub mod regions;
pub mod runs;
pub mod util;

pub use project::*;
pub use recover::*;
pub use regions::*;
pub use runs::*;
pub use util::*;
