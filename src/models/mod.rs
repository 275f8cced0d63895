pub mod analysis;
pub mod batch;
pub mod response;

pub use analysis::*;
pub use batch::*;
pub use response::*;
