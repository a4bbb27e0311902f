pub mod batch;
pub mod report;
pub mod table;

pub use batch::*;
pub use report::*;
pub use table::*;
