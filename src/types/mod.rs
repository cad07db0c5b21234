pub mod market;
pub mod screening;

pub use market::*;
pub use screening::*;
