pub mod screening;
pub mod task_store;

pub use screening::ScreenController;
pub use task_store::TaskStore;
