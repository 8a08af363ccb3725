pub mod api;
pub mod fitting;
pub mod task;
