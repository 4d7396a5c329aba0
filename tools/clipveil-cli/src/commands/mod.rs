pub mod check;
pub mod compose;
pub mod fetch;
pub mod mask;
pub mod queue;
pub mod upload;
