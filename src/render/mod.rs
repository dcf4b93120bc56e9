/// Raw generator output to RGB8 frames.
pub mod formatter;
/// Host frame type.
pub mod frame;
pub(crate) mod scheduler;
