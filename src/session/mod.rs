/// Run options.
pub mod opts;
/// Pipeline coordinator.
pub mod pipeline;
