/// Sample sequence, noise scales and truncation.
pub mod sequence;
