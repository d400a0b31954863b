pub mod format;
pub mod output;
pub mod resolve;
pub mod walk;
