pub mod parking;
pub mod payment;

// Re-export models for easier access
pub use parking::*;
pub use payment::*;
