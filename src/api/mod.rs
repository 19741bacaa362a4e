pub mod advisory;

pub use advisory::AdvisoryClient;
