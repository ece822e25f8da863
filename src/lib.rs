pub mod client;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod duration;
pub mod error;
pub mod models;
pub mod normalize;
pub mod options;
pub mod report;
pub mod service;

pub use error::{ApiError, ValidationError};
pub use normalize::{TransactionBatch, ValidationMode};
pub use service::TransactionService;
