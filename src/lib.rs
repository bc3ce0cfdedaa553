pub use error::{JudgeBoxError, JudgeBoxExit};

pub mod config;
pub mod judge;
pub mod observer;
pub mod pipeline;
pub mod record;
pub mod sandbox;
pub mod utils;

mod error;
