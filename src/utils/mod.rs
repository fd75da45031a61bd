pub mod retry;
pub mod logging;
