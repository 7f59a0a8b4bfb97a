pub mod convert;
pub mod forward;
pub mod server;
