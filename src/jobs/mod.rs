pub mod client;
pub mod kinds;
pub mod machine;
pub mod session;
pub mod sse;
pub mod stream;
