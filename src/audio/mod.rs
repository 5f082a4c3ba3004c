pub mod bands;
pub mod decode;
pub mod features;
pub mod goertzel;
pub mod metrics;
pub mod peaks;
pub mod session;
pub mod source;
pub mod spectrum;
