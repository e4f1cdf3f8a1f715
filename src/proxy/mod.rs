pub mod rotator;

pub use rotator::{probe, ProxyDescriptor, ProxyProvider, ProxyRotator};
