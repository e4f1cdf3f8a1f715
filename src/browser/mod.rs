pub mod driver;
pub mod extension;
pub mod fingerprint;
pub mod session;
pub mod steps;
pub mod strategy;

#[cfg(test)]
pub mod testing;

// Re-export common types
pub use driver::{BrowserHandle, BrowserLauncher, PageHandle, SessionOptions};
pub use fingerprint::StealthProfile;
pub use session::WebDriverLauncher;
pub use steps::{BrowserStep, StepReplayer};
pub use strategy::BrowserFetchStrategy;
