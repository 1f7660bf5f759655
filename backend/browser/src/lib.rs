pub mod chromium;
pub mod driver;
pub mod fake;
pub mod scripts;

pub use chromium::ChromiumDriver;
pub use driver::{BrowserDriver, BrowserHandle, LaunchOptions, Page};
pub use fake::FakeDriver;
