pub mod catalog;
pub mod driver;
pub mod error;
pub mod fake;
pub mod tftp;

pub use catalog::DriverCatalog;
pub use driver::{ConsoleInfo, DeployOutcome, Driver, InterfaceValidation, TearDownOutcome};
pub use error::DriverError;
pub use fake::FakeDriver;
