pub mod chrome;
pub mod dummy;
pub mod registry;
pub mod traits;

pub use chrome::{ChromeOptions, ChromeSource, CHROME_SOURCE};
pub use dummy::{DummySource, DUMMY_SOURCE};
pub use registry::{
    create_adapter, ConfigFailure, RegistryError, SourceRegistry, SourcesConfig, KNOWN_SOURCES,
};
pub use traits::{typed_options, SourceAdapter, SourceError};
