use async_trait::async_trait;
use serde::Deserialize;

use chronicle_core::{Event, TimeSpan};

use crate::traits::{typed_options, SourceAdapter, SourceError};

pub const DUMMY_SOURCE: &str = "dummy";

/// Takes no options; any key is rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DummyOptions {}

/// A source that never has events. Handy for checking that a database and
/// configuration work end to end.
#[derive(Debug, Default)]
pub struct DummySource;

#[async_trait]
impl SourceAdapter for DummySource {
    fn identifier(&self) -> &str {
        DUMMY_SOURCE
    }

    fn configure(&mut self, options: &serde_json::Value) -> Result<(), SourceError> {
        let _: DummyOptions = typed_options(DUMMY_SOURCE, options)?;
        Ok(())
    }

    async fn fetch(&self, _span: &TimeSpan) -> Result<Vec<Event>, SourceError> {
        Ok(Vec::new())
    }
}
