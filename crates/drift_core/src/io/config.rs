use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::config::Configuration;
use crate::error::{SimError, SimResult};

impl Configuration {
    /// Load a JSON configuration document from disk.
    pub fn load_from_path(path: &Path) -> SimResult<Self> {
        let file = File::open(path).map_err(|err| {
            SimError::Io(std::io::Error::new(
                err.kind(),
                format!("failed to open configuration file {}: {err}", path.display()),
            ))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Deserialize a configuration document from an arbitrary reader.
    pub fn from_reader<R: Read>(reader: R) -> SimResult<Self> {
        Self::from_value(serde_json::from_reader(reader)?)
    }
}
