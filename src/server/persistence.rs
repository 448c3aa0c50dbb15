use crate::{
    common::data::MockParams,
    server::{
        persistence::Error::{DeserializationError, FileReadError},
        state,
        state::StateManager,
    },
};
use serde::Deserialize;
use serde_yaml::{Deserializer, Value as YamlValue};
use std::{
    fs::{read_dir, read_to_string},
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot read from mock file: {0}")]
    FileReadError(String),
    #[error("cannot create static mock from '{file}': {source}")]
    StateError {
        file: String,
        #[source]
        source: state::Error,
    },
    #[error("cannot deserialize YAML: {0}")]
    DeserializationError(String),
}

/// Creates a mock for every YAML document in every `.yaml` or `.yml` file of the directory.
/// Seeds go through the same validation as mocks created over the admin API, so the first
/// invalid seed aborts the startup.
///
/// Returns the number of created mocks.
pub fn read_static_mock_definitions<S>(dir: PathBuf, state: &S) -> Result<usize, Error>
where
    S: StateManager + Send + Sync + 'static,
{
    let mut count = 0;

    for file_path in yaml_files(&dir)? {
        tracing::info!(
            "Loading static mock file from '{}'",
            file_path.to_string_lossy()
        );

        let content = read_to_string(&file_path).map_err(|err| FileReadError(err.to_string()))?;

        for params in deserialize_mock_params_from_yaml(&content)? {
            state
                .create_mock(params)
                .map_err(|source| Error::StateError {
                    file: file_path.to_string_lossy().to_string(),
                    source,
                })?;
            count += 1;
        }
    }

    Ok(count)
}

fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let entries = read_dir(dir).map_err(|err| {
        FileReadError(format!(
            "cannot list files in directory '{}': {}",
            dir.to_string_lossy(),
            err
        ))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| FileReadError(err.to_string()))?.path();
        let is_yaml = path
            .extension()
            .map_or(false, |ext| "yaml".eq(ext) || "yml".eq(ext));

        if path.is_file() && is_yaml {
            files.push(path);
        }
    }

    // Mock ids follow file order, so keep it stable across platforms.
    files.sort();

    Ok(files)
}

pub fn deserialize_mock_params_from_yaml(yaml_content: &str) -> Result<Vec<MockParams>, Error> {
    let mut definitions = Vec::new();

    for document in Deserializer::from_str(yaml_content) {
        let value = YamlValue::deserialize(document)
            .map_err(|err| DeserializationError(err.to_string()))?;

        if value.is_null() {
            continue;
        }

        let params: MockParams =
            serde_yaml::from_value(value).map_err(|err| DeserializationError(err.to_string()))?;

        definitions.push(params);
    }

    Ok(definitions)
}
