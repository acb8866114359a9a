use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::overlay::{FixtureTransform, OverlayOptions};
use crate::error::OverlayError;
use crate::orm::{ConnectionHandle, ModelHandle, Record};

/// One fixture entry: the model it belongs to and the raw column values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub model: String,
    pub data: Record,
}

impl FixtureRecord {
    pub fn new(model: impl Into<String>, data: Record) -> Self {
        Self {
            model: model.into(),
            data,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FixtureDocument {
    Records(Vec<FixtureRecord>),
    Wrapped { fixtures: Vec<FixtureRecord> },
}

#[derive(Clone, Default)]
pub struct FixtureOptions {
    pub logging: bool,
    pub transform: Option<FixtureTransform>,
}

impl fmt::Debug for FixtureOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureOptions")
            .field("logging", &self.logging)
            .field("transform", &self.transform.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl FixtureOptions {
    pub fn from_overlay(options: &OverlayOptions) -> Self {
        Self {
            logging: options.logging,
            transform: options.transform_fixture_data.clone(),
        }
    }
}

/// Parses one fixture file: a JSON array of records, or an object with a
/// `fixtures` array.
pub async fn read_fixture_file(path: &Path) -> Result<Vec<FixtureRecord>, OverlayError> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|e| OverlayError::io("read fixture file", path, e))?;
    let document: FixtureDocument = serde_json::from_slice(&body).map_err(|e| {
        OverlayError::fixture(format!("{} is not a valid fixture file: {e}", path.display()))
    })?;
    Ok(match document {
        FixtureDocument::Records(records) => records,
        FixtureDocument::Wrapped { fixtures } => fixtures,
    })
}

/// Loads fixture files in order. All files are parsed and every model name
/// resolved before the first insert. Returns the number of inserted records.
pub async fn load_fixture_files<P: AsRef<Path>>(
    connection: &ConnectionHandle,
    paths: &[P],
    options: &FixtureOptions,
) -> Result<usize, OverlayError> {
    let mut records = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let parsed = read_fixture_file(path).await?;
        debug!(
            "fixtures=read path={} records={}",
            path.display(),
            parsed.len()
        );
        records.extend(parsed);
    }
    load_fixtures(connection, records, options).await
}

pub async fn load_fixture_file(
    connection: &ConnectionHandle,
    path: &Path,
    options: &FixtureOptions,
) -> Result<usize, OverlayError> {
    load_fixture_files(connection, &[path], options).await
}

/// Inserts already parsed records in order.
///
/// A record whose primary key is given and already stored is skipped, so
/// loading the same set twice inserts nothing the second time.
pub async fn load_fixtures(
    connection: &ConnectionHandle,
    records: Vec<FixtureRecord>,
    options: &FixtureOptions,
) -> Result<usize, OverlayError> {
    let resolved: Vec<(ModelHandle, FixtureRecord)> = records
        .into_iter()
        .map(|record| Ok((connection.model(&record.model)?, record)))
        .collect::<Result<_, OverlayError>>()?;

    let total = resolved.len();
    let mut inserted = 0;
    for (model, record) in resolved {
        let data = match &options.transform {
            Some(transform) => transform(&record.model, record.data)?,
            None => record.data,
        };
        if already_stored(&model, &data).await? {
            debug!("fixtures=skip model={} reason=exists", record.model);
            continue;
        }
        model.create(data).await?;
        inserted += 1;
    }

    if options.logging {
        info!(
            "fixtures=loaded connection={} records={} inserted={} skipped={}",
            connection.id(),
            total,
            inserted,
            total - inserted
        );
    }
    Ok(inserted)
}

async fn already_stored(model: &ModelHandle, data: &Record) -> Result<bool, OverlayError> {
    let definition = model.definition()?;
    let Some((pk, _)) = definition.primary_key() else {
        return Ok(false);
    };
    match data.get(pk) {
        Some(value) if !value.is_null() => Ok(model.find_by_pk(value.clone()).await?.is_some()),
        _ => Ok(false),
    }
}
