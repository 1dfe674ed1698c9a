//! File-backed experiment tracking.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<experiment>/<run_id>/meta.json
//! <root>/<experiment>/<run_id>/params.json
//! <root>/<experiment>/<run_id>/metrics.json
//! <root>/<experiment>/<run_id>/artifacts/<artifact_path>/...
//! <root>/registry/<model name>/version-<n>.json
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::TrackingError;
use crate::model::{Preprocessor, TrainedModel};

pub const DEFAULT_EXPERIMENT: &str = "Default";
const REGISTRY_DIR: &str = "registry";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub experiment: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A handful of rows in column-split form, stored next to a logged model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputExample {
    pub columns: Vec<String>,
    pub data: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: u32,
    pub run_id: String,
    pub source: PathBuf,
    pub created_at: DateTime<Utc>,
}

fn write_record<T: Serialize>(path: &Path, value: &T) -> Result<(), TrackingError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| TrackingError::Serde {
        path: path.to_path_buf(),
        source,
    })?;

    fs::write(path, json).map_err(|source| TrackingError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn create_dir(path: &Path) -> Result<(), TrackingError> {
    fs::create_dir_all(path).map_err(|source| TrackingError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub struct RunTracker {
    root: PathBuf,
    experiment: String,
}

impl RunTracker {
    pub fn new(root: impl Into<PathBuf>, experiment: &str) -> Self {
        Self {
            root: root.into(),
            experiment: experiment.to_string(),
        }
    }

    pub fn start_run(&self) -> Result<ActiveRun, TrackingError> {
        let experiment_dir = self.root.join(&self.experiment);
        create_dir(&experiment_dir)?;

        let start_time = Utc::now();
        let base_id = start_time.format("%Y%m%d%H%M%S%6f").to_string();
        let mut run_id = base_id.clone();
        let mut suffix = 1;
        while experiment_dir.join(&run_id).exists() {
            run_id = format!("{base_id}-{suffix}");
            suffix += 1;
        }

        let dir = experiment_dir.join(&run_id);
        create_dir(&dir.join("artifacts"))?;

        let run = ActiveRun {
            meta: RunMeta {
                run_id,
                experiment: self.experiment.clone(),
                status: RunStatus::Running,
                start_time,
                end_time: None,
            },
            dir,
            registry: self.root.join(REGISTRY_DIR),
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
        };
        write_record(&run.dir.join("meta.json"), &run.meta)?;

        info!("Started run [{}] in experiment [{}]", run.meta.run_id, self.experiment);
        Ok(run)
    }
}

pub struct ActiveRun {
    meta: RunMeta,
    dir: PathBuf,
    registry: PathBuf,
    params: BTreeMap<String, String>,
    metrics: BTreeMap<String, f64>,
}

impl ActiveRun {
    pub fn run_id(&self) -> &str {
        &self.meta.run_id
    }

    pub fn log_param(&mut self, key: &str, value: impl ToString) -> Result<(), TrackingError> {
        self.params.insert(key.to_string(), value.to_string());
        write_record(&self.dir.join("params.json"), &self.params)
    }

    pub fn log_metric(&mut self, key: &str, value: f64) -> Result<(), TrackingError> {
        self.metrics.insert(key.to_string(), value);
        write_record(&self.dir.join("metrics.json"), &self.metrics)
    }

    fn artifact_dir(&self, artifact_path: &str) -> Result<PathBuf, TrackingError> {
        let dir = self.dir.join("artifacts").join(artifact_path);
        create_dir(&dir)?;
        Ok(dir)
    }

    /// Stores the model and its input example, optionally registering a new model version.
    pub fn log_model(
        &mut self,
        artifact_path: &str,
        model: &TrainedModel,
        input_example: &InputExample,
        registered_name: Option<&str>,
    ) -> Result<PathBuf, TrackingError> {
        let dir = self.artifact_dir(artifact_path)?;
        let model_path = dir.join("model.json");
        model.save(&model_path)?;
        write_record(&dir.join("input_example.json"), input_example)?;

        if let Some(name) = registered_name {
            self.register_model(name, &model_path)?;
        }

        Ok(model_path)
    }

    pub fn log_preprocessor(&mut self, artifact_path: &str, preprocessor: &Preprocessor) -> Result<PathBuf, TrackingError> {
        let path = self.artifact_dir(artifact_path)?.join("preprocessor.json");
        preprocessor.save(&path)?;
        Ok(path)
    }

    fn register_model(&self, name: &str, model_path: &Path) -> Result<ModelVersion, TrackingError> {
        let dir = self.registry.join(name);
        create_dir(&dir)?;

        let existing = fs::read_dir(&dir)
            .map_err(|source| TrackingError::Io { path: dir.clone(), source })?
            .count();

        let version = ModelVersion {
            name: name.to_string(),
            version: existing as u32 + 1,
            run_id: self.meta.run_id.clone(),
            source: model_path.to_path_buf(),
            created_at: Utc::now(),
        };
        write_record(&dir.join(format!("version-{}.json", version.version)), &version)?;

        info!("Registered model [{name}] version {}", version.version);
        Ok(version)
    }

    pub fn end(mut self, status: RunStatus) -> Result<RunMeta, TrackingError> {
        self.meta.status = status;
        self.meta.end_time = Some(Utc::now());
        write_record(&self.dir.join("meta.json"), &self.meta)?;
        Ok(self.meta)
    }
}
