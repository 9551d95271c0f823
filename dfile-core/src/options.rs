use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{error::DfileError, layout::MAX_MODEL_LEN, DfileResult};

/// What to do with records the source flagged as deleted.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TombstonePolicy {
    /// Drop tombstoned records without writing anything
    #[default]
    Skip,
    /// Convert tombstoned records like any other record
    Emit,
}

/// Options for one conversion run.
///
/// Only `destination` is required; everything else has a default that
/// produces a single unprotected partition named after the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Base name of the default partition's store and index
    pub destination: String,
    /// Directory all artifacts are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Model name written into every store and index header. Defaults to
    /// the destination name.
    #[serde(default)]
    pub model: Option<String>,
    /// 1-based field number to partition on
    #[serde(default)]
    pub split_field: Option<usize>,
    #[serde(default)]
    pub tombstones: TombstonePolicy,
    /// Mark every index row as protected
    #[serde(default)]
    pub protect_records: bool,
    /// Mark the index file as protected
    #[serde(default)]
    pub protect_file: bool,
    #[serde(default = "default_report_progress")]
    pub report_progress: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_report_progress() -> bool {
    true
}

impl ConvertOptions {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            output_dir: default_output_dir(),
            model: None,
            split_field: None,
            tombstones: TombstonePolicy::default(),
            protect_records: false,
            protect_file: false,
            report_progress: default_report_progress(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_split_field(mut self, field: usize) -> Self {
        self.split_field = Some(field);
        self
    }

    pub fn with_tombstones(mut self, policy: TombstonePolicy) -> Self {
        self.tombstones = policy;
        self
    }

    pub fn with_protect_records(mut self, protect: bool) -> Self {
        self.protect_records = protect;
        self
    }

    pub fn with_protect_file(mut self, protect: bool) -> Self {
        self.protect_file = protect;
        self
    }

    pub fn with_report_progress(mut self, report: bool) -> Self {
        self.report_progress = report;
        self
    }

    /// Model name in effect for this run.
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.destination)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Reject names that would corrupt a header line or escape the output
    /// directory.
    pub fn validate(&self) -> DfileResult<()> {
        let destination = self.destination.as_str();
        if destination.is_empty()
            || destination.contains(['/', '\\'])
            || destination.chars().any(char::is_control)
        {
            return Err(DfileError::InvalidOption(format!(
                "destination name {destination:?} must be a non-empty file name"
            )));
        }

        let model = self.model_name();
        if model.is_empty() || model.contains(['{', '}']) || model.chars().any(char::is_control) {
            return Err(DfileError::InvalidOption(format!(
                "model name {model:?} must be non-empty without braces or control characters"
            )));
        }
        if model.len() > MAX_MODEL_LEN {
            return Err(DfileError::InvalidOption(format!(
                "model name {model:?} is longer than {MAX_MODEL_LEN} bytes"
            )));
        }

        if self.split_field == Some(0) {
            return Err(DfileError::InvalidOption(
                "split field numbers start at 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_defaults_to_destination() {
        let options = ConvertOptions::new("parcels");
        assert_eq!(options.model_name(), "parcels");
        assert_eq!(options.with_model("soils").model_name(), "soils");
    }

    #[test]
    fn deserializes_with_defaults() {
        let options: ConvertOptions =
            serde_json::from_str(r#"{ "destination": "parcels", "tombstones": "emit" }"#).unwrap();
        assert_eq!(options.output_dir, PathBuf::from("."));
        assert_eq!(options.tombstones, TombstonePolicy::Emit);
        assert!(options.report_progress);
        assert!(!options.protect_records);
        assert_eq!(options.split_field, None);
    }

    #[test]
    fn survives_json() {
        let options = ConvertOptions::new("parcels")
            .with_output_dir("/tmp/out")
            .with_split_field(2)
            .with_protect_file(true)
            .with_report_progress(false);
        let json = serde_json::to_string(&options).unwrap();
        let back: ConvertOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }

    #[test]
    fn rejects_names_that_break_headers() {
        assert!(ConvertOptions::new("parcels").validate().is_ok());
        assert!(ConvertOptions::new("").validate().is_err());
        assert!(ConvertOptions::new("../parcels").validate().is_err());
        assert!(ConvertOptions::new("parcels")
            .with_model("bad}model")
            .validate()
            .is_err());
        assert!(ConvertOptions::new("parcels")
            .with_model("tab\tmodel")
            .validate()
            .is_err());
        assert!(ConvertOptions::new("parcels")
            .with_split_field(0)
            .validate()
            .is_err());
    }

    #[test]
    fn model_must_fit_the_store_header() {
        let longest = "m".repeat(MAX_MODEL_LEN);
        assert_eq!(MAX_MODEL_LEN, 51);
        assert!(ConvertOptions::new("parcels")
            .with_model(longest.clone())
            .validate()
            .is_ok());
        let header = crate::store::Store::<Vec<u8>>::header_line(&longest);
        assert_eq!(header.len(), crate::layout::BLOCK_LEN);
        assert!(header.ends_with("}0\n"));

        let err = ConvertOptions::new("parcels")
            .with_model("m".repeat(MAX_MODEL_LEN + 1))
            .validate()
            .unwrap_err();
        assert!(matches!(err, DfileError::InvalidOption(_)));
    }
}
