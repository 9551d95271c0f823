use anyhow::Context;
use dfile_config::CONFIG;
use dfile_core::{
    driver::Converter,
    options::{ConvertOptions, TombstonePolicy},
    source::RecordSource,
};
use dfile_dbase::{reader::dbf_path, DbaseReader};

use crate::Cli;

/// Build the run options from the command line, falling back to the
/// environment configuration.
pub fn convert_options(cli: &Cli) -> anyhow::Result<ConvertOptions> {
    let destination = match &cli.output {
        Some(name) => name.clone(),
        None => dbf_path(&cli.file)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .with_context(|| format!("cannot derive an output name from {}", cli.file.display()))?,
    };

    let mut options = ConvertOptions::new(destination)
        .with_output_dir(cli.dir.clone().unwrap_or_else(|| CONFIG.output_dir.clone()))
        .with_protect_records(cli.protect_records)
        .with_protect_file(cli.protect_file)
        .with_report_progress(!cli.terse && !cli.quiet);

    if cli.undelete {
        options = options.with_tombstones(TombstonePolicy::Emit);
    }
    if let Some(field) = cli.split {
        options = options.with_split_field(field);
    }

    let model = match (&cli.model, &cli.output) {
        (Some(model), _) => Some(model.clone()),
        (None, None) => CONFIG.default_model.clone(),
        (None, Some(_)) => None,
    };
    if let Some(model) = model {
        options = options.with_model(model);
    }

    Ok(options)
}

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let path = dbf_path(&cli.file);
    let mut reader = DbaseReader::open(&path)
        .with_context(|| format!("cannot convert {}", path.display()))?;
    let options = convert_options(cli)?;

    let header = reader.header();
    let total = header.record_count;
    if header.has_memo_store {
        tracing::info!("has memos");
    }
    tracing::info!("{} fields per record", header.fields.len());
    tracing::info!("{total} records to process");
    for (number, field) in header.fields.iter().enumerate() {
        tracing::debug!(
            field = number + 1,
            name = %field.name,
            kind = ?field.field_type,
            width = field.width,
            decimals = field.decimals,
            "field"
        );
    }

    let mut converter = Converter::new(options);
    match converter.run(&mut reader) {
        Ok(report) => {
            for partition in &report.partitions {
                tracing::info!(
                    "{}: {} records",
                    partition.store_path.display(),
                    partition.records
                );
            }
            tracing::info!(
                "{} of {} records converted",
                report.records_converted,
                total
            );
            Ok(())
        }
        Err(err) => {
            eprintln!("{}: {err}", crate::PROGRAM);
            anyhow::bail!(
                "exiting after {}/{} records.",
                converter.records_read(),
                total
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::*;

    fn options(args: &[&str]) -> ConvertOptions {
        let cli = Cli::try_parse_from(args).unwrap();
        convert_options(&cli).unwrap()
    }

    #[test]
    fn destination_defaults_to_the_table_name() {
        let options = options(&["dbf2dff", "-d", "/tmp/out", "data/parcels.dbf"]);
        assert_eq!(options.destination, "parcels");
        assert_eq!(options.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(options.tombstones, TombstonePolicy::Skip);
        assert!(options.report_progress);
    }

    #[test]
    fn dotted_table_names_keep_their_full_stem() {
        assert_eq!(options(&["dbf2dff", "v1.2"]).destination, "v1.2");
        assert_eq!(options(&["dbf2dff", "data/v1.2.dbf"]).destination, "v1.2");
    }

    #[test]
    fn flags_map_onto_options() {
        let options = options(&[
            "dbf2dff", "-pPut", "-s", "3", "-o", "lots", "-m", "cadastre", "parcels",
        ]);
        assert_eq!(options.destination, "lots");
        assert_eq!(options.model_name(), "cadastre");
        assert_eq!(options.split_field, Some(3));
        assert_eq!(options.tombstones, TombstonePolicy::Emit);
        assert!(options.protect_records);
        assert!(options.protect_file);
        assert!(!options.report_progress);
    }

    #[test]
    fn model_follows_the_output_name() {
        let options = options(&["dbf2dff", "-o", "lots", "parcels"]);
        assert_eq!(options.model_name(), "lots");
    }

    #[test]
    fn missing_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nothing");
        let cli = Cli::try_parse_from(["dbf2dff", missing.to_str().unwrap()]).unwrap();
        let err = run(&cli).unwrap_err();
        assert!(format!("{err:#}").contains("nothing.dbf"));
    }
}
