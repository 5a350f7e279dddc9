//! Conversion of command-line arguments into library configuration

use crate::backends::BorderKeyConfig;
use crate::cli::main_impl::{Cli, CliOutputFormat};
use crate::{
    config::{OutputFormat, SessionConfig, SessionConfigBuilder},
    types::{Rotation, Threshold},
};
use anyhow::{Context, Result};

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Webp => OutputFormat::WebP,
        }
    }
}

/// Builds session and segmenter configuration from CLI arguments.
///
/// A `--config` file provides the base values; explicit flags override them.
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    pub(crate) fn session_config(cli: &Cli) -> Result<SessionConfig> {
        let base = match &cli.config {
            Some(path) => SessionConfig::from_json_file(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?,
            None => SessionConfig::default(),
        };

        let mut builder = SessionConfigBuilder::from_config(base);
        if let Some(threshold) = cli.threshold {
            builder = builder.default_threshold(Threshold::snapped(threshold));
        }
        if let Some(format) = cli.format {
            builder = builder.output_format(format.into());
        }
        if let Some((width, height)) = cli.thumbnail_size() {
            builder = builder.thumbnail_size(width, height);
        }
        if cli.verbose > 0 {
            builder = builder.verbose_progress(true);
        }

        builder.build().context("Invalid session configuration")
    }

    pub(crate) fn border_key_config(cli: &Cli) -> Result<BorderKeyConfig> {
        let defaults = BorderKeyConfig::default();
        BorderKeyConfig::new(
            cli.tolerance.unwrap_or(defaults.tolerance),
            cli.softness.unwrap_or(defaults.softness),
            cli.min_area.unwrap_or(defaults.min_area),
        )
        .context("Invalid segmentation settings")
    }

    /// Export orientation requested with `--rotate`
    pub(crate) fn rotation(cli: &Cli) -> Result<Rotation> {
        Rotation::from_degrees(cli.rotate).with_context(|| {
            format!("Rotation must be a multiple of 90 degrees, got {}", cli.rotate)
        })
    }

    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(threshold) = cli.threshold {
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!("Threshold must be between 0.0 and 1.0, got {}", threshold);
            }
        }
        if let Some(output) = &cli.output {
            if output.is_file() {
                anyhow::bail!(
                    "Output path exists and is a file, not a directory: {}",
                    output.display()
                );
            }
        }
        Self::rotation(cli)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("subject-cutout").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_cli_config_conversion() {
        let cli = parse(&["in.png", "-t", "0.31", "--format", "png", "--thumbnail", "120x80"]);
        let config = CliConfigBuilder::session_config(&cli).unwrap();

        assert_eq!(config.default_threshold, Threshold::snapped(0.3));
        assert_eq!(config.output_format, OutputFormat::Png);
        assert_eq!(config.thumbnail_max_width, 120);
        assert_eq!(config.thumbnail_max_height, 80);
        assert!(!config.verbose_progress);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutout.json");
        std::fs::write(
            &path,
            r#"{ "default_threshold": 0.8, "thumbnail_max_width": 64 }"#,
        )
        .unwrap();

        let file_only = parse(&["in.png", "--config", path.to_str().unwrap()]);
        let config = CliConfigBuilder::session_config(&file_only).unwrap();
        assert_eq!(config.default_threshold, Threshold::snapped(0.8));
        assert_eq!(config.thumbnail_max_width, 64);

        let overridden = parse(&["in.png", "--config", path.to_str().unwrap(), "-t", "0.2", "-v"]);
        let config = CliConfigBuilder::session_config(&overridden).unwrap();
        assert_eq!(config.default_threshold, Threshold::snapped(0.2));
        assert_eq!(config.thumbnail_max_width, 64);
        assert!(config.verbose_progress);
    }

    #[test]
    fn test_border_key_overrides() {
        let cli = parse(&["in.png", "--tolerance", "0.3", "--min-area", "4"]);
        let config = CliConfigBuilder::border_key_config(&cli).unwrap();
        assert!((config.tolerance - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.min_area, 4);
        assert!((config.softness - BorderKeyConfig::default().softness).abs() < f32::EPSILON);

        let bad = parse(&["in.png", "--tolerance", "1.5"]);
        assert!(CliConfigBuilder::border_key_config(&bad).is_err());
    }

    #[test]
    fn test_cli_validation() {
        assert!(CliConfigBuilder::validate_cli(&parse(&["in.png"])).is_ok());
        assert!(CliConfigBuilder::validate_cli(&parse(&["in.png", "-t", "1.5"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["in.png", "--rotate", "45"])).is_err());
        assert_eq!(
            CliConfigBuilder::rotation(&parse(&["in.png", "--rotate", "-90"])).unwrap(),
            Rotation::Deg270
        );
    }
}
