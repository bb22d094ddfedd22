//! Offline trend, risk and dew point calculations

use anyhow::{Context, Result};
use colored::Colorize;
use sensor_lib::analysis::{default_bands, fit, Band, RiskClassifier};
use sensor_lib::ingest::dew_point;
use sensor_lib::Channel;
use serde::Serialize;

use crate::output::{color_level, color_risk, print_json, print_warning, OutputFormat};

/// Everything `analyze` reports
#[derive(Debug, Serialize)]
struct AnalysisReport {
    channel: Channel,
    samples: usize,
    latest: f64,
    slope: f64,
    r_squared: f64,
    intercept: f64,
    prediction: f64,
    direction: String,
    band: Band,
    level: String,
    risk_score: f64,
    risk_level: String,
}

/// Explicit band from flags, otherwise the channel default
pub fn resolve_band(
    channel: Channel,
    min: Option<f64>,
    max: Option<f64>,
    margin: Option<f64>,
) -> Result<Band> {
    let band = match (min, max) {
        (Some(min), Some(max)) => Band::new(min, max, margin.unwrap_or(1.0)),
        (None, None) => {
            let mut band = default_bands()
                .get(&channel)
                .copied()
                .with_context(|| {
                    format!("No default range for {}, pass --min and --max", channel)
                })?;
            if let Some(margin) = margin {
                band.margin = margin;
            }
            band
        }
        _ => anyhow::bail!("--min and --max must be given together"),
    };
    band.validate(channel)?;
    Ok(band)
}

/// Fit the most recent `window` values and score them
pub fn analyze(
    channel: Channel,
    values: &[f64],
    window: usize,
    band: Band,
    format: OutputFormat,
) -> Result<()> {
    let start = values.len().saturating_sub(window.max(1));
    let recent = &values[start..];
    let latest = *recent.last().context("At least one value is required")?;

    let regression = fit(recent);
    let assessment = RiskClassifier::new().assess(&regression, latest, &band);
    let level = band.classify(latest);

    let report = AnalysisReport {
        channel,
        samples: regression.samples,
        latest,
        slope: regression.slope,
        r_squared: regression.r_squared,
        intercept: regression.intercept,
        prediction: regression.prediction(),
        direction: regression.direction().to_string(),
        band,
        level: level.as_str().to_string(),
        risk_score: assessment.score,
        risk_level: assessment.level.as_str().to_string(),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{}", format!("Trend Analysis: {}", channel.label()).bold());
            println!("{}", "=".repeat(50));
            println!("Samples:      {} of {} given", report.samples, values.len());
            println!("Latest:       {:.2}{}", latest, channel.unit());
            println!(
                "Range:        {:.1}-{:.1}{} (margin {:.1})",
                band.min,
                band.max,
                channel.unit(),
                band.margin
            );
            println!("Level:        {}", color_level(level));
            println!();
            println!("{}", "Regression".bold());
            println!("{}", "-".repeat(50));
            println!("Slope:        {:.4}", report.slope);
            println!("R²:           {:.4}", report.r_squared);
            println!("Intercept:    {:.4}", report.intercept);
            println!("Next value:   {:.4}", report.prediction);
            println!("Direction:    {}", report.direction);
            println!();
            println!("{}", "Risk".bold());
            println!("{}", "-".repeat(50));
            println!("Score:        {:.3}", assessment.score);
            println!("Level:        {}", color_risk(assessment.level));

            if regression.samples < sensor_lib::analysis::MIN_SAMPLES {
                println!();
                print_warning("Too few samples for a trusted fit; slope and R² are zero");
            }
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct DewPointReport {
    temperature: f64,
    humidity: f64,
    dew_point: Option<f64>,
}

/// Magnus dew point for one temperature/humidity pair
pub fn show_dew_point(temperature: f64, humidity: f64, format: OutputFormat) -> Result<()> {
    let report = DewPointReport {
        temperature,
        humidity,
        dew_point: dew_point(temperature, humidity),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => match report.dew_point {
            Some(dp) => println!(
                "Dew point at {:.1}°C and {:.1}%: {}",
                temperature,
                humidity,
                format!("{:.1}°C", dp).cyan()
            ),
            None => print_warning("Dew point is undefined for humidity at or below 0%"),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_band_defaults_and_overrides() {
        let band = resolve_band(Channel::ProbeTemp, None, None, None).unwrap();
        assert_eq!((band.min, band.max, band.margin), (2.0, 8.0, 1.0));

        let band = resolve_band(Channel::Humidity, None, None, Some(2.0)).unwrap();
        assert_eq!(band.margin, 2.0);

        let band = resolve_band(Channel::Light, Some(100.0), Some(500.0), None).unwrap();
        assert_eq!((band.min, band.max), (100.0, 500.0));
    }

    #[test]
    fn test_resolve_band_rejects_partial_or_missing() {
        assert!(resolve_band(Channel::Light, None, None, None).is_err());
        assert!(resolve_band(Channel::Light, Some(1.0), None, None).is_err());
        assert!(resolve_band(Channel::Humidity, Some(70.0), Some(30.0), None).is_err());
    }

    #[test]
    fn test_analyze_rejects_empty_input() {
        let band = Band::new(2.0, 8.0, 1.0);
        assert!(analyze(Channel::ProbeTemp, &[], 10, band, OutputFormat::Json).is_err());
    }
}
