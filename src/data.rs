//! Sample and weight loading for the training demo.

use std::fs;
use std::path::Path;

use log::debug;
use rand::Rng;

use crate::engine::Value;
use crate::error::DataError;

/// A labelled point. Labels are `-1.0` or `1.0`.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub features: Vec<f64>,
    pub label: f64,
}

impl Sample {
    /// Fresh leaf values for the features.
    pub fn inputs(&self) -> Vec<Value> {
        self.features.iter().map(|&x| Value::from(x)).collect()
    }
}

fn read(path: &Path) -> Result<String, DataError> {
    fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses `x1,x2,label` rows. Blank lines are skipped.
pub fn parse_samples(text: &str, path: &Path) -> Result<Vec<Sample>, DataError> {
    let parse_error = |line: usize, message: String| DataError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut samples = Vec::new();
    for (index, row) in text.lines().enumerate() {
        let line = index + 1;
        if row.trim().is_empty() {
            continue;
        }

        let fields = row
            .split(',')
            .map(|field| field.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| parse_error(line, e.to_string()))?;

        let Some((&label, features)) = fields.split_last() else {
            return Err(parse_error(line, "empty row".to_string()));
        };
        if features.len() != 2 {
            return Err(parse_error(
                line,
                format!("expected 3 fields, got {}", fields.len()),
            ));
        }
        if label != 1.0 && label != -1.0 {
            return Err(parse_error(line, format!("label must be -1 or 1, got {}", label)));
        }

        samples.push(Sample {
            features: features.to_vec(),
            label,
        });
    }

    if samples.is_empty() {
        return Err(DataError::Empty(path.to_path_buf()));
    }

    Ok(samples)
}

pub fn load_samples(path: &Path) -> Result<Vec<Sample>, DataError> {
    let samples = parse_samples(&read(path)?, path)?;
    debug!("loaded {} samples from {:?}", samples.len(), path);

    Ok(samples)
}

/// Parses a comma (or whitespace) separated list of floats.
pub fn parse_weights(text: &str, path: &Path) -> Result<Vec<f64>, DataError> {
    let weights = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
        .enumerate()
        .map(|(index, field)| {
            field.parse::<f64>().map_err(|e| DataError::Parse {
                path: path.to_path_buf(),
                line: 1,
                message: format!("weight {}: {}", index, e),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if weights.is_empty() {
        return Err(DataError::Empty(path.to_path_buf()));
    }

    Ok(weights)
}

pub fn load_weights(path: &Path) -> Result<Vec<f64>, DataError> {
    let weights = parse_weights(&read(path)?, path)?;
    debug!("loaded {} weights from {:?}", weights.len(), path);

    Ok(weights)
}

/// Points in `[-1.5, 1.5)²`, labelled `1` inside the unit circle and `-1` outside.
pub fn synthetic_samples<R: Rng>(count: usize, rng: &mut R) -> Vec<Sample> {
    (0..count)
        .map(|_| {
            let x1 = rng.gen_range(-1.5..1.5_f64);
            let x2 = rng.gen_range(-1.5..1.5_f64);
            let label = if x1 * x1 + x2 * x2 < 1.0 { 1.0 } else { -1.0 };

            Sample {
                features: vec![x1, x2],
                label,
            }
        })
        .collect()
}
