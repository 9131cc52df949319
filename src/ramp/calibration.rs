use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Result};
use futures::StreamExt;
use moka::future::Cache;
use tokio::fs::File;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::debug;

use super::config::CacheConfig;
use crate::error::LinkamError;

const MAX_LINE_LENGTH: usize = 1024;

/// Temperature to pump speed samples, ascending in temperature (not checked).
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    samples: Vec<(f64, f64)>,
}

impl CalibrationTable {
    pub fn new(samples: Vec<(f64, f64)>) -> Result<Self> {
        if samples.is_empty() {
            return Err(LinkamError::Calibration {
                line: 0,
                reason: "table has no samples".to_string(),
            }
            .into());
        }
        Ok(Self { samples })
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut samples = Vec::new();
        for (index, line) in text.lines().enumerate().skip(1) {
            if let Some(sample) = parse_line(index + 1, line)? {
                samples.push(sample);
            }
        }
        Self::new(samples)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(LinkamError::from)?;
        let codec = LinesCodec::new_with_max_length(MAX_LINE_LENGTH);
        let mut lines = FramedRead::new(file, codec);

        let mut samples = Vec::new();
        let mut line_no = 0;
        while let Some(line) = lines.next().await {
            line_no += 1;
            let line = line.map_err(|e| LinkamError::Calibration {
                line: line_no,
                reason: e.to_string(),
            })?;
            if line_no == 1 {
                continue;
            }
            if let Some(sample) = parse_line(line_no, &line)? {
                samples.push(sample);
            }
        }

        debug!(
            "Loaded {} calibration samples from {}",
            samples.len(),
            path.display()
        );
        Self::new(samples)
    }

    pub fn samples(&self) -> &[(f64, f64)] {
        &self.samples
    }

    /// Piecewise-linear lookup. Temperatures outside the table take the
    /// nearest endpoint value; NaN yields NaN.
    pub fn interpolate(&self, temperature: f64) -> f64 {
        if temperature.is_nan() {
            return f64::NAN;
        }
        let (first_t, first_p) = self.samples[0];
        let (last_t, last_p) = self.samples[self.samples.len() - 1];
        if temperature <= first_t {
            return first_p;
        }
        if temperature >= last_t {
            return last_p;
        }

        let upper = self
            .samples
            .partition_point(|(t, _)| *t <= temperature)
            .clamp(1, self.samples.len() - 1);
        let (t0, p0) = self.samples[upper - 1];
        let (t1, p1) = self.samples[upper];
        if t1 == t0 {
            return p1;
        }
        p0 + (p1 - p0) * (temperature - t0) / (t1 - t0)
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<Option<(f64, f64)>> {
    let mut fields = line.split_whitespace();
    let Some(first) = fields.next() else {
        return Ok(None);
    };
    let second = fields.next().ok_or_else(|| LinkamError::Calibration {
        line: line_no,
        reason: "expected two columns".to_string(),
    })?;

    let parse = |field: &str| {
        field.parse::<f64>().map_err(|e| LinkamError::Calibration {
            line: line_no,
            reason: format!("{:?}: {}", field, e),
        })
    };
    Ok(Some((parse(first)?, parse(second)?)))
}

#[derive(Clone)]
pub struct CalibrationCache {
    tables: Cache<PathBuf, Arc<CalibrationTable>>,
}

impl CalibrationCache {
    pub fn new(config: &CacheConfig) -> Self {
        let tables = Cache::builder()
            .max_capacity(config.capacity)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();
        Self { tables }
    }

    /// Returns the cached table or loads it. Failed loads are not cached.
    pub async fn get(&self, path: &Path) -> Result<Arc<CalibrationTable>> {
        self.tables
            .try_get_with(path.to_path_buf(), async {
                CalibrationTable::load(path).await.map(Arc::new)
            })
            .await
            .map_err(|shared| Arc::try_unwrap(shared).unwrap_or_else(|e| anyhow!("{:#}", e)))
    }

    pub async fn invalidate(&self, path: &Path) {
        self.tables.invalidate(path).await;
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.tables.contains_key(path)
    }
}
