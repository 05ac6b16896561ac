//! Master CSV output: header management and per-unit row aggregation.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::CampaignError;
use crate::io::terminate_last_line;

/// Column header of the master output, 34 fields.
pub const OUTPUT_HEADER: &str = "input_id,link,title,category,address,open_hours,popular_times,\
website,phone,plus_code,review_count,review_rating,reviews_per_rating,latitude,longitude,cid,\
status,descriptions,reviews_link,thumbnail,timezone,price_range,data_id,place_id,images,\
reservations,order_online,menu,owner,complete_address,about,user_reviews,\
user_reviews_extended,emails";

/// Appends worker artifacts to the master output file.
///
/// Rows are opaque text; only the first line of each artifact is treated
/// specially (as its header).
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    output_path: PathBuf,
}

impl ResultAggregator {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn aggregation_err(&self, source: std::io::Error) -> CampaignError {
        CampaignError::Aggregation {
            path: self.output_path.clone(),
            source,
        }
    }

    /// Write the header iff the master file is missing or empty.
    ///
    /// Returns whether the header was written.
    pub fn ensure_header(&self) -> Result<bool, CampaignError> {
        let has_content = fs::metadata(&self.output_path)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if has_content {
            return Ok(false);
        }

        if let Some(parent) = self
            .output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            fs::create_dir_all(parent).map_err(|e| self.aggregation_err(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .map_err(|e| self.aggregation_err(e))?;
        file.write_all(format!("{}\n", OUTPUT_HEADER).as_bytes())
            .map_err(|e| self.aggregation_err(e))?;

        tracing::info!("Wrote CSV header to {}", self.output_path.display());
        Ok(true)
    }

    /// Append the data rows of a worker artifact, dropping its header.
    ///
    /// A missing or empty artifact, or one holding only a header line,
    /// contributes nothing. Returns the number of rows appended.
    pub fn append_artifact(&self, artifact: &Path) -> Result<usize, CampaignError> {
        let file = match fs::File::open(artifact) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(self.aggregation_err(e)),
        };

        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| self.aggregation_err(e))?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }

        if lines.len() <= 1 {
            return Ok(0);
        }

        let rows = &lines[1..];
        let mut buf = String::with_capacity(rows.iter().map(|r| r.len() + 1).sum());
        for row in rows {
            buf.push_str(row.trim_end_matches('\r'));
            buf.push('\n');
        }

        if terminate_last_line(&self.output_path).map_err(|e| self.aggregation_err(e))? {
            tracing::warn!(
                "{} ended mid-row; terminated it before appending",
                self.output_path.display()
            );
        }

        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .map_err(|e| self.aggregation_err(e))?;
        out.write_all(buf.as_bytes())
            .map_err(|e| self.aggregation_err(e))?;

        Ok(rows.len())
    }

    /// Number of data rows currently in the master file (header excluded).
    pub fn count_rows(&self) -> Result<usize, CampaignError> {
        let file = match fs::File::open(&self.output_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(self.aggregation_err(e)),
        };

        let mut count = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| self.aggregation_err(e))?;
            if !line.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count.saturating_sub(1))
    }
}
