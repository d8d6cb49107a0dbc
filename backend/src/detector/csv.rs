use shared::PredictionClass;

/// First row of the detector's predictions CSV: `imageName,classification,score`.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRow {
    pub image_name: String,
    pub classification: PredictionClass,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CsvParseError {
    #[error("expected 3 comma-separated fields in prediction row, found {0}")]
    FieldCount(usize),
    #[error("prediction score is not a number: '{0}'")]
    InvalidScore(String),
}

/// Parses the first line of the CSV. Unknown labels decode to `PredictionClass::Unknown`.
pub fn parse_prediction_row(content: &str) -> Result<PredictionRow, CsvParseError> {
    let first_line = content.split('\n').next().unwrap_or_default().trim_end_matches('\r');
    let fields: Vec<&str> = first_line.split(',').collect();
    let [image_name, classification, score] = fields.as_slice() else {
        return Err(CsvParseError::FieldCount(fields.len()));
    };

    let score = score.trim();
    let score = score
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite())
        .ok_or_else(|| CsvParseError::InvalidScore(score.to_string()))?;

    Ok(PredictionRow {
        image_name: image_name.trim().to_string(),
        classification: PredictionClass::from_label(classification),
        score,
    })
}
