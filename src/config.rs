use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Grid engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Page size used when the request does not name one; 0 disables paging.
    pub default_page_size: usize,
    /// Field that identifies a row; required for export.
    pub row_id_column: Option<String>,
    /// Compute column summaries for the footer.
    pub user_data_on_footer: bool,
    /// chrono formats accepted for date-formatted filter values.
    pub date_input_formats: Vec<String>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            row_id_column: None,
            user_data_on_footer: false,
            date_input_formats: vec!["%d.%m.%Y".to_string(), "%d/%m/%Y".to_string()],
        }
    }
}

impl GridConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.default_page_size = page_size;
        self
    }

    pub fn with_row_id_column(mut self, column: impl Into<String>) -> Self {
        self.row_id_column = Some(column.into());
        self
    }

    pub fn with_user_data_on_footer(mut self, enabled: bool) -> Self {
        self.user_data_on_footer = enabled;
        self
    }

    pub fn with_date_input_formats(mut self, formats: Vec<impl Into<String>>) -> Self {
        self.date_input_formats = formats.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GridConfig::default();
        assert_eq!(config.default_page_size, 20);
        assert!(config.row_id_column.is_none());
        assert!(!config.user_data_on_footer);
        assert_eq!(config.date_input_formats.len(), 2);
    }

    #[test]
    fn test_from_json_partial() {
        let config = GridConfig::from_json(r#"{"row_id_column":"o.id","user_data_on_footer":true}"#).unwrap();
        assert_eq!(config.row_id_column.as_deref(), Some("o.id"));
        assert!(config.user_data_on_footer);
        assert_eq!(config.default_page_size, 20);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(GridConfig::from_json("{").is_err());
    }
}
