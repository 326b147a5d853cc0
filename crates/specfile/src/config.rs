//! Parser options.

use serde::{Deserialize, Serialize};

/// How detector samples of one acquisition point are laid out on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McaLayout {
    /// Every sample of a point sits on the point's own line.
    SingleLine,
    /// Samples may spill over the following numeric lines, and `@A`
    /// spectra ending in `\` continue on the next line.
    #[default]
    Continuation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    #[serde(default)]
    pub mca_layout: McaLayout,
    /// Treat surplus tokens on a data line as a column count mismatch
    /// instead of dropping them with a warning.
    #[serde(default)]
    pub strict_columns: bool,
}

impl ParseOptions {
    pub fn with_layout(mut self, layout: McaLayout) -> Self {
        self.mca_layout = layout;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_columns = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let opts: ParseOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, ParseOptions::default());
        assert_eq!(opts.mca_layout, McaLayout::Continuation);

        let opts: ParseOptions =
            serde_json::from_str(r#"{"mca_layout":"single_line","strict_columns":true}"#).unwrap();
        assert_eq!(opts.mca_layout, McaLayout::SingleLine);
        assert!(opts.strict_columns);
    }
}
