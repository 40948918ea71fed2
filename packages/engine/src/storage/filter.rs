use regex::Regex;
use thiserror::Error;

use super::{FileGroup, OutputFile};

pub const MAX_FILTER_LEN: usize = 600;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter exceeds maximum length of {MAX_FILTER_LEN} characters")]
    TooLong,
    #[error("filter contains an empty expression")]
    EmptyExpression,
    #[error("invalid expression '{expr}': {source}")]
    InvalidRegex {
        expr: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
struct Selector {
    expr: String,
    /// `None` selects every file.
    regex: Option<Regex>,
}

/// Comma-separated list of regular expressions, one per prospective child.
///
/// An empty filter selects every output file as a single group.
#[derive(Debug, Clone)]
pub struct SplitFilter {
    raw: String,
    selectors: Vec<Selector>,
}

impl SplitFilter {
    pub fn parse(filter: &str) -> Result<Self, FilterError> {
        if filter.chars().count() > MAX_FILTER_LEN {
            return Err(FilterError::TooLong);
        }

        let selectors = if filter.trim().is_empty() {
            vec![Selector {
                expr: String::new(),
                regex: None,
            }]
        } else {
            filter
                .split(',')
                .map(str::trim)
                .map(|expr| {
                    if expr.is_empty() {
                        return Err(FilterError::EmptyExpression);
                    }
                    let regex = Regex::new(expr).map_err(|source| FilterError::InvalidRegex {
                        expr: expr.to_string(),
                        source,
                    })?;
                    Ok(Selector {
                        expr: expr.to_string(),
                        regex: Some(regex),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            raw: filter.to_string(),
            selectors,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Partition `files` by expression. A file matching several expressions
    /// appears in each of their groups.
    pub fn group(&self, files: &[OutputFile]) -> Vec<FileGroup> {
        self.selectors
            .iter()
            .map(|selector| FileGroup {
                selector: selector.expr.clone(),
                files: files
                    .iter()
                    .filter(|f| selector.regex.as_ref().is_none_or(|re| re.is_match(&f.path)))
                    .cloned()
                    .collect(),
            })
            .collect()
    }
}
