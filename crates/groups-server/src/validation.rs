use std::collections::BTreeMap;
use std::fmt;

use groups_shared::api::FieldError;

/// Every field-level failure found while validating one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors {
    model: &'static str,
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new(model: &'static str) -> Self {
        Self {
            model,
            errors: Vec::new(),
        }
    }

    pub fn single(model: &'static str, error: FieldError) -> Self {
        Self {
            model,
            errors: vec![error],
        }
    }

    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn into_meta(self) -> BTreeMap<String, FieldError> {
        self.errors
            .into_iter()
            .map(|error| (error.path.clone(), error))
            .collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation failed", self.model)?;
        for (i, error) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { ", " };
            write!(f, "{}{}: {}", sep, error.path, error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

pub fn required(path: &str) -> FieldError {
    FieldError::new(path, "required", format!("Path `{}` is required.", path))
}
