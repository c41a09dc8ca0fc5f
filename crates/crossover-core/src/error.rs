//! Error taxonomy shared by the finder, the collaborators, and the
//! compositing pipeline.
//!
//! Callers decide isolation from the variant: a [`CrossoverError::ParseFailure`]
//! only ever disqualifies one record, while a [`CrossoverError::RateLimited`]
//! is what a retry loop gives up with after its last attempt.

use std::fmt;

#[derive(Debug)]
pub enum CrossoverError {
    /// The search service was unreachable or answered with something
    /// that could not be interpreted.
    SearchFailure(String),
    /// The remote side kept signalling "rate limited" after every
    /// allowed attempt.
    RateLimited { status: u16, attempts: u32 },
    /// One record (source scene or candidate) was malformed.
    ParseFailure { record: String, reason: String },
    /// A raster could not be fetched.
    FetchFailure(String),
    /// Transparency keying, georeference tagging, or mosaic merge failed.
    RasterBackendFailure(String),
    Io(std::io::Error),
}

impl CrossoverError {
    pub fn parse(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseFailure {
            record: record.into(),
            reason: reason.into(),
        }
    }

    pub fn raster(reason: impl Into<String>) -> Self {
        Self::RasterBackendFailure(reason.into())
    }

    /// True for the error kinds that isolate a single record rather than
    /// failing the surrounding operation.
    pub fn is_record_local(&self) -> bool {
        matches!(self, Self::ParseFailure { .. })
    }
}

impl fmt::Display for CrossoverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SearchFailure(e) => write!(f, "search failed: {e}"),
            Self::RateLimited { status, attempts } => {
                write!(f, "rate limited (HTTP {status}) after {attempts} attempts")
            }
            Self::ParseFailure { record, reason } => {
                write!(f, "could not parse record '{record}': {reason}")
            }
            Self::FetchFailure(e) => write!(f, "fetch failed: {e}"),
            Self::RasterBackendFailure(e) => write!(f, "raster backend failed: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CrossoverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CrossoverError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_record() {
        let err = CrossoverError::parse("EO1H0440342017046110KF", "missing Scene Start Time");
        assert_eq!(
            err.to_string(),
            "could not parse record 'EO1H0440342017046110KF': missing Scene Start Time"
        );
        assert!(err.is_record_local());
    }

    #[test]
    fn rate_limited_is_not_record_local() {
        let err = CrossoverError::RateLimited {
            status: 429,
            attempts: 6,
        };
        assert!(!err.is_record_local());
        assert!(err.to_string().contains("429"));
    }
}
