use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("WebDriver session could not be created: {0}")]
    Session(#[from] fantoccini::error::NewSessionError),

    #[error("Browser command failed: {0}")]
    Browser(String),

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Element is no longer attached to the page")]
    StaleElement,

    #[error("Timed out after {secs:.1}s waiting for {what}")]
    Timeout { what: String, secs: f64 },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScraperError {
    /// Stale elements skip the row; everything else is handled by the caller.
    pub fn is_stale(&self) -> bool {
        matches!(self, ScraperError::StaleElement)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ScraperError::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ScraperError::Timeout { .. })
    }
}

impl From<fantoccini::error::CmdError> for ScraperError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        use fantoccini::error::{CmdError, ErrorStatus};

        let text = err.to_string();
        match &err {
            _ if err.is_no_such_element() => ScraperError::NotFound(text),
            CmdError::Standard(wd) if matches!(wd.error, ErrorStatus::StaleElementReference) => {
                ScraperError::StaleElement
            }
            CmdError::WaitTimeout => ScraperError::Timeout {
                what: "browser wait".to_string(),
                secs: 0.0,
            },
            _ if text.contains("stale element") => ScraperError::StaleElement,
            _ => ScraperError::Browser(text),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ScraperError::StaleElement.is_stale());
        assert!(ScraperError::NotFound(".x".into()).is_not_found());
        assert!(ScraperError::Timeout { what: "next page".into(), secs: 1.0 }.is_timeout());
        assert!(!ScraperError::Config("bad".into()).is_stale());
    }

    #[test]
    fn test_webdriver_statuses_are_classified() {
        use fantoccini::error::{CmdError, ErrorStatus, WebDriver};

        let missing = ScraperError::from(CmdError::Standard(WebDriver::new(
            ErrorStatus::NoSuchElement,
            "no such element",
        )));
        assert!(missing.is_not_found(), "{:?}", missing);

        let stale = ScraperError::from(CmdError::Standard(WebDriver::new(
            ErrorStatus::StaleElementReference,
            "stale element reference",
        )));
        assert!(stale.is_stale(), "{:?}", stale);

        let intercepted = ScraperError::from(CmdError::Standard(WebDriver::new(
            ErrorStatus::ElementClickIntercepted,
            "click intercepted",
        )));
        assert!(matches!(intercepted, ScraperError::Browser(_)));
    }

    #[test]
    fn test_timeout_message() {
        let err = ScraperError::Timeout { what: "listing".into(), secs: 15.0 };
        assert_eq!(err.to_string(), "Timed out after 15.0s waiting for listing");
    }
}
