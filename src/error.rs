//! Error surface for the scrape and search pipeline
//!
//! Every failure that crosses the HTTP boundary is one of these kinds.
//! The wire name (`kind()`) and the status mapping are stable; `detail`
//! text is free-form and may change.

use thiserror::Error;

/// Errors surfaced by the scrape pipeline and the search service
#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    #[error("URL could not be parsed")]
    InvalidUrl,
    #[error("only http and https URLs are supported")]
    UnsupportedProtocol,
    #[error("requests to localhost are not allowed")]
    BlockedLocalhost,
    #[error("requests to private IP ranges are not allowed")]
    BlockedPrivateIp,
    #[error("requests to private hostnames are not allowed")]
    BlockedPrivateHostname,
    #[error("hostname resolves to a private address")]
    BlockedPrivateResolution,
    #[error("response body is not HTML: {0}")]
    UnsupportedContentType(String),
    #[error("navigation failed: {0}")]
    NavigationFailed(String),
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("search upstream error: {0}")]
    UpstreamSearchError(String),
}

impl ScrapeError {
    /// Stable wire name for this error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::UnsupportedProtocol => "unsupported_protocol",
            Self::BlockedLocalhost => "blocked_localhost",
            Self::BlockedPrivateIp => "blocked_private_ip",
            Self::BlockedPrivateHostname => "blocked_private_hostname",
            Self::BlockedPrivateResolution => "blocked_private_resolution",
            Self::UnsupportedContentType(_) => "unsupported_content_type",
            Self::NavigationFailed(_) => "navigation_failed",
            Self::ExtractionFailed(_) => "extraction_failed",
            Self::UpstreamSearchError(_) => "upstream_search_error",
        }
    }

    /// HTTP status this kind maps to
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidUrl
            | Self::UnsupportedProtocol
            | Self::BlockedLocalhost
            | Self::BlockedPrivateIp
            | Self::BlockedPrivateHostname
            | Self::BlockedPrivateResolution
            | Self::UnsupportedContentType(_) => 422,
            Self::NavigationFailed(_) | Self::ExtractionFailed(_) => 500,
            Self::UpstreamSearchError(_) => 502,
        }
    }

    /// Detail string for the response body, when the kind carries one
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::UnsupportedContentType(d)
            | Self::NavigationFailed(d)
            | Self::ExtractionFailed(d)
            | Self::UpstreamSearchError(d) => Some(d.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(ScrapeError::InvalidUrl.kind(), "invalid_url");
        assert_eq!(ScrapeError::BlockedLocalhost.kind(), "blocked_localhost");
        assert_eq!(
            ScrapeError::BlockedPrivateResolution.kind(),
            "blocked_private_resolution"
        );
        assert_eq!(
            ScrapeError::UnsupportedContentType("application/pdf".into()).kind(),
            "unsupported_content_type"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ScrapeError::BlockedPrivateIp.http_status(), 422);
        assert_eq!(
            ScrapeError::NavigationFailed("timeout".into()).http_status(),
            500
        );
        assert_eq!(
            ScrapeError::UpstreamSearchError("503".into()).http_status(),
            502
        );
    }
}
