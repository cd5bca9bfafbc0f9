use http::StatusCode;

/// Classification of a cluster API failure. Call sites declare which kinds
/// they are prepared to absorb; everything else aborts the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The object already exists (HTTP 409). Swallowed on the create path.
    Conflict,
    /// The object is absent (HTTP 404). Swallowed on the delete path.
    NotFound,
    /// A network or API-server hiccup that is safe to retry.
    Transient,
    /// Everything else: auth failures, malformed specs, exceeded timeouts.
    Fatal,
}

/// Classifies an error into an [`ErrorKind`]. Implemented for `kube::Error`
/// so that pollers and provisioners can check an explicit kind instead of
/// matching on error structure.
pub trait ErrorClass {
    fn error_kind(&self) -> ErrorKind;
}

impl ErrorClass for kube::Error {
    fn error_kind(&self) -> ErrorKind {
        match self {
            kube::Error::Api(response) => StatusCode::from_u16(response.code)
                .map(classify_status)
                .unwrap_or(ErrorKind::Fatal),
            // Transport-level failures carry no status code and are presumed
            // to be connectivity hiccups.
            kube::Error::HyperError(_) | kube::Error::Service(_) => ErrorKind::Transient,
            _ => ErrorKind::Fatal,
        }
    }
}

fn classify_status(code: StatusCode) -> ErrorKind {
    match code {
        StatusCode::CONFLICT => ErrorKind::Conflict,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => ErrorKind::Transient,
        code if code.is_server_error() => ErrorKind::Transient,
        _ => ErrorKind::Fatal,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "test".to_string(),
            code,
        })
    }

    #[test]
    fn conflict_and_not_found() {
        assert_eq!(api_error(409).error_kind(), ErrorKind::Conflict);
        assert_eq!(api_error(404).error_kind(), ErrorKind::NotFound);
    }

    #[test]
    fn transient_codes() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert_eq!(api_error(code).error_kind(), ErrorKind::Transient);
        }
    }

    #[test]
    fn fatal_codes() {
        for code in [400, 401, 403, 422] {
            assert_eq!(api_error(code).error_kind(), ErrorKind::Fatal);
        }
    }
}
