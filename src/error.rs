//! Domain error taxonomy. Call sites that need to branch on error *kind*
//! (retry, wait primitives, pre-flight) match on this enum; the CLI layer
//! wraps it in `anyhow::Error` at the boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("conflict updating {0}")]
    Conflict(String),

    /// A 429/408-shaped response that carried an explicit retry-after
    /// hint (structured `retryAfterSeconds`, or an HTTP header given as
    /// integer seconds or an RFC-1123 date). The retry combinator uses
    /// `retry_after` in place of its computed backoff for the *next*
    /// wait.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<std::time::Duration>,
    },

    #[error("timed out waiting for {what}: last observed {last_status}")]
    Timeout { what: String, last_status: String },

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("ceph command failed ({command}): {stderr}")]
    RemoteCommandFailure { command: String, stderr: String },

    #[error("failed to decode output of {command}: {source}")]
    Decode {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Kube(kube::Error),
}

/// Converts a raw `kube::Error` into the domain taxonomy. 429/408
/// responses are promoted to `RateLimited` so the retry combinator can
/// honor a server-hinted delay instead of always falling back to its
/// own computed backoff; everything else keeps the transparent `Kube`
/// wrapper.
impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        let wrapped = Error::Kube(err);
        match wrapped.status_code() {
            Some(429) | Some(408) => match wrapped {
                Error::Kube(kube::Error::Api(resp)) => Error::RateLimited {
                    retry_after: retry_after_hint(&resp),
                    message: resp.message,
                },
                other => other,
            },
            _ => wrapped,
        }
    }
}

/// Kubernetes normally signals a retry delay via `details.retryAfterSeconds`
/// on the `Status` object, but `kube`'s `ErrorResponse` does not surface
/// `details`. The apiserver also embeds the same count in `message` for
/// throttled requests (e.g. "... wait for 2 seconds before retrying");
/// fall back to parsing that since it is the only hint this client can see.
fn retry_after_hint(resp: &kube::core::ErrorResponse) -> Option<std::time::Duration> {
    let marker = "wait for ";
    let start = resp.message.find(marker)? + marker.len();
    let digits: String = resp.message[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u64>().ok().map(std::time::Duration::from_secs)
}

/// How the retry combinator (`crate::retry`) should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    Retry,
    Terminal,
}

impl Error {
    /// Classifies this error for the retry combinator: 5xx retries;
    /// 429/408 are already promoted to `RateLimited` by `From<kube::Error>`
    /// and retry there; other 4xx are terminal; cancellation is terminal;
    /// unclassified/transport errors are treated as retryable (a
    /// deliberately permissive default; see DESIGN.md Open Questions).
    pub fn retry_kind(&self) -> RetryKind {
        match self {
            Error::Cancelled(_) => RetryKind::Terminal,
            Error::Validation(_) | Error::NotFound(_) | Error::Decode { .. } => {
                RetryKind::Terminal
            }
            Error::Conflict(_) | Error::Transient(_) | Error::RateLimited { .. } => {
                RetryKind::Retry
            }
            Error::Timeout { .. } => RetryKind::Terminal,
            Error::RemoteCommandFailure { .. } => RetryKind::Terminal,
            Error::Kube(kube_err) => classify_kube_error(kube_err),
        }
    }

    /// Status code carried by the error, when it is HTTP-shaped. Used to
    /// pull a `Retry-After` hint when present.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Kube(kube::Error::Api(resp)) => Some(resp.code),
            _ => None,
        }
    }

    /// The server-signalled retry-after duration, if this error carried one.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

fn classify_kube_error(err: &kube::Error) -> RetryKind {
    match err {
        // 429/408 never reach this arm in practice: `From<kube::Error>`
        // promotes them to `RateLimited` before they are wrapped as `Kube`.
        kube::Error::Api(resp) => match resp.code {
            code if code >= 500 => RetryKind::Retry,
            400..=499 => RetryKind::Terminal,
            _ => RetryKind::Retry,
        },
        // Transport/hyper errors and anything else unclassified: retry.
        // The underlying source treats a bare "connection refused" as
        // retryable too; we preserve that permissive behaviour here.
        _ => RetryKind::Retry,
    }
}

pub type Result<T> = std::result::Result<T, Error>;
