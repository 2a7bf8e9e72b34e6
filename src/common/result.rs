use crate::common::error::VcsError;

/// Result alias used across the crate.
///
/// # Examples
///
/// ```
/// use gitvcs::common::result::VcsResult;
/// use gitvcs::common::error::VcsError;
///
/// fn example_function() -> VcsResult<String> {
///     Ok("success".to_string())
/// }
///
/// fn example_with_error() -> VcsResult<()> {
///     Err(VcsError::internal_error("Something went wrong"))
/// }
/// ```
pub type VcsResult<T> = Result<T, VcsError>;

/// Conversions from `Option` into [`VcsResult`].
pub trait OptionExt<T> {
    /// Converts `None` into the given error.
    ///
    /// ```
    /// use gitvcs::common::result::{VcsResult, OptionExt};
    /// use gitvcs::common::error::VcsError;
    ///
    /// let none_value: Option<String> = None;
    /// let result: VcsResult<String> = none_value.ok_or_vcs(
    ///     VcsError::internal_error("Value not found")
    /// );
    /// assert!(result.is_err());
    /// ```
    fn ok_or_vcs(self, error: VcsError) -> VcsResult<T>;

    /// Converts `None` into a configuration error with the given message.
    fn ok_or_config_error(self, message: impl Into<String>) -> VcsResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_vcs(self, error: VcsError) -> VcsResult<T> {
        self.ok_or(error)
    }

    fn ok_or_config_error(self, message: impl Into<String>) -> VcsResult<T> {
        self.ok_or_else(|| VcsError::config_error(message))
    }
}

/// Conversions from foreign `Result` types into [`VcsResult`].
pub trait ResultExt<T, E> {
    /// Wraps the error as a file system error about `path`.
    ///
    /// ```
    /// use gitvcs::common::result::{VcsResult, ResultExt};
    ///
    /// let result: Result<String, std::io::Error> = Err(std::io::Error::new(
    ///     std::io::ErrorKind::NotFound, "file not found"
    /// ));
    /// let vcs_result: VcsResult<String> = result.with_filesystem_error("Failed to read key", None);
    /// assert!(vcs_result.is_err());
    /// ```
    fn with_filesystem_error(
        self,
        message: impl Into<String>,
        path: Option<std::path::PathBuf>,
    ) -> VcsResult<T>
    where
        E: Into<std::io::Error>;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn with_filesystem_error(
        self,
        message: impl Into<String>,
        path: Option<std::path::PathBuf>,
    ) -> VcsResult<T>
    where
        E: Into<std::io::Error>,
    {
        self.map_err(|e| VcsError::filesystem_error_with_source(message, path, e.into()))
    }
}

/// Helpers for async code.
pub mod async_helpers {
    use super::{VcsError, VcsResult};
    use std::future::Future;
    use std::time::Duration;

    /// Runs `f` and fails with [`VcsError::Timeout`] when it does not finish in time.
    pub async fn with_timeout<F, T>(f: F, timeout: Duration) -> VcsResult<T>
    where
        F: Future<Output = VcsResult<T>>,
    {
        match tokio::time::timeout(timeout, f).await {
            Ok(result) => result,
            Err(_) => Err(VcsError::timeout(timeout)),
        }
    }

    /// Runs blocking work (libgit2 calls, file reads) on the blocking pool.
    pub async fn run_blocking<F, T>(description: &str, f: F) -> VcsResult<T>
    where
        F: FnOnce() -> VcsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::task::spawn_blocking(f).await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(VcsError::Cancelled),
            Err(e) => Err(VcsError::internal_error_with_source(
                format!("{} task failed", description),
                e,
            )),
        }
    }
}
