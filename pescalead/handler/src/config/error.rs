/// Configuration error variants.
#[derive(Debug, thiserror::Error)]
pub enum PescaleadConfigError {
    /// Only http and https are accepted for upstream APIs.
    #[error("[{0}] Invalid URL scheme: must be HTTP or HTTPS, got '{1}'")]
    InvalidHttpScheme(&'static str, String),

    /// Unsupported database driver
    #[error("Unsupported database driver: {0}. Supported drivers are: 'postgresql'.")]
    UnsupportedDatabaseDriver(String),

    /// A CORS origin that is not `scheme://host[:port]`.
    #[error("[{0}] Invalid origin '{1}': expected scheme://host[:port]")]
    InvalidOrigin(&'static str, String),

    /// A required secret was left empty.
    #[error("[{0}] Value must not be empty")]
    EmptyValue(&'static str),

    /// An error returned for duration parameters that must be positive.
    #[error("Duration for {0} must be nonzero")]
    ZeroDurationForbidden(&'static str),

    /// An error returned for count parameters that must be positive.
    #[error("Value for {0} must be nonzero")]
    ZeroValueForbidden(&'static str),

    /// A cap set lower than the default it bounds.
    #[error("Value for {0} must not be below its default")]
    BelowDefault(&'static str),

    /// A time zone missing from the IANA database.
    #[error("[{0}] Unknown time zone '{1}'")]
    InvalidTimezone(&'static str, String),
}
