use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = taskboard_common::id::prefixed_ulid("sub");
/// assert!(id.starts_with("sub_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes for client-generated identifiers.
pub mod prefix {
    /// Gateway subscription ids (sent as the STOMP `id` header).
    pub const SUBSCRIPTION: &str = "sub";
    /// Client session ids, used to correlate log lines of one login.
    pub const SESSION: &str = "ses";
}
