//! Migration configuration.
use std::num::NonZeroUsize;

/// Tuning knobs for a single [`crate::migrate`] run.
///
/// Construction is builder-style, mirroring the teacher's `TargetUpload`:
/// start from [`MigrationConfig::new`] and chain `with_*` calls.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    concurrency: NonZeroUsize,
    expected_register_status: ExpectedStatusSet,
}

impl MigrationConfig {
    /// A config with concurrency `1` (strictly sequential) and the default
    /// accepted `register-part` statuses (`"done"`, `"upload"`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of parts migrated concurrently.
    ///
    /// Spec §4.1/§8 scenario S5: at most `concurrency` parts are in flight
    /// at once, with at most one additional part looked ahead from the
    /// source while a slot is busy.
    pub fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Replace the set of `register-part` `Ok.status` values treated as
    /// successful (spec §9 OQ: none — this is a supplemented hook for
    /// destinations that introduce additional status strings).
    pub fn with_expected_register_status(mut self, statuses: ExpectedStatusSet) -> Self {
        self.expected_register_status = statuses;
        self
    }

    pub(crate) fn concurrency(&self) -> usize {
        self.concurrency.get()
    }

    pub(crate) fn is_expected_register_status(&self, status: &str) -> bool {
        self.expected_register_status.contains(status)
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            concurrency: NonZeroUsize::new(1).expect("1 is nonzero"),
            expected_register_status: ExpectedStatusSet::default(),
        }
    }
}

/// The set of `register-part` `Ok.status` strings the pipeline treats as
/// non-protocol-error outcomes.
///
/// Spec §3 names exactly two: `"done"` (already held by the destination)
/// and `"upload"` (caller must `PUT` the bytes). Any other value is a
/// [`crate::error::ErrorKind::Protocol`] error unless added here.
#[derive(Debug, Clone)]
pub struct ExpectedStatusSet(Vec<String>);

impl ExpectedStatusSet {
    /// An empty set — every status but the spec's baseline two is
    /// rejected. Use [`ExpectedStatusSet::default`] to include those two.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// Add a status string to the accepted set.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.0.push(status.into());
        self
    }

    fn contains(&self, status: &str) -> bool {
        status == "done" || status == "upload" || self.0.iter().any(|s| s == status)
    }
}

impl Default for ExpectedStatusSet {
    fn default() -> Self {
        Self::none()
    }
}
