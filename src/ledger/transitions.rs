use crate::domain::payment::AttemptStatus;

/// Attempt state machine: `created -> pending -> {succeeded, failed}`,
/// `succeeded -> refunded`. Everything else is rejected, which is what
/// protects the ledger against out-of-order callbacks (a late `failed`
/// after a `succeeded` does not clobber the outcome).
pub fn is_valid(from: AttemptStatus, to: AttemptStatus) -> bool {
    matches!(
        (from, to),
        (AttemptStatus::Created, AttemptStatus::Pending)
            | (AttemptStatus::Pending, AttemptStatus::Succeeded)
            | (AttemptStatus::Pending, AttemptStatus::Failed)
            | (AttemptStatus::Succeeded, AttemptStatus::Refunded)
    )
}
