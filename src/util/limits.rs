//! Process resource limit checks

/// Sockets each worker may hold at once, plus headroom for the runtime
const FDS_PER_WORKER: u64 = 1;
const FD_HEADROOM: u64 = 64;

/// Soft limit on open file descriptors, if the platform reports one
#[cfg(unix)]
pub fn open_file_limit() -> Option<u64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit only writes into the struct we pass
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 || limit.rlim_cur == libc::RLIM_INFINITY {
        return None;
    }
    Some(limit.rlim_cur as u64)
}

#[cfg(not(unix))]
pub fn open_file_limit() -> Option<u64> {
    None
}

/// Descriptors a pool of `concurrency` workers is expected to need
pub fn required_descriptors(concurrency: usize) -> u64 {
    (concurrency as u64).saturating_mul(FDS_PER_WORKER) + FD_HEADROOM
}

/// Warn if `concurrency` is likely to exhaust the descriptor limit.
/// Returns `true` when a warning was logged.
pub fn check_descriptor_budget(concurrency: usize) -> bool {
    match open_file_limit() {
        Some(limit) => warn_if_exceeds(concurrency, limit),
        None => false,
    }
}

fn warn_if_exceeds(concurrency: usize, limit: u64) -> bool {
    let needed = required_descriptors(concurrency);
    if needed > limit {
        tracing::warn!(
            concurrency,
            open_file_limit = limit,
            needed,
            "Concurrency may exceed the open file limit; expect connection failures (raise it with `ulimit -n`)"
        );
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_descriptors() {
        assert_eq!(required_descriptors(0), FD_HEADROOM);
        assert_eq!(required_descriptors(100), 100 + FD_HEADROOM);
    }

    #[test]
    fn test_warn_threshold() {
        assert!(warn_if_exceeds(1000, 256));
        assert!(!warn_if_exceeds(10, 1024));
    }

    #[cfg(unix)]
    #[test]
    fn test_limit_is_readable() {
        if let Some(limit) = open_file_limit() {
            assert!(limit > 0);
        }
    }
}
