// src/runtime.rs

use rayon::ThreadPoolBuilder;
use std::mem::MaybeUninit;

use crate::error::Result;

/// Run `f` on a dedicated pool of `threads` workers, or on rayon's global
/// pool when `threads` is `None`. Everything `f` parallelizes stays on the
/// chosen pool.
pub fn run_on<R, F>(threads: Option<usize>, f: F) -> Result<R>
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    let Some(n) = threads.filter(|&n| n > 0) else {
        return Ok(f());
    };
    let pool = ThreadPoolBuilder::new()
        .num_threads(n)
        .thread_name(|i| format!("fastwig-worker-{i}"))
        .build()?;
    Ok(pool.install(f))
}

/// Peak resident set size of this process, in bytes.
pub fn peak_rss_bytes() -> Option<u64> {
    let mut usage = MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage only writes into the struct we pass.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: zero-initialized and filled on success.
    let max = u64::try_from(unsafe { usage.assume_init() }.ru_maxrss).ok()?;
    // kilobytes everywhere except macOS
    Some(if cfg!(target_os = "macos") { max } else { max * 1024 })
}
