pub type DynError = Box<dyn std::error::Error + 'static>;

/// Wrapper for system calls. Retries on EINTR.
pub(crate) fn syscall<F, T>(f: F) -> Result<T, nix::Error>
where
    F: Fn() -> Result<T, nix::Error>,
{
    loop {
        match f() {
            Err(nix::Error::EINTR) => (), // retry
            result => return result,
        }
    }
}
