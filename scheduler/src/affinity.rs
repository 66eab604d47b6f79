use reflex_error::Result;

/// Pins the calling thread to the CPUs set in `mask` (bit n = CPU n).
#[cfg(target_os = "linux")]
pub fn pin_current_thread(mask: u64) -> Result<()> {
    use reflex_error::Error;

    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for cpu in 0..64usize {
            if mask & (1u64 << cpu) != 0 {
                libc::CPU_SET(cpu, &mut set);
            }
        }
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(Error::os("sched_setaffinity failed"));
        }
    }
    Ok(())
}

/// CPU pinning is advisory off Linux.
#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(_mask: u64) -> Result<()> {
    Ok(())
}
