/// A monotonic millisecond clock.
///
/// The counter is allowed to wrap around `u32::MAX`; elapsed times are
/// computed with wrapping arithmetic, the same way an Arduino-style
/// `millis()` counter is used.
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed origin.
    fn now_ms(&self) -> u32;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// Milliseconds elapsed from `since` to `now`, across counter wrap-around.
pub(crate) fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}
