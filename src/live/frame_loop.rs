use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag. Cancelling is idempotent and may happen from
/// inside the tick, from another thread, or after the loop already ended.
#[derive(Clone, Debug, Default)]
pub struct LoopHandle {
    cancelled: Arc<AtomicBool>,
}

impl LoopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            log::debug!("Frame loop cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopControl {
    /// Schedule the next frame.
    Continue,
    /// Do not schedule another frame.
    Stop,
}

pub struct FrameLoop {
    interval: Duration,
    realtime: bool,
    handle: LoopHandle,
}

impl FrameLoop {
    pub fn new(fps: u32, realtime: bool) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            realtime,
            handle: LoopHandle::new(),
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Runs `tick` once per frame until it returns `Stop` or the handle is
    /// cancelled. Returns the number of frames run.
    pub fn run<F>(&self, mut tick: F) -> u64
    where
        F: FnMut(u64) -> LoopControl,
    {
        let mut frame = 0u64;
        let mut next = Instant::now();
        while !self.handle.is_cancelled() {
            let control = tick(frame);
            frame += 1;
            if control == LoopControl::Stop {
                break;
            }
            if self.realtime {
                next += self.interval;
                let now = Instant::now();
                if next > now {
                    std::thread::sleep(next - now);
                } else {
                    // Fell behind; resync instead of bursting.
                    next = now;
                }
            }
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_when_tick_says_so() {
        let frames = FrameLoop::new(60, false).run(|f| {
            if f == 4 {
                LoopControl::Stop
            } else {
                LoopControl::Continue
            }
        });
        assert_eq!(frames, 5);
    }

    #[test]
    fn cancel_from_inside_tick_is_idempotent() {
        let frame_loop = FrameLoop::new(60, false);
        let handle = frame_loop.handle();
        let frames = frame_loop.run(|f| {
            if f == 2 {
                handle.cancel();
                handle.cancel();
            }
            LoopControl::Continue
        });
        assert_eq!(frames, 3);
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn cancelled_loop_never_ticks() {
        let frame_loop = FrameLoop::new(60, false);
        frame_loop.handle().cancel();
        let mut ticks = 0;
        frame_loop.run(|_| {
            ticks += 1;
            LoopControl::Continue
        });
        assert_eq!(ticks, 0);
    }
}
