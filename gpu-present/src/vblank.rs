//! Background VBlank thread: ticks at the configured refresh rate (59.94 Hz by
//! default), emitting [`PresentEvent::PreVBlankStart`] a little ahead of each
//! [`PresentEvent::VBlank`] so a waiting title has a window to submit a flip that
//! lands in the coming frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::event::PresentEvent;

pub const DEFAULT_VBLANK_HZ: f64 = 59.94;

pub struct VBlankThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl VBlankThread {
    pub fn spawn(rate_hz: f64, sender: Sender<PresentEvent>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);
        let period = Duration::from_secs_f64(1.0 / rate_hz);
        let pre_vblank_lead = period / 10;

        let handle = std::thread::Builder::new()
            .name("gpu-vblank".into())
            .spawn(move || {
                while !stop_thread.load(Ordering::Acquire) {
                    std::thread::sleep(period.saturating_sub(pre_vblank_lead));
                    if stop_thread.load(Ordering::Acquire) {
                        break;
                    }
                    if sender.send(PresentEvent::PreVBlankStart).is_err() {
                        break;
                    }
                    std::thread::sleep(pre_vblank_lead);
                    if sender.send(PresentEvent::VBlank).is_err() {
                        break;
                    }
                }
            })
            .expect("spawning the VBlank thread should not fail");

        VBlankThread { stop, handle: Some(handle) }
    }
}

impl Drop for VBlankThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn ticks_arrive_in_pre_then_vblank_order() {
        let (tx, rx) = channel();
        let _thread = VBlankThread::spawn(1000.0, tx);
        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first, PresentEvent::PreVBlankStart);
        assert_eq!(second, PresentEvent::VBlank);
    }
}
