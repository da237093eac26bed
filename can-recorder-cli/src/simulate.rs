//! Synthetic traffic on the virtual bus
//!
//! Emulates a small ECU network so the recorder can be tried without
//! hardware: a handful of periodic messages with changing payloads.

use anyhow::{Context, Result};
use can_recorder::{InterfaceConfig, RawFrame, VirtualNetwork, VirtualPort};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A periodic message sent by the simulator
#[derive(Debug, Clone, Copy)]
struct Schedule {
    id: u32,
    period: Duration,
    len: usize,
}

const SCHEDULES: [Schedule; 4] = [
    Schedule { id: 0x0C9, period: Duration::from_millis(10), len: 8 },
    Schedule { id: 0x1A0, period: Duration::from_millis(20), len: 4 },
    Schedule { id: 0x3E9, period: Duration::from_millis(100), len: 8 },
    Schedule { id: 0x18FEF100, period: Duration::from_millis(500), len: 8 },
];

const STEP: Duration = Duration::from_millis(5);

/// Background sender; stops when dropped
pub struct Simulator {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl Simulator {
    /// Start sending on the channel described by `interface`
    pub fn spawn(network: &VirtualNetwork, interface: &InterfaceConfig) -> Result<Self> {
        let port = network
            .connect(interface.channel(), interface.bitrate)
            .context("Failed to attach traffic simulator")?;

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("can-simulator".to_string())
            .spawn(move || run(port, flag))
            .context("Failed to spawn simulator thread")?;

        log::info!("Simulating traffic on {}", interface.channel());
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop sending and return the number of frames sent
    pub fn stop(&mut self) -> u64 {
        self.stop.store(true, Ordering::Relaxed);
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(sent)) => {
                log::debug!("Simulator sent {} frames", sent);
                sent
            }
            Some(Err(_)) => {
                log::warn!("Simulator thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(port: VirtualPort, stop: Arc<AtomicBool>) -> u64 {
    let started = Instant::now();
    let mut next_due = vec![Duration::ZERO; SCHEDULES.len()];
    let mut counters = vec![0u32; SCHEDULES.len()];
    let mut sent = 0u64;

    while !stop.load(Ordering::Relaxed) {
        let now = started.elapsed();
        for (i, schedule) in SCHEDULES.iter().enumerate() {
            if now < next_due[i] {
                continue;
            }
            next_due[i] += schedule.period;

            let frame = RawFrame::new(schedule.id, payload(counters[i], schedule.len));
            counters[i] = counters[i].wrapping_add(1);
            match port.send(&frame) {
                Ok(_) => sent += 1,
                Err(e) => {
                    log::warn!("Simulator stopped: {}", e);
                    return sent;
                }
            }
        }
        thread::sleep(STEP);
    }

    sent
}

/// Rolling counter in the first byte, a slow ramp in the rest
fn payload(counter: u32, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| match i {
            0 => (counter & 0xFF) as u8,
            _ => ((counter >> 4) as u8).wrapping_add(i as u8),
        })
        .collect()
}
