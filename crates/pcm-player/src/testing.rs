//! Scripted in-memory PCM device for worker and controller tests.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{HwStep, PcmError};
use crate::format::SampleFormat;
use crate::pcm::{Access, Pcm, PcmDevice};

/// Behaviour injected into a [`MockDevice`].
#[derive(Clone, Debug)]
pub(crate) struct MockScript {
    pub fail_open: bool,
    pub reject: Option<HwStep>,
    /// Rate the device settles on instead of the requested one.
    pub rate: Option<u32>,
    pub period: usize,
    /// Accept at most this many frames per write call.
    pub max_frames_per_write: Option<usize>,
    /// Zero-based write call indices that report an xrun.
    pub xrun_on_writes: Vec<usize>,
    /// Zero-based write call index that fails fatally.
    pub fail_on_write: Option<usize>,
    /// Zero-based write call index that accepts no frames.
    pub accept_zero_on_write: Option<usize>,
    pub fail_prepare: bool,
    pub fail_drain: bool,
    /// Sleep inside every write call.
    pub write_delay: Option<Duration>,
    /// Sleep inside every drain call.
    pub drain_delay: Option<Duration>,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            fail_open: false,
            reject: None,
            rate: None,
            period: 64,
            max_frames_per_write: None,
            xrun_on_writes: Vec::new(),
            fail_on_write: None,
            accept_zero_on_write: None,
            fail_prepare: false,
            fail_drain: false,
            write_delay: None,
            drain_delay: None,
        }
    }
}

/// Everything the device saw.
#[derive(Debug, Default)]
pub(crate) struct MockLog {
    pub rendered: Vec<u8>,
    pub opens: usize,
    pub closes: usize,
    pub drains: usize,
    pub prepares: usize,
    pub write_calls: usize,
    /// Frames offered on each write call.
    pub offered: Vec<usize>,
    pub steps: Vec<HwStep>,
    pub access: Option<Access>,
    pub format: Option<SampleFormat>,
    pub channels: Option<u32>,
}

#[derive(Clone, Default)]
pub(crate) struct MockDevice {
    script: MockScript,
    log: Arc<Mutex<MockLog>>,
}

impl MockDevice {
    pub fn new(script: MockScript) -> Self {
        Self {
            script,
            log: Arc::new(Mutex::new(MockLog::default())),
        }
    }

    pub fn log(&self) -> MutexGuard<'_, MockLog> {
        self.log.lock().unwrap()
    }
}

impl PcmDevice for MockDevice {
    type Pcm = MockPcm;

    fn name(&self) -> &str {
        "mock"
    }

    fn open(&self) -> Result<MockPcm, PcmError> {
        if self.script.fail_open {
            return Err(PcmError::NotFound("mock".to_string()));
        }
        self.log.lock().unwrap().opens += 1;
        Ok(MockPcm {
            script: self.script.clone(),
            log: self.log.clone(),
            format: None,
            channels: 0,
        })
    }
}

pub(crate) struct MockPcm {
    script: MockScript,
    log: Arc<Mutex<MockLog>>,
    format: Option<SampleFormat>,
    channels: u32,
}

impl MockPcm {
    fn step(&self, step: HwStep) -> Result<(), PcmError> {
        self.log.lock().unwrap().steps.push(step);
        if self.script.reject == Some(step) {
            return Err(PcmError::Rejected(format!("mock rejects {step}")));
        }
        Ok(())
    }

    fn bytes_per_frame(&self) -> usize {
        self.format.map(|f| f.bytes_per_sample()).unwrap_or(1) * self.channels.max(1) as usize
    }
}

impl Pcm for MockPcm {
    fn set_access(&mut self, access: Access) -> Result<(), PcmError> {
        self.step(HwStep::Access)?;
        self.log.lock().unwrap().access = Some(access);
        Ok(())
    }

    fn set_format(&mut self, format: SampleFormat) -> Result<(), PcmError> {
        self.step(HwStep::Format)?;
        self.format = Some(format);
        self.log.lock().unwrap().format = Some(format);
        Ok(())
    }

    fn set_channels(&mut self, channels: u32) -> Result<(), PcmError> {
        self.step(HwStep::Channels)?;
        self.channels = channels;
        self.log.lock().unwrap().channels = Some(channels);
        Ok(())
    }

    fn set_rate_near(&mut self, rate: u32) -> Result<u32, PcmError> {
        self.step(HwStep::Rate)?;
        Ok(self.script.rate.unwrap_or(rate))
    }

    fn commit(&mut self) -> Result<(), PcmError> {
        self.step(HwStep::Commit)
    }

    fn period_size(&self) -> Result<usize, PcmError> {
        self.step(HwStep::PeriodSize)?;
        Ok(self.script.period)
    }

    fn write_interleaved(&mut self, buf: &[u8], frames: usize) -> Result<usize, PcmError> {
        if let Some(delay) = self.script.write_delay {
            std::thread::sleep(delay);
        }
        let bpf = self.bytes_per_frame();
        let mut log = self.log.lock().unwrap();
        let call = log.write_calls;
        log.write_calls += 1;
        log.offered.push(frames);
        if buf.len() < frames * bpf {
            return Err(PcmError::Io("short buffer".to_string()));
        }
        if self.script.xrun_on_writes.contains(&call) {
            return Err(PcmError::Xrun);
        }
        if self.script.fail_on_write == Some(call) {
            return Err(PcmError::Io("device unplugged".to_string()));
        }
        if self.script.accept_zero_on_write == Some(call) {
            return Ok(0);
        }
        let accepted = frames.min(self.script.max_frames_per_write.unwrap_or(usize::MAX));
        log.rendered.extend_from_slice(&buf[..accepted * bpf]);
        Ok(accepted)
    }

    fn prepare(&mut self) -> Result<(), PcmError> {
        self.log.lock().unwrap().prepares += 1;
        if self.script.fail_prepare {
            return Err(PcmError::Io("prepare failed".to_string()));
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), PcmError> {
        if let Some(delay) = self.script.drain_delay {
            std::thread::sleep(delay);
        }
        self.log.lock().unwrap().drains += 1;
        if self.script.fail_drain {
            return Err(PcmError::Io("device stalled".to_string()));
        }
        Ok(())
    }
}

impl Drop for MockPcm {
    fn drop(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.closes += 1;
        }
    }
}
