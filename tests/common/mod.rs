//! In-process fake compositor
//!
//! Scripts are registered per socket address; `connect` to an unknown
//! address fails like a missing socket. Every handle the session receives is
//! counted in a shared [`Ledger`] so tests can assert that teardown released
//! everything.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use lamco_screen_brightness::buffer::{
    AllocError, FrameBuffer, FrameGeometry, GpuRequest, PixelView, ShmRequest,
};
use lamco_screen_brightness::capture::format::fourcc;
use lamco_screen_brightness::capture::{
    BufferPath, DmabufOffer, FrameEvent, OutputEvent, PixelFormat, ShmOffer,
};
use lamco_screen_brightness::session::{Capabilities, Compositor, Discovery};
use lamco_screen_brightness::{BrightnessError, DispatchError};

pub const WIDTH: u32 = 4;
pub const HEIGHT: u32 = 2;
/// Shared-memory stride with 4 bytes of padding per row
pub const SHM_STRIDE: u32 = WIDTH * 4 + 4;
/// GPU stride with 8 bytes of padding per row
pub const GPU_STRIDE: u32 = WIDTH * 4 + 8;

/// How one output behaves when captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputScript {
    /// Offers shared memory only
    Shm { value: u8 },
    /// Offers shared memory and dmabuf; imports succeed
    Gpu { value: u8 },
    /// Offers shared memory and dmabuf; dmabuf imports are rejected
    GpuRejected { value: u8 },
    /// Sends `failed` instead of offers
    CompositorFails,
    /// Never answers
    Stall,
}

impl OutputScript {
    fn value(&self) -> u8 {
        match self {
            Self::Shm { value } | Self::Gpu { value } | Self::GpuRejected { value } => *value,
            Self::CompositorFails | Self::Stall => 0,
        }
    }
}

/// Resource and call counters
#[derive(Debug, Default)]
pub struct Ledger {
    pub live_outputs: i32,
    pub live_frames: i32,
    pub live_buffers: i32,
    pub live_devices: i32,
    pub devices_opened: u32,
    pub captures_requested: u32,
    pub shm_allocations: u32,
    pub gpu_allocations: u32,
    pub copies: u32,
    pub closes: u32,
}

impl Ledger {
    /// Everything handed out has been given back and the backend closed once
    pub fn assert_released(&self) {
        assert_eq!(self.live_outputs, 0, "outputs leaked");
        assert_eq!(self.live_frames, 0, "frames leaked");
        assert_eq!(self.live_buffers, 0, "buffers leaked");
        assert_eq!(self.live_devices, 0, "devices leaked");
        assert_eq!(self.closes, 1, "backend closed {} times", self.closes);
    }
}

/// Compositor behaviour for one socket address
#[derive(Debug, Clone)]
pub struct Script {
    pub capabilities: Capabilities,
    pub outputs: Vec<OutputScript>,
    /// Whether opening a render node succeeds
    pub device_opens: bool,
}

impl Script {
    /// Full wlroots feature set
    pub fn wlroots(outputs: Vec<OutputScript>) -> Self {
        Self {
            capabilities: Capabilities {
                shm: true,
                zero_copy: true,
                screencopy: true,
            },
            outputs,
            device_opens: true,
        }
    }
}

thread_local! {
    static SCRIPTS: RefCell<HashMap<String, (Script, Rc<RefCell<Ledger>>)>> =
        RefCell::new(HashMap::new());
}

/// Register `script` at `address`, returning its ledger
pub fn install(address: &str, script: Script) -> Rc<RefCell<Ledger>> {
    let ledger = Rc::new(RefCell::new(Ledger::default()));
    SCRIPTS.with(|scripts| {
        scripts
            .borrow_mut()
            .insert(address.to_string(), (script, ledger.clone()))
    });
    ledger
}

pub struct FakeOutput(usize);

pub struct FakeFrame(usize);

pub struct FakeDevice(Rc<RefCell<Ledger>>);

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.0.borrow_mut().live_devices -= 1;
    }
}

pub struct FakeBuffer {
    data: Vec<u8>,
    path: BufferPath,
    format: PixelFormat,
    geometry: FrameGeometry,
    ledger: Rc<RefCell<Ledger>>,
}

impl FrameBuffer for FakeBuffer {
    fn path(&self) -> BufferPath {
        self.path
    }

    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn with_pixels<R>(&self, f: impl FnOnce(PixelView<'_>) -> R) -> Result<R, AllocError> {
        Ok(f(PixelView {
            data: &self.data,
            format: self.format,
            geometry: self.geometry,
        }))
    }
}

impl Drop for FakeBuffer {
    fn drop(&mut self) {
        self.ledger.borrow_mut().live_buffers -= 1;
    }
}

pub struct FakeCompositor {
    script: Script,
    ledger: Rc<RefCell<Ledger>>,
    queue: VecDeque<(usize, OutputEvent)>,
}

impl FakeCompositor {
    fn push(&mut self, index: usize, event: FrameEvent) {
        self.queue.push_back((index, OutputEvent::Frame(event)));
    }

    fn buffer(
        &self,
        path: BufferPath,
        format: PixelFormat,
        geometry: FrameGeometry,
    ) -> FakeBuffer {
        self.ledger.borrow_mut().live_buffers += 1;
        FakeBuffer {
            data: vec![0; (geometry.stride * geometry.height) as usize],
            path,
            format,
            geometry,
            ledger: self.ledger.clone(),
        }
    }
}

impl Compositor for FakeCompositor {
    type OutputHandle = FakeOutput;
    type Frame = FakeFrame;
    type Device = FakeDevice;
    type Buffer = FakeBuffer;

    fn connect(address: &str) -> Result<Self, BrightnessError> {
        let entry = SCRIPTS.with(|scripts| scripts.borrow_mut().remove(address));
        match entry {
            Some((script, ledger)) => Ok(Self {
                script,
                ledger,
                queue: VecDeque::new(),
            }),
            None => Err(BrightnessError::connection(
                address,
                io::Error::from(io::ErrorKind::NotFound),
            )),
        }
    }

    fn discover(&mut self) -> Result<Discovery<FakeOutput>, BrightnessError> {
        let count = self.script.outputs.len();
        self.ledger.borrow_mut().live_outputs += count as i32;
        for index in 0..count {
            self.queue
                .push_back((index, OutputEvent::Name(format!("FAKE-{}", index))));
        }
        Ok(Discovery {
            capabilities: self.script.capabilities,
            outputs: (0..count).map(FakeOutput).collect(),
        })
    }

    fn open_device(&mut self, render_node: &Path) -> Result<FakeDevice, AllocError> {
        if !self.script.device_opens {
            return Err(AllocError::device(
                render_node,
                io::Error::from(io::ErrorKind::PermissionDenied),
            ));
        }
        let mut ledger = self.ledger.borrow_mut();
        ledger.devices_opened += 1;
        ledger.live_devices += 1;
        Ok(FakeDevice(self.ledger.clone()))
    }

    fn capture_output(
        &mut self,
        index: usize,
        output: &FakeOutput,
        _overlay_cursor: bool,
    ) -> Result<FakeFrame, BrightnessError> {
        assert_eq!(output.0, index);
        {
            let mut ledger = self.ledger.borrow_mut();
            ledger.captures_requested += 1;
            ledger.live_frames += 1;
        }

        let shm = FrameEvent::Buffer(ShmOffer {
            format: 1,
            width: WIDTH,
            height: HEIGHT,
            stride: SHM_STRIDE,
        });
        let dmabuf = FrameEvent::LinuxDmabuf(DmabufOffer {
            fourcc: fourcc(b'X', b'R', b'2', b'4'),
            width: WIDTH,
            height: HEIGHT,
        });

        match self.script.outputs[index] {
            OutputScript::Shm { .. } => {
                self.push(index, shm);
                self.push(index, FrameEvent::Flags { y_invert: false });
                self.push(index, FrameEvent::BufferDone);
            }
            OutputScript::Gpu { .. } | OutputScript::GpuRejected { .. } => {
                self.push(index, shm);
                self.push(index, dmabuf);
                self.push(index, FrameEvent::Flags { y_invert: true });
                self.push(index, FrameEvent::BufferDone);
            }
            OutputScript::CompositorFails => self.push(index, FrameEvent::Failed),
            OutputScript::Stall => {}
        }
        Ok(FakeFrame(index))
    }

    fn dispatch(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Vec<(usize, OutputEvent)>, DispatchError> {
        if self.queue.is_empty() {
            return Err(match timeout {
                Some(timeout) => DispatchError::Timeout(timeout),
                None => DispatchError::Connection("fake compositor went quiet".to_string()),
            });
        }
        Ok(self.queue.drain(..).collect())
    }

    fn allocate_shm(&mut self, _index: usize, request: &ShmRequest) -> Result<FakeBuffer, AllocError> {
        self.ledger.borrow_mut().shm_allocations += 1;
        Ok(self.buffer(BufferPath::SharedMemory, request.format, request.geometry))
    }

    fn allocate_gpu(
        &mut self,
        index: usize,
        _device: &FakeDevice,
        request: &GpuRequest,
    ) -> Result<FakeBuffer, AllocError> {
        self.ledger.borrow_mut().gpu_allocations += 1;
        let buffer = self.buffer(
            BufferPath::Gpu,
            request.format,
            FrameGeometry {
                width: request.width,
                height: request.height,
                stride: GPU_STRIDE,
            },
        );
        let outcome = match self.script.outputs[index] {
            OutputScript::GpuRejected { .. } => FrameEvent::ImportFailed,
            _ => FrameEvent::ImportCreated,
        };
        self.push(index, outcome);
        Ok(buffer)
    }

    fn copy(
        &mut self,
        index: usize,
        frame: &FakeFrame,
        buffer: &mut FakeBuffer,
    ) -> Result<(), AllocError> {
        assert_eq!(frame.0, index);
        self.ledger.borrow_mut().copies += 1;

        // XRGB8888 pixels of the scripted value, 0xFF in every padding byte
        let value = self.script.outputs[index].value();
        let FrameGeometry {
            width,
            height,
            stride,
        } = buffer.geometry;
        for row in 0..height as usize {
            let line = &mut buffer.data[row * stride as usize..(row + 1) * stride as usize];
            line.fill(0xFF);
            for pixel in line[..width as usize * 4].chunks_exact_mut(4) {
                pixel[..3].fill(value);
            }
        }

        self.push(index, FrameEvent::Ready);
        Ok(())
    }

    fn release_frame(&mut self, _frame: FakeFrame) {
        self.ledger.borrow_mut().live_frames -= 1;
    }

    fn release_output(&mut self, _output: FakeOutput) {
        self.ledger.borrow_mut().live_outputs -= 1;
    }

    fn close(&mut self) {
        self.ledger.borrow_mut().closes += 1;
        self.queue.clear();
    }
}
