//! Event dispatch state
//!
//! Protocol callbacks only translate; they push tagged [`OutputEvent`]s onto
//! [`State::events`] and never touch capture state. Frames and buffer-import
//! params carry the output index as user data.

use std::collections::HashMap;

use tracing::debug;
use wayland_client::protocol::{wl_buffer, wl_output, wl_registry, wl_shm, wl_shm_pool};
use wayland_client::{
    delegate_noop, event_created_child, Connection, Dispatch, Proxy, QueueHandle, WEnum,
};
use wayland_protocols::wp::linux_dmabuf::zv1::client::{
    zwp_linux_buffer_params_v1::{self, ZwpLinuxBufferParamsV1},
    zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1,
};
use wayland_protocols_wlr::screencopy::v1::client::{
    zwlr_screencopy_frame_v1::{self, ZwlrScreencopyFrameV1},
    zwlr_screencopy_manager_v1::ZwlrScreencopyManagerV1,
};

use crate::capture::{DmabufOffer, FrameEvent, OutputEvent, ShmOffer};

/// Oldest screencopy version with `linux_dmabuf` and `buffer_done`
pub(super) const SCREENCOPY_MIN_VERSION: u32 = 3;

/// Globals, outputs and queued events for one connection
#[derive(Debug, Default)]
pub(super) struct State {
    pub(super) shm: Option<wl_shm::WlShm>,
    pub(super) dmabuf: Option<ZwpLinuxDmabufV1>,
    pub(super) screencopy: Option<ZwlrScreencopyManagerV1>,
    pub(super) outputs: Vec<wl_output::WlOutput>,
    pub(super) events: Vec<(usize, OutputEvent)>,
    /// GPU buffers the compositor created, waiting for their copy request
    pub(super) imports: HashMap<usize, wl_buffer::WlBuffer>,
}

impl State {
    fn push(&mut self, index: usize, event: FrameEvent) {
        self.events.push((index, OutputEvent::Frame(event)));
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for State {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_registry::Event::Global {
            name,
            interface,
            version,
        } = event
        else {
            return;
        };

        match interface.as_str() {
            "wl_shm" => {
                state.shm = Some(registry.bind(name, 1, qh, ()));
            }
            "zwp_linux_dmabuf_v1" => {
                state.dmabuf = Some(registry.bind(name, version.min(3), qh, ()));
            }
            "zwlr_screencopy_manager_v1" => {
                if version < SCREENCOPY_MIN_VERSION {
                    debug!("Ignoring zwlr_screencopy_manager_v1 v{}", version);
                    return;
                }
                state.screencopy = Some(registry.bind(name, version.min(3), qh, ()));
            }
            "wl_output" => {
                let index = state.outputs.len();
                let output = registry.bind(name, version.min(4), qh, index);
                state.outputs.push(output);
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_output::WlOutput, usize> for State {
    fn event(
        state: &mut Self,
        _: &wl_output::WlOutput,
        event: wl_output::Event,
        index: &usize,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_output::Event::Name { name } = event {
            state.events.push((*index, OutputEvent::Name(name)));
        }
    }
}

impl Dispatch<ZwlrScreencopyFrameV1, usize> for State {
    fn event(
        state: &mut Self,
        _: &ZwlrScreencopyFrameV1,
        event: zwlr_screencopy_frame_v1::Event,
        index: &usize,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let event = match event {
            zwlr_screencopy_frame_v1::Event::Buffer {
                format,
                width,
                height,
                stride,
            } => FrameEvent::Buffer(ShmOffer {
                format: match format {
                    WEnum::Value(format) => format as u32,
                    WEnum::Unknown(raw) => raw,
                },
                width,
                height,
                stride,
            }),
            zwlr_screencopy_frame_v1::Event::LinuxDmabuf {
                format,
                width,
                height,
            } => FrameEvent::LinuxDmabuf(DmabufOffer {
                fourcc: format,
                width,
                height,
            }),
            zwlr_screencopy_frame_v1::Event::Flags { flags } => FrameEvent::Flags {
                y_invert: matches!(
                    flags,
                    WEnum::Value(flags) if flags.contains(zwlr_screencopy_frame_v1::Flags::YInvert)
                ),
            },
            zwlr_screencopy_frame_v1::Event::Damage { .. } => FrameEvent::Damage,
            zwlr_screencopy_frame_v1::Event::BufferDone => FrameEvent::BufferDone,
            zwlr_screencopy_frame_v1::Event::Ready { .. } => FrameEvent::Ready,
            zwlr_screencopy_frame_v1::Event::Failed => FrameEvent::Failed,
            _ => return,
        };
        state.push(*index, event);
    }
}

impl Dispatch<ZwpLinuxBufferParamsV1, usize> for State {
    fn event(
        state: &mut Self,
        params: &ZwpLinuxBufferParamsV1,
        event: zwp_linux_buffer_params_v1::Event,
        index: &usize,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            zwp_linux_buffer_params_v1::Event::Created { buffer } => {
                debug!("Output #{}: dmabuf import created {}", index, buffer.id());
                if let Some(stale) = state.imports.insert(*index, buffer) {
                    stale.destroy();
                }
                state.push(*index, FrameEvent::ImportCreated);
            }
            zwp_linux_buffer_params_v1::Event::Failed => {
                state.push(*index, FrameEvent::ImportFailed);
            }
            _ => return,
        }
        params.destroy();
    }

    event_created_child!(State, ZwpLinuxBufferParamsV1, [
        zwp_linux_buffer_params_v1::EVT_CREATED_OPCODE => (wl_buffer::WlBuffer, ()),
    ]);
}

delegate_noop!(State: ignore wl_shm::WlShm);
delegate_noop!(State: ignore wl_shm_pool::WlShmPool);
delegate_noop!(State: ignore wl_buffer::WlBuffer);
delegate_noop!(State: ignore ZwpLinuxDmabufV1);
delegate_noop!(State: ignore ZwlrScreencopyManagerV1);
