//! Character-device driver back-end.
//!
//! [`CharDeviceChannel`] speaks to a real UWB driver through two device
//! nodes: a control node carrying request/response round trips and an event
//! node streaming notification frames. Both directions use length-prefixed
//! frames (`u32` little-endian length, then the BER-TLV payload); on the
//! control node the request additionally leads with the opcode byte.
//!
//! The notification read blocks in `poll(2)` on the event node together
//! with the read end of an internal pipe; [`UwbChannel::cancel_read`]
//! writes one byte into the pipe to wake the poller without touching the
//! device.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::path::Path;
use std::sync::Mutex;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use nearuwb_core::channel::{ChannelError, UwbChannel};
use nearuwb_core::fira::command::ControlOp;

/// Channel backed by a pair of driver device nodes.
pub struct CharDeviceChannel {
    identity: String,
    control: Mutex<File>,
    events: Mutex<File>,
    cancel_read_end: Mutex<File>,
    cancel_write_end: OwnedFd,
}

impl CharDeviceChannel {
    /// Open the control and event nodes of a driver instance.
    ///
    /// The `identity` should be stable for the physical device (the device
    /// path is a reasonable choice).
    pub fn open(
        identity: impl Into<String>,
        control_path: impl AsRef<Path>,
        event_path: impl AsRef<Path>,
    ) -> std::io::Result<Self> {
        let control = OpenOptions::new()
            .read(true)
            .write(true)
            .open(control_path)?;
        let events = OpenOptions::new().read(true).write(true).open(event_path)?;
        let (pipe_read, pipe_write) =
            nix::unistd::pipe().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
        Ok(CharDeviceChannel {
            identity: identity.into(),
            control: Mutex::new(control),
            events: Mutex::new(events),
            cancel_read_end: Mutex::new(File::from(pipe_read)),
            cancel_write_end: pipe_write,
        })
    }

    fn read_frame(file: &mut File) -> Result<Vec<u8>, ChannelError> {
        let mut length_bytes = [0u8; 4];
        read_exact(file, &mut length_bytes)?;
        let length = u32::from_le_bytes(length_bytes) as usize;
        let mut payload = vec![0u8; length];
        read_exact(file, &mut payload)?;
        Ok(payload)
    }
}

fn read_exact(file: &mut File, buf: &mut [u8]) -> Result<(), ChannelError> {
    file.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => ChannelError::Closed,
        _ => ChannelError::Io(e.to_string()),
    })
}

impl UwbChannel for CharDeviceChannel {
    fn request(&self, op: ControlOp, payload: &[u8]) -> Result<Vec<u8>, ChannelError> {
        // One round trip at a time on the control node
        let mut control = self
            .control
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut frame = Vec::with_capacity(5 + payload.len());
        frame.push(op.code());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(payload);
        control
            .write_all(&frame)
            .map_err(|e| ChannelError::Io(e.to_string()))?;

        CharDeviceChannel::read_frame(&mut control)
    }

    fn read_notification(&self) -> Result<Vec<u8>, ChannelError> {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut cancel = self
            .cancel_read_end
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        loop {
            let mut fds = [
                PollFd::new(events.as_fd(), PollFlags::POLLIN),
                PollFd::new(cancel.as_fd(), PollFlags::POLLIN),
            ];
            poll(&mut fds, PollTimeout::NONE).map_err(|e| ChannelError::Io(e.to_string()))?;

            let event_ready = fds[0]
                .revents()
                .is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP));
            let canceled = fds[1]
                .revents()
                .is_some_and(|r| r.contains(PollFlags::POLLIN));

            if canceled {
                let mut byte = [0u8; 1];
                let _ = cancel.read(&mut byte);
                return Err(ChannelError::Canceled);
            }
            if event_ready {
                return CharDeviceChannel::read_frame(&mut events);
            }
        }
    }

    fn cancel_read(&self) {
        let _ = nix::unistd::write(self.cancel_write_end.as_fd(), &[0u8]);
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

// =============================================================================
// Tests
// =============================================================================
