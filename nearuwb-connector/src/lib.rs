//! # NearUWB Connector
//!
//! Native driver connector and notification dispatcher for NearUWB.
//!
//! This crate owns everything that touches the operating system:
//!
//! - [`UwbConnector`] - the logical channel to a UWB driver: a background
//!   notification listener thread, token-based callback registries, and the
//!   typed control-request surface consumed by `nearuwb_core`'s device and
//!   session objects.
//! - [`SimulatorChannel`] - an in-memory driver back-end for tests and
//!   hosts without UWB hardware.
//! - [`CharDeviceChannel`] (unix) - a real-driver back-end speaking
//!   length-prefixed frames over a pair of device nodes.
//!
//! The back-end is chosen at construction time; everything above the
//! [`nearuwb_core::UwbChannel`] trait is back-end agnostic.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nearuwb_connector::{SimulatorChannel, UwbConnector};
//! use nearuwb_core::{UwbChannel, UwbDevice};
//!
//! let channel = Arc::new(SimulatorChannel::new("uwb0"));
//! let connector = Arc::new(UwbConnector::new(channel as Arc<dyn UwbChannel>).unwrap());
//! let device = UwbDevice::new(connector);
//! # let _ = device;
//! ```

pub mod callbacks;
pub mod connector;
pub mod simulator;

#[cfg(unix)]
pub mod chardev;

pub use connector::{ConnectorError, ResponseHandle, UwbConnector};
pub use simulator::SimulatorChannel;

#[cfg(unix)]
pub use chardev::CharDeviceChannel;
