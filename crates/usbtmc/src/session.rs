//! USBTMC session lifecycle
//!
//! A session owns the claimed interface of one USBTMC device and carries the
//! per-device protocol state: endpoint addresses, negotiated capabilities,
//! the sequence tag, and any in-progress response reassembly. All transfers
//! are blocking with a fixed per-call timeout; callers needing to stay
//! responsive run the session on a worker thread (see [`crate::worker`]).

use crate::capabilities::{CAPABILITIES_REPLY_LEN, Capabilities, GET_CAPABILITIES, QuirkList,
    parse_capabilities};
use crate::error::{Result, UsbTmcError, map_transfer_error};
use crate::header::{BTag, HEADER_SIZE, encode_dev_dep_out, encode_request_in};
use crate::reassembly::ReadAssembly;
use rusb::{Context, Device, DeviceHandle, Direction, TransferType};
use std::time::Duration;
use tracing::{debug, warn};

/// USBTMC interface class triple (Application / USBTMC / USB488)
pub const USBTMC_CLASS: u8 = 0xFE;
pub const USBTMC_SUBCLASS: u8 = 0x03;
pub const USB488_PROTOCOL: u8 = 0x01;

/// USB488 class requests
const REN_CONTROL: u8 = 160;
const GO_TO_LOCAL: u8 = 161;
const LOCAL_LOCKOUT: u8 = 162;

/// bmRequestType for class-specific interface IN requests
const CLASS_INTERFACE_IN: u8 = 0xA1;

/// Default per-transfer timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest payload requested per bulk-in cycle
const DEFAULT_MAX_TRANSFER: u32 = 1024 * 1024;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    Closing,
    /// Terminal: open failed or a transfer left the device state unknown
    Error,
}

/// Endpoint addresses recorded from the USBTMC interface descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// bConfigurationValue of the configuration holding the interface
    pub configuration: u8,
    /// bInterfaceNumber
    pub interface: u8,
    /// Bulk-out endpoint address
    pub bulk_out: u8,
    /// Bulk-in endpoint address
    pub bulk_in: u8,
    /// Optional interrupt-in endpoint address
    pub interrupt_in: Option<u8>,
}

/// Locate the first USBTMC/USB488 interface on a device
///
/// Walks every configuration and interface descriptor; returns `None` when
/// the device exposes no matching interface.
pub fn find_usbtmc_interface(device: &Device<Context>) -> Result<Option<InterfaceInfo>> {
    let descriptor = device.device_descriptor()?;
    for index in 0..descriptor.num_configurations() {
        let config = device.config_descriptor(index)?;
        for interface in config.interfaces() {
            for setting in interface.descriptors() {
                let matches = setting.class_code() == USBTMC_CLASS
                    && setting.sub_class_code() == USBTMC_SUBCLASS
                    && setting.protocol_code() == USB488_PROTOCOL;
                if !matches {
                    continue;
                }

                let mut bulk_out = None;
                let mut bulk_in = None;
                let mut interrupt_in = None;
                for endpoint in setting.endpoint_descriptors() {
                    match (endpoint.transfer_type(), endpoint.direction()) {
                        (TransferType::Bulk, Direction::Out) => {
                            bulk_out.get_or_insert(endpoint.address());
                        }
                        (TransferType::Bulk, Direction::In) => {
                            bulk_in.get_or_insert(endpoint.address());
                        }
                        (TransferType::Interrupt, Direction::In) => {
                            interrupt_in.get_or_insert(endpoint.address());
                        }
                        _ => {}
                    }
                }

                if let (Some(bulk_out), Some(bulk_in)) = (bulk_out, bulk_in) {
                    return Ok(Some(InterfaceInfo {
                        configuration: config.number(),
                        interface: setting.interface_number(),
                        bulk_out,
                        bulk_in,
                        interrupt_in,
                    }));
                }
            }
        }
    }
    Ok(None)
}

/// An open USBTMC session
pub struct UsbTmcSession {
    handle: DeviceHandle<Context>,
    vendor_id: u16,
    product_id: u16,
    iface: InterfaceInfo,
    state: SessionState,
    capabilities: Capabilities,
    tag: BTag,
    detached_kernel_driver: bool,
    lockout_asserted: bool,
    /// Reassembly state of a response that was not fully drained
    pending: Option<ReadAssembly>,
    max_transfer_size: u32,
    timeout: Duration,
}

impl UsbTmcSession {
    /// Open a session on `device`
    ///
    /// Selects the USBTMC interface, detaches a kernel driver if one is
    /// bound, sets the configuration, claims the interface, negotiates
    /// capabilities, and (unless the device is RL1-quirked) asserts remote
    /// lockout. Lockout failure is logged and otherwise ignored.
    pub fn open(device: &Device<Context>, quirks: &QuirkList) -> Result<Self> {
        Self::open_with_timeout(device, quirks, DEFAULT_TIMEOUT)
    }

    pub fn open_with_timeout(
        device: &Device<Context>,
        quirks: &QuirkList,
        timeout: Duration,
    ) -> Result<Self> {
        let descriptor = device.device_descriptor()?;
        let vendor_id = descriptor.vendor_id();
        let product_id = descriptor.product_id();

        let iface = find_usbtmc_interface(device)?.ok_or_else(|| {
            UsbTmcError::DeviceNotFound(format!(
                "{:04x}:{:04x} exposes no USBTMC interface",
                vendor_id, product_id
            ))
        })?;

        let handle = device.open().map_err(|e| {
            UsbTmcError::DeviceNotFound(format!(
                "cannot open {:04x}:{:04x}: {}",
                vendor_id, product_id, e
            ))
        })?;

        let mut session = Self {
            handle,
            vendor_id,
            product_id,
            iface,
            state: SessionState::Opening,
            capabilities: Capabilities::default(),
            tag: BTag::INITIAL,
            detached_kernel_driver: false,
            lockout_asserted: false,
            pending: None,
            max_transfer_size: DEFAULT_MAX_TRANSFER,
            timeout,
        };

        match session.claim(quirks) {
            Ok(()) => {
                session.state = SessionState::Open;
                Ok(session)
            }
            Err(e) => {
                session.state = SessionState::Error;
                session.restore_interface();
                Err(e)
            }
        }
    }

    fn claim(&mut self, quirks: &QuirkList) -> Result<()> {
        let iface = self.iface;

        if self.handle.kernel_driver_active(iface.interface).unwrap_or(false) {
            debug!(interface = iface.interface, "detaching kernel driver");
            self.handle
                .detach_kernel_driver(iface.interface)
                .map_err(|e| {
                    UsbTmcError::DeviceNotFound(format!("cannot detach kernel driver: {}", e))
                })?;
            self.detached_kernel_driver = true;
        }

        let active = self.handle.active_configuration().unwrap_or(0);
        if active != iface.configuration {
            self.handle
                .set_active_configuration(iface.configuration)
                .map_err(|e| {
                    UsbTmcError::DeviceNotFound(format!("cannot set configuration: {}", e))
                })?;
        }

        self.handle.claim_interface(iface.interface).map_err(|e| {
            UsbTmcError::DeviceNotFound(format!(
                "cannot claim interface {}: {}",
                iface.interface, e
            ))
        })?;
        debug!(
            "claimed USBTMC interface {} (bulk-out {:#04x}, bulk-in {:#04x})",
            iface.interface, iface.bulk_out, iface.bulk_in
        );

        self.capabilities = self.query_capabilities()?;

        if self.capabilities.wants_lockout() {
            if quirks.is_quirked(self.vendor_id, self.product_id) {
                debug!(
                    "skipping remote lockout for quirked device {:04x}:{:04x}",
                    self.vendor_id, self.product_id
                );
            } else if let Err(e) = self.assert_lockout() {
                // Non-fatal: the instrument stays usable from its front panel.
                warn!("remote lockout failed: {}", e);
            }
        }
        Ok(())
    }

    fn query_capabilities(&mut self) -> Result<Capabilities> {
        let mut reply = [0u8; CAPABILITIES_REPLY_LEN];
        let n = self
            .handle
            .read_control(
                CLASS_INTERFACE_IN,
                GET_CAPABILITIES,
                0,
                self.iface.interface as u16,
                &mut reply,
                self.timeout,
            )
            .map_err(map_transfer_error)?;
        parse_capabilities(&reply[..n])
    }

    /// Issue a one-status-byte USB488 control request
    fn usb488_request(&mut self, request: u8, value: u16) -> Result<()> {
        let mut status = [0u8; 1];
        self.handle
            .read_control(
                CLASS_INTERFACE_IN,
                request,
                value,
                self.iface.interface as u16,
                &mut status,
                self.timeout,
            )
            .map_err(map_transfer_error)?;
        if status[0] != 1 {
            return Err(UsbTmcError::CapabilityQuery(format!(
                "request {:#04x} returned status {:#04x}",
                request, status[0]
            )));
        }
        Ok(())
    }

    fn assert_lockout(&mut self) -> Result<()> {
        self.usb488_request(REN_CONTROL, 1)?;
        self.usb488_request(LOCAL_LOCKOUT, 0)?;
        self.lockout_asserted = true;
        debug!("remote lockout asserted");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    /// Read the device's serial number string, if it has one
    pub fn serial_number(&self) -> Option<String> {
        let descriptor = self.handle.device().device_descriptor().ok()?;
        let index = descriptor.serial_number_string_index()?;
        self.handle.read_string_descriptor_ascii(index).ok()
    }

    /// Send a device-dependent message
    ///
    /// Fragments the payload into `max_transfer_size`-bounded frames with
    /// EOM set only on the final fragment. Each fragment advances the
    /// sequence tag.
    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if self.pending.is_some() {
            return Err(UsbTmcError::Busy);
        }

        let max = self.max_transfer_size as usize;
        let mut chunks = payload.chunks(max).peekable();
        // An empty payload still sends one (empty) frame.
        if chunks.peek().is_none() {
            return self.write_fragment(&[], true);
        }
        while let Some(chunk) = chunks.next() {
            let eom = chunks.peek().is_none();
            self.write_fragment(chunk, eom)?;
        }
        Ok(())
    }

    fn write_fragment(&mut self, chunk: &[u8], eom: bool) -> Result<()> {
        self.tag = self.tag.next();
        let frame = encode_dev_dep_out(self.tag, chunk, eom);
        let written = self
            .handle
            .write_bulk(self.iface.bulk_out, &frame, self.timeout)
            .map_err(map_transfer_error)?;
        if written != frame.len() {
            return Err(UsbTmcError::Usb(rusb::Error::Io));
        }
        Ok(())
    }

    /// Read one complete response message
    ///
    /// Runs request-data cycles until a message with EOM is fully drained:
    /// sends REQUEST_DEV_DEP_MSG_IN, validates the response header, and
    /// issues continuation bulk-in transfers while declared bytes remain.
    /// When a message drains without EOM, a fresh request cycle is silently
    /// issued; the instrument is still sending.
    pub fn read(&mut self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        if self.pending.is_some() {
            return Err(UsbTmcError::Busy);
        }

        let mut message = Vec::new();
        let mut buf = vec![0u8; self.max_transfer_size as usize + HEADER_SIZE];
        loop {
            self.tag = self.tag.next();
            let request = encode_request_in(self.tag, self.max_transfer_size);
            let written = self
                .handle
                .write_bulk(self.iface.bulk_out, &request, self.timeout)
                .map_err(map_transfer_error)?;
            if written != request.len() {
                return Err(UsbTmcError::Usb(rusb::Error::Io));
            }

            let n = self.bulk_in(&mut buf)?;
            let (mut assembly, payload) = match ReadAssembly::begin(&buf[..n], self.tag) {
                Ok(parsed) => parsed,
                Err(e) => {
                    // Framing errors abort the cycle but leave the session
                    // open; nothing is pending afterwards.
                    return Err(e);
                }
            };
            message.extend_from_slice(payload);

            while assembly.remaining() > 0 {
                self.pending = Some(assembly);
                let n = match self.bulk_in(&mut buf) {
                    Ok(n) => n,
                    Err(e) => return Err(e), // pending stays set; abort_read to recover
                };
                let mut resumed = self.pending.take().expect("pending set above");
                message.extend_from_slice(resumed.push(&buf[..n]));
                assembly = resumed;
            }

            if assembly.is_complete() {
                return Ok(message);
            }
            debug_assert!(assembly.needs_new_request());
        }
    }

    fn bulk_in(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.handle
            .read_bulk(self.iface.bulk_in, buf, self.timeout)
            .map_err(map_transfer_error)
    }

    /// Abandon a partially consumed response
    ///
    /// Clears the reassembly state so a new request may be issued. The
    /// in-flight bulk transfer (if any) still runs out its OS-level timeout
    /// before the pipe is reusable.
    pub fn abort_read(&mut self) {
        self.pending = None;
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            SessionState::Open => Ok(()),
            _ => Err(UsbTmcError::Closed),
        }
    }

    /// Close the session
    ///
    /// Best-effort local-control restore if lockout was asserted, then
    /// release the interface and re-attach a previously detached kernel
    /// driver.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;

        if self.lockout_asserted {
            if let Err(e) = self.usb488_request(GO_TO_LOCAL, 0) {
                debug!("local-control restore failed: {}", e);
            }
            self.lockout_asserted = false;
        }
        self.restore_interface();
        self.pending = None;
        self.state = SessionState::Closed;
        debug!(
            "closed USBTMC session {:04x}:{:04x}",
            self.vendor_id, self.product_id
        );
    }

    fn restore_interface(&mut self) {
        if let Err(e) = self.handle.release_interface(self.iface.interface) {
            debug!("release interface failed: {}", e);
        }
        if self.detached_kernel_driver {
            if let Err(e) = self.handle.attach_kernel_driver(self.iface.interface) {
                debug!("kernel driver re-attach failed: {}", e);
            }
            self.detached_kernel_driver = false;
        }
    }
}

impl Drop for UsbTmcSession {
    fn drop(&mut self) {
        self.close();
    }
}
