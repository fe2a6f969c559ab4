//! DNP3 Master coordinator: ties the Data Link, Transport, and Application
//! layers to a byte stream and exposes the request/response operations a
//! client actually calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::application::{ApplicationLayer, ApplicationResponse, AppLayerFunction, ObjectHeader, QualifierCode};
use crate::byte_stream::{ByteStream, TcpByteStream};
use crate::config::{ConfigValidationError, Dnp3Config};
use crate::datalink::DataLinkLayer;
use crate::error::{Dnp3Error, Result};
use crate::objects::analog::{AnalogInput, AnalogOutput, AnalogOutputCommand};
use crate::objects::binary::{BinaryInput, BinaryOutput, Crob};
use crate::objects::counter::Counter;
use crate::objects::DecodedObjects;
use crate::transport::{TransportLayer, MAX_SEGMENT_PAYLOAD};

const FRAME_HEADER_MIN: usize = 10;
const READ_CHUNK: usize = 1024;
const MAX_FRAGMENTS: usize = 100;
const RESTART_TIMEOUT: Duration = Duration::from_secs(30);

/// Control operation status codes echoed in CROB/AOB responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlStatus {
    Success = 0x00,
    Timeout = 0x01,
    NoSelect = 0x02,
    FormatError = 0x03,
    NotSupported = 0x04,
    AlreadyActive = 0x05,
    HardwareError = 0x06,
    Local = 0x07,
    TooManyObjs = 0x08,
    NotAuthorized = 0x09,
    AutomationInhibit = 0x0A,
    ProcessingLimited = 0x0B,
    OutOfRange = 0x0C,
    NotParticipating = 0x7E,
    Undefined = 0x7F,
}

/// Result of a polling operation (integrity poll or class read).
#[derive(Debug, Clone, Default)]
pub struct PollResult {
    pub success: bool,
    pub iin: Option<crate::application::IinFlags>,
    pub binary_inputs: Vec<BinaryInput>,
    pub binary_outputs: Vec<BinaryOutput>,
    pub analog_inputs: Vec<AnalogInput>,
    pub analog_outputs: Vec<AnalogOutput>,
    pub counters: Vec<Counter>,
    pub error: Option<String>,
}

impl PollResult {
    fn failure(error: impl Into<String>) -> Self {
        PollResult {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

type UnsolicitedCallback = Arc<dyn Fn(ApplicationResponse) + Send + Sync>;

struct Inner {
    stream: Option<Box<dyn ByteStream>>,
    connected: bool,
    datalink: DataLinkLayer,
    transport: TransportLayer,
    application: ApplicationLayer,
    rx_buffer: Vec<u8>,
    unsolicited_callback: Option<UnsolicitedCallback>,
}

/// DNP3 Master Station for IP communication.
///
/// All mutable protocol state lives behind one internal async mutex, held
/// for the duration of each exchange, so `Master` can be shared (e.g. via
/// `Arc<Master>`) across tasks that serialize naturally.
pub struct Master {
    config: Dnp3Config,
    inner: Mutex<Inner>,
}

impl Master {
    pub fn new(config: Dnp3Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e: ConfigValidationError| Dnp3Error::protocol(e.to_string(), None))?;
        let datalink = DataLinkLayer::new(config.master_address, config.outstation_address)?;

        Ok(Master {
            config,
            inner: Mutex::new(Inner {
                stream: None,
                connected: false,
                datalink,
                transport: TransportLayer::new(),
                application: ApplicationLayer::new(),
                rx_buffer: Vec::new(),
                unsolicited_callback: None,
            }),
        })
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn with_stream(config: Dnp3Config, stream: Box<dyn ByteStream>) -> Result<Self> {
        let master = Self::new(config)?;
        {
            let mut inner = master.inner.try_lock().expect("no concurrent access during construction");
            inner.stream = Some(stream);
            inner.connected = true;
        }
        Ok(master)
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.connected
    }

    pub async fn open(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.connected {
            return Ok(());
        }

        let stream = TcpByteStream::connect(&self.config.host, self.config.port, self.config.connection_timeout).await?;
        inner.stream = Some(Box::new(stream));
        inner.connected = true;
        inner.rx_buffer.clear();
        tracing::info!(host = %self.config.host, port = self.config.port, "connected to outstation");
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(mut stream) = inner.stream.take() {
            let _ = stream.close().await;
        }
        inner.connected = false;
        inner.rx_buffer.clear();
        tracing::info!("connection closed");
        Ok(())
    }

    pub async fn set_unsolicited_callback(&self, callback: Option<UnsolicitedCallback>) {
        self.inner.lock().await.unsolicited_callback = callback;
    }

    // =====================================================================
    // Wire-level send/receive
    // =====================================================================

    async fn send_frame(&self, inner: &mut Inner, frame: &[u8]) -> Result<()> {
        let stream = inner
            .stream
            .as_mut()
            .ok_or_else(|| Dnp3Error::communication("not connected", &self.config.host, self.config.port))?;
        if self.config.log_raw_frames {
            tracing::debug!(?frame, "TX frame");
        }
        stream.write_all(frame).await
    }

    async fn receive_frame(&self, inner: &mut Inner, timeout: Duration) -> Result<crate::datalink::Frame> {
        let start = Instant::now();

        loop {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(Dnp3Error::timeout("response timeout", timeout));
            }

            let frame_start = DataLinkLayer::find_frame_start(&inner.rx_buffer);
            if frame_start > 0 {
                inner.rx_buffer.drain(..frame_start as usize);
            } else if frame_start < 0 && inner.rx_buffer.len() > 1 {
                let keep_from = inner.rx_buffer.len() - 1;
                inner.rx_buffer.drain(..keep_from);
            }

            if inner.rx_buffer.len() >= FRAME_HEADER_MIN {
                let frame_size = match DataLinkLayer::calculate_frame_size(inner.rx_buffer[2]) {
                    Ok(size) => size,
                    Err(e) if e.is_locally_recoverable() => {
                        inner.rx_buffer.drain(..1);
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                if inner.rx_buffer.len() >= frame_size {
                    if self.config.log_raw_frames {
                        tracing::debug!(frame = ?&inner.rx_buffer[..frame_size], "RX frame");
                    }
                    match DataLinkLayer::parse_frame(&inner.rx_buffer[..frame_size]) {
                        Ok((frame, consumed)) => {
                            inner.rx_buffer.drain(..consumed);
                            return Ok(frame);
                        }
                        Err(e) if e.is_locally_recoverable() => {
                            inner.rx_buffer.drain(..1);
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(Dnp3Error::timeout("response timeout", timeout));
            }

            let stream = inner
                .stream
                .as_mut()
                .ok_or_else(|| Dnp3Error::communication("not connected", &self.config.host, self.config.port))?;
            let mut buf = [0u8; READ_CHUNK];
            let n = stream.read(&mut buf, remaining).await?;
            if n == 0 {
                return Err(Dnp3Error::communication("connection closed by remote", &self.config.host, self.config.port));
            }
            inner.rx_buffer.extend_from_slice(&buf[..n]);
        }
    }

    async fn send_confirm(&self, inner: &mut Inner, sequence: u8, unsolicited: bool) -> Result<()> {
        let confirm = ApplicationLayer::build_confirm(sequence, unsolicited)?;
        let segments = inner.transport.segment(&confirm, MAX_SEGMENT_PAYLOAD);
        for segment in &segments {
            let frame = inner.datalink.build_frame(segment, false, false)?;
            self.send_frame(inner, &frame).await?;
        }
        Ok(())
    }

    async fn send_request(&self, apdu: &[u8], expect_response: bool, timeout: Option<Duration>) -> Result<Option<ApplicationResponse>> {
        let mut inner = self.inner.lock().await;
        let result = self.send_request_locked(&mut inner, apdu, expect_response, timeout).await;
        if let Err(ref e) = result {
            if e.is_retryable() {
                inner.connected = false;
            }
        }
        result
    }

    /// Send one APDU (possibly split across several transport segments)
    /// and, if a response is expected, receive it. The link-layer FCB is
    /// only advanced once every segment has gone out without error - a
    /// failure here leaves it unchanged so a retried send reuses the same
    /// bit, per the link-layer's confirmed-frame discipline.
    async fn send_request_locked(
        &self,
        inner: &mut Inner,
        apdu: &[u8],
        expect_response: bool,
        timeout: Option<Duration>,
    ) -> Result<Option<ApplicationResponse>> {
        let segments = inner.transport.segment(apdu, MAX_SEGMENT_PAYLOAD);
        let confirmed = self.config.confirm_required;
        for segment in &segments {
            let frame = inner.datalink.build_frame(segment, confirmed, confirmed)?;
            self.send_frame(inner, &frame).await?;
        }
        if confirmed {
            inner.datalink.toggle_fcb();
        }

        if !expect_response {
            return Ok(None);
        }

        self.receive_response(inner, timeout).await.map(Some)
    }

    async fn receive_response(&self, inner: &mut Inner, timeout: Option<Duration>) -> Result<ApplicationResponse> {
        let timeout = timeout.unwrap_or(self.config.response_timeout);
        let start = Instant::now();
        inner.transport.reset();

        let mut fragments: Vec<ApplicationResponse> = Vec::new();

        while fragments.len() < MAX_FRAGMENTS {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(Dnp3Error::timeout("multi-fragment response timeout", timeout));
            }
            let remaining = timeout - elapsed;

            let frame = self.receive_frame(inner, remaining).await?;

            let apdu = match inner.transport.reassemble(&frame.user_data, Some(remaining))? {
                Some(apdu) => apdu,
                None => continue,
            };

            let response = ApplicationLayer::parse_response(&apdu)?;

            if response.iin.has_errors() {
                tracing::warn!(iin = ?response.iin, "response has IIN errors");
            }
            if response.iin.has_reserved_bits() {
                tracing::warn!("response has reserved IIN bits set");
            }

            if response.unsolicited {
                if response.confirm_required {
                    self.send_confirm(inner, response.sequence, response.unsolicited).await?;
                }
                if let Some(callback) = inner.unsolicited_callback.clone() {
                    callback(response);
                }
                inner.transport.reset();
                continue;
            }

            if response.confirm_required {
                self.send_confirm(inner, response.sequence, response.unsolicited).await?;
            }

            let is_final = response.final_;
            fragments.push(response);
            if is_final {
                break;
            }
            inner.transport.reset();
        }

        match fragments.len() {
            0 => Err(Dnp3Error::protocol("no fragments received before deadline", None)),
            1 => Ok(fragments.pop().unwrap()),
            _ => Ok(Self::merge_fragments(fragments)),
        }
    }

    fn merge_fragments(mut fragments: Vec<ApplicationResponse>) -> ApplicationResponse {
        let function = fragments[0].function;
        let unsolicited = fragments[0].unsolicited;
        let last = fragments.pop().expect("at least one fragment");

        let mut objects = Vec::new();
        for fragment in fragments {
            objects.extend(fragment.objects);
        }
        objects.extend(last.objects);

        ApplicationResponse {
            function,
            sequence: last.sequence,
            first: true,
            final_: true,
            confirm_required: false,
            unsolicited,
            iin: last.iin,
            objects,
        }
    }

    /// Run one exchange (send + receive), retrying transient communication
    /// or timeout failures up to `max_retries` times. CRC/frame errors
    /// recovered locally in `receive_frame` never reach this layer.
    async fn exchange(&self, apdu: &[u8], expect_response: bool, timeout: Option<Duration>) -> Result<Option<ApplicationResponse>> {
        let mut attempt = 0u32;
        loop {
            match self.send_request(apdu, expect_response, timeout).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, max_retries = self.config.max_retries, error = %e, "retrying exchange");
                    tokio::time::sleep(self.config.retry_delay).await;
                    if !self.is_connected().await {
                        self.close().await.ok();
                        self.open().await?;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    // =====================================================================
    // High-level read operations
    // =====================================================================

    pub async fn integrity_poll(&self) -> PollResult {
        let apdu = {
            let mut inner = self.inner.lock().await;
            match inner.application.build_integrity_poll() {
                Ok(a) => a,
                Err(e) => return PollResult::failure(e.to_string()),
            }
        };

        match self.exchange(&apdu, true, None).await {
            Ok(Some(response)) => Self::parse_poll_response(response),
            Ok(None) => PollResult::failure("no response received"),
            Err(e) => PollResult::failure(e.to_string()),
        }
    }

    pub async fn read_class(&self, class_num: u8) -> PollResult {
        let apdu = {
            let mut inner = self.inner.lock().await;
            match inner.application.build_class_poll(class_num) {
                Ok(a) => a,
                Err(e) => return PollResult::failure(e.to_string()),
            }
        };

        match self.exchange(&apdu, true, None).await {
            Ok(Some(response)) => Self::parse_poll_response(response),
            Ok(None) => PollResult::failure("no response received"),
            Err(e) => PollResult::failure(e.to_string()),
        }
    }

    fn parse_poll_response(response: ApplicationResponse) -> PollResult {
        let mut result = PollResult {
            success: true,
            iin: Some(response.iin),
            ..Default::default()
        };

        for object in response.objects {
            match object {
                DecodedObjects::BinaryInputs(v) => result.binary_inputs.extend(v),
                DecodedObjects::BinaryOutputs(v) => result.binary_outputs.extend(v),
                DecodedObjects::AnalogInputs(v) => result.analog_inputs.extend(v),
                DecodedObjects::AnalogOutputs(v) => result.analog_outputs.extend(v),
                DecodedObjects::Counters(v) => result.counters.extend(v),
                DecodedObjects::Crobs(_) | DecodedObjects::AnalogOutputCommands(_) => {}
            }
        }

        result
    }

    async fn read_range(&self, group: u8, range: Option<(u32, u32)>) -> Result<ApplicationResponse> {
        let apdu = {
            let mut inner = self.inner.lock().await;
            inner.application.build_read_request(group, 0, range)?
        };
        self.exchange(&apdu, true, None)
            .await?
            .ok_or_else(|| Dnp3Error::protocol("no response received", None))
    }

    pub async fn read_binary_inputs(&self, start: u32, stop: u32) -> Result<Vec<BinaryInput>> {
        let range = if start == 0 && stop == 0 { None } else { Some((start, stop)) };
        let response = self.read_range(1, range).await?;
        Ok(Self::parse_poll_response(response).binary_inputs)
    }

    pub async fn read_analog_inputs(&self, start: u32, stop: u32) -> Result<Vec<AnalogInput>> {
        let range = if start == 0 && stop == 0 { None } else { Some((start, stop)) };
        let response = self.read_range(30, range).await?;
        Ok(Self::parse_poll_response(response).analog_inputs)
    }

    pub async fn read_counters(&self, start: u32, stop: u32) -> Result<Vec<Counter>> {
        let range = if start == 0 && stop == 0 { None } else { Some((start, stop)) };
        let response = self.read_range(20, range).await?;
        Ok(Self::parse_poll_response(response).counters)
    }

    pub async fn read_binary_outputs(&self, start: u32, stop: u32) -> Result<Vec<BinaryOutput>> {
        let range = if start == 0 && stop == 0 { None } else { Some((start, stop)) };
        let response = self.read_range(10, range).await?;
        Ok(Self::parse_poll_response(response).binary_outputs)
    }

    pub async fn read_analog_outputs(&self, start: u32, stop: u32) -> Result<Vec<AnalogOutput>> {
        let range = if start == 0 && stop == 0 { None } else { Some((start, stop)) };
        let response = self.read_range(40, range).await?;
        Ok(Self::parse_poll_response(response).analog_outputs)
    }

    // =====================================================================
    // Control operations
    // =====================================================================

    fn crob_header(cmd: &Crob) -> Result<ObjectHeader> {
        let mut data = vec![(cmd.index & 0xFF) as u8, ((cmd.index >> 8) & 0xFF) as u8];
        data.extend_from_slice(&cmd.to_bytes()?);
        Ok(ObjectHeader {
            group: 12,
            variation: 1,
            qualifier: QualifierCode::Uint8CountUint16Index as u8,
            range_start: 0,
            range_stop: 0,
            count: 1,
            data,
        })
    }

    fn aob_header(cmd: &AnalogOutputCommand) -> Result<ObjectHeader> {
        let mut data = vec![(cmd.index & 0xFF) as u8, ((cmd.index >> 8) & 0xFF) as u8];
        data.extend_from_slice(&cmd.to_bytes(1)?);
        Ok(ObjectHeader {
            group: 41,
            variation: 1,
            qualifier: QualifierCode::Uint8CountUint16Index as u8,
            range_start: 0,
            range_stop: 0,
            count: 1,
            data,
        })
    }

    /// Build a control-operation APDU using the shared application-layer
    /// sequence counter, the same one poll and read requests draw from.
    async fn build_control_apdu(&self, function: AppLayerFunction, header: ObjectHeader) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().await;
        inner.application.build_request(function, &[header], false)
    }

    fn check_control_response(response: &ApplicationResponse) -> bool {
        if response.iin.has_errors() {
            tracing::error!(iin = ?response.iin, "control failed with IIN errors");
            return false;
        }

        for object in &response.objects {
            match object {
                DecodedObjects::Crobs(crobs) => {
                    for crob in crobs {
                        if crob.status != ControlStatus::Success as u8 {
                            tracing::error!(index = crob.index, status = crob.status, "CROB control operation failed");
                            return false;
                        }
                    }
                }
                DecodedObjects::AnalogOutputCommands(cmds) => {
                    for cmd in cmds {
                        if cmd.status != ControlStatus::Success as u8 {
                            tracing::error!(index = cmd.index, status = cmd.status, "AOB control operation failed");
                            return false;
                        }
                    }
                }
                _ => {}
            }
        }

        true
    }

    async fn direct_operate_crob(&self, cmd: Crob) -> Result<bool> {
        let header = Self::crob_header(&cmd)?;
        let apdu = self.build_control_apdu(AppLayerFunction::DirectOperate, header).await?;
        let response = self.exchange(&apdu, true, None).await?;
        Ok(response.map(|r| Self::check_control_response(&r)).unwrap_or(false))
    }

    async fn direct_operate_aob(&self, cmd: AnalogOutputCommand) -> Result<bool> {
        let header = Self::aob_header(&cmd)?;
        let apdu = self.build_control_apdu(AppLayerFunction::DirectOperate, header).await?;
        let response = self.exchange(&apdu, true, None).await?;
        Ok(response.map(|r| Self::check_control_response(&r)).unwrap_or(false))
    }

    pub async fn direct_operate_binary(&self, index: u32, value: bool) -> Result<bool> {
        let cmd = if value { Crob::latch_on(index) } else { Crob::latch_off(index) };
        self.direct_operate_crob(cmd).await
    }

    pub async fn direct_operate_binary_with_code(&self, index: u32, control_code: u8) -> Result<bool> {
        let cmd = Crob {
            index,
            control_code,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
            status: 0,
        };
        self.direct_operate_crob(cmd).await
    }

    pub async fn direct_operate_analog(&self, index: u32, value: f64) -> Result<bool> {
        self.direct_operate_aob(AnalogOutputCommand::new(index, value)).await
    }

    pub async fn pulse_binary(&self, index: u32, on_time_ms: u32, off_time_ms: u32, pulse_on: bool) -> Result<bool> {
        let cmd = if pulse_on {
            Crob::pulse_on(index, on_time_ms, off_time_ms)
        } else {
            Crob {
                index,
                control_code: crate::objects::binary::control_code::PULSE_OFF,
                count: 1,
                on_time_ms,
                off_time_ms,
                status: 0,
            }
        };
        self.direct_operate_crob(cmd).await
    }

    /// Select-Before-Operate control for a binary output. Each step (SELECT,
    /// OPERATE) is its own exchange under its own lock acquisition, matching
    /// the wall-clock select-timeout window measured between them.
    pub async fn select_operate_binary(&self, index: u32, value: bool) -> Result<bool> {
        let cmd = if value { Crob::latch_on(index) } else { Crob::latch_off(index) };

        let select_start = Instant::now();
        let select_header = Self::crob_header(&cmd)?;
        let select_apdu = self.build_control_apdu(AppLayerFunction::Select, select_header).await?;
        let select_response = self.exchange(&select_apdu, true, None).await?;

        match select_response {
            Some(r) if Self::check_control_response(&r) => {}
            _ => return Ok(false),
        }

        let elapsed = select_start.elapsed();
        if elapsed >= self.config.select_timeout {
            tracing::error!(?elapsed, select_timeout = ?self.config.select_timeout, "SELECT timeout exceeded");
            return Ok(false);
        }

        let operate_header = Self::crob_header(&cmd)?;
        let operate_apdu = self.build_control_apdu(AppLayerFunction::Operate, operate_header).await?;
        let operate_response = self.exchange(&operate_apdu, true, None).await?;
        Ok(operate_response.map(|r| Self::check_control_response(&r)).unwrap_or(false))
    }

    // =====================================================================
    // Utility operations
    // =====================================================================

    pub async fn cold_restart(&self) -> bool {
        let apdu = {
            let mut inner = self.inner.lock().await;
            match inner.application.build_request(AppLayerFunction::ColdRestart, &[], false) {
                Ok(a) => a,
                Err(_) => return false,
            }
        };
        matches!(self.exchange(&apdu, true, Some(RESTART_TIMEOUT)).await, Ok(Some(_)))
    }

    pub async fn warm_restart(&self) -> bool {
        let apdu = {
            let mut inner = self.inner.lock().await;
            match inner.application.build_request(AppLayerFunction::WarmRestart, &[], false) {
                Ok(a) => a,
                Err(_) => return false,
            }
        };
        matches!(self.exchange(&apdu, true, Some(RESTART_TIMEOUT)).await, Ok(Some(_)))
    }

    fn class_headers(class_mask: u8) -> Vec<ObjectHeader> {
        let mut headers = Vec::new();
        if class_mask & 0x01 != 0 {
            headers.push(ObjectHeader::all_objects(60, 2));
        }
        if class_mask & 0x02 != 0 {
            headers.push(ObjectHeader::all_objects(60, 3));
        }
        if class_mask & 0x04 != 0 {
            headers.push(ObjectHeader::all_objects(60, 4));
        }
        headers
    }

    pub async fn enable_unsolicited(&self, class_mask: u8) -> Result<bool> {
        let apdu = {
            let mut inner = self.inner.lock().await;
            inner
                .application
                .build_request(AppLayerFunction::EnableUnsolicited, &Self::class_headers(class_mask), false)?
        };
        let response = self.exchange(&apdu, true, None).await?;
        Ok(response.map(|r| !r.iin.has_errors()).unwrap_or(false))
    }

    pub async fn disable_unsolicited(&self, class_mask: u8) -> Result<bool> {
        let apdu = {
            let mut inner = self.inner.lock().await;
            inner
                .application
                .build_request(AppLayerFunction::DisableUnsolicited, &Self::class_headers(class_mask), false)?
        };
        let response = self.exchange(&apdu, true, None).await?;
        Ok(response.map(|r| !r.iin.has_errors()).unwrap_or(false))
    }

    /// Measure round-trip delay with an empty DELAY_MEASURE exchange. No
    /// clock offset is computed or written back to the outstation.
    pub async fn delay_measure(&self) -> Result<Duration> {
        let apdu = {
            let mut inner = self.inner.lock().await;
            inner.application.build_request(AppLayerFunction::DelayMeasure, &[], false)?
        };
        let start = Instant::now();
        self.exchange(&apdu, true, None).await?;
        Ok(start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_stream::mock::DuplexByteStream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_config() -> Dnp3Config {
        let mut cfg = Dnp3Config::default();
        cfg.confirm_required = false;
        cfg.response_timeout = Duration::from_millis(500);
        cfg.max_retries = 0;
        cfg
    }

    #[test]
    fn check_control_response_accepts_success_status() {
        let response = ApplicationResponse {
            function: 0x81,
            sequence: 0,
            first: true,
            final_: true,
            confirm_required: false,
            unsolicited: false,
            iin: Default::default(),
            objects: vec![DecodedObjects::Crobs(vec![Crob {
                index: 0,
                control_code: crate::objects::binary::control_code::LATCH_ON,
                count: 1,
                on_time_ms: 0,
                off_time_ms: 0,
                status: ControlStatus::Success as u8,
            }])],
        };
        assert!(Master::check_control_response(&response));
    }

    #[test]
    fn check_control_response_rejects_nonzero_status() {
        let response = ApplicationResponse {
            function: 0x81,
            sequence: 0,
            first: true,
            final_: true,
            confirm_required: false,
            unsolicited: false,
            iin: Default::default(),
            objects: vec![DecodedObjects::Crobs(vec![Crob {
                index: 0,
                control_code: crate::objects::binary::control_code::LATCH_ON,
                count: 1,
                on_time_ms: 0,
                off_time_ms: 0,
                status: ControlStatus::HardwareError as u8,
            }])],
        };
        assert!(!Master::check_control_response(&response));
    }

    #[test]
    fn parse_poll_response_buckets_by_type() {
        let response = ApplicationResponse {
            function: 0x81,
            sequence: 0,
            first: true,
            final_: true,
            confirm_required: false,
            unsolicited: false,
            iin: Default::default(),
            objects: vec![
                DecodedObjects::BinaryInputs(vec![BinaryInput {
                    index: 0,
                    value: true,
                    flags: crate::objects::binary::BinaryFlags::ONLINE,
                    timestamp: None,
                }]),
                DecodedObjects::Counters(vec![]),
            ],
        };
        let result = Master::parse_poll_response(response);
        assert!(result.success);
        assert_eq!(result.binary_inputs.len(), 1);
    }

    #[tokio::test]
    async fn integrity_poll_round_trips_over_mock_outstation() {
        let (stream, mut outstation) = DuplexByteStream::pair(4096);
        let master = Master::with_stream(test_config(), Box::new(stream)).unwrap();

        let served = Arc::new(AtomicBool::new(false));
        let served_clone = served.clone();

        let outstation_task = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let n = outstation.read(&mut buf).await.unwrap();
            assert!(n > 0);

            // Empty response: FIR|FIN|Response control, IIN = 0x0000, no objects.
            let apdu = vec![0xC4, 0x81, 0x00, 0x00];
            let dll = DataLinkLayer::new(10, 1).unwrap();
            let mut tf = TransportLayer::new();
            let segments = tf.segment(&apdu, MAX_SEGMENT_PAYLOAD);
            for segment in &segments {
                let frame = dll.build_frame(segment, false, false).unwrap();
                outstation.write_all(&frame).await.unwrap();
            }
            served_clone.store(true, Ordering::SeqCst);
        });

        let result = master.integrity_poll().await;
        outstation_task.await.unwrap();

        assert!(served.load(Ordering::SeqCst));
        assert!(result.success);
        assert!(result.binary_inputs.is_empty());
    }
}
