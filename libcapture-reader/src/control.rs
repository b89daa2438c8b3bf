//! Control requests
//!
//! A control code is the function index shifted left by 2. Bit [`CONTROL_WIDE`] selects
//! the wide variant, which only differs for [`ControlFunction::SetDataEvent`] (64-bit
//! handle instead of 32-bit).
//!
//! Requests carry one buffer: the input is read from its first `input_len` bytes, and
//! the output is written to its first `output_len` bytes.

use crate::filter::FilterKind;
use crate::session::Session;
use libcapture_tools::*;
use tracing::debug;

/// Bit selecting the wide variant of a control code
pub const CONTROL_WIDE: u32 = 0x1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlFunction {
    Restart,
    FilterConnections,
    FilterProcesses,
    SetSnapLength,
    GetSnapLength,
    SetDataEvent,
    SetOpenConnections,
    GetStatistics,
}

impl ControlFunction {
    const ALL: [ControlFunction; 8] = [
        ControlFunction::Restart,
        ControlFunction::FilterConnections,
        ControlFunction::FilterProcesses,
        ControlFunction::SetSnapLength,
        ControlFunction::GetSnapLength,
        ControlFunction::SetDataEvent,
        ControlFunction::SetOpenConnections,
        ControlFunction::GetStatistics,
    ];

    #[inline]
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Build the control code for this function
    pub fn code(self, wide: bool) -> u32 {
        let code = self.index() << 2;
        if wide {
            code | CONTROL_WIDE
        } else {
            code
        }
    }

    /// Decode a control code into a function and the wide flag
    pub fn from_code(code: u32) -> Option<(ControlFunction, bool)> {
        let wide = code & CONTROL_WIDE != 0;
        let rest = code & !CONTROL_WIDE;
        if rest & 0b11 != 0 {
            return None;
        }
        let f = *Self::ALL.get((rest >> 2) as usize)?;
        Some((f, wide))
    }

    /// Minimum (input, output) sizes
    pub fn required_sizes(self, wide: bool) -> (usize, usize) {
        match self {
            ControlFunction::Restart
            | ControlFunction::FilterConnections
            | ControlFunction::FilterProcesses => (0, 0),
            ControlFunction::SetSnapLength => (4, 0),
            ControlFunction::GetSnapLength => (0, 4),
            ControlFunction::SetDataEvent if wide => (8, 0),
            ControlFunction::SetDataEvent => (4, 0),
            ControlFunction::SetOpenConnections => (ConnectionTable::MIN_SIZE, 0),
            ControlFunction::GetStatistics => (0, Statistics::SIZE),
        }
    }
}

/// A control request, as received from the host
#[derive(Debug)]
pub struct ControlRequest<'a> {
    pub code: u32,
    /// Declared input length
    pub input_len: usize,
    /// Declared output length
    pub output_len: usize,
    pub buffer: Option<&'a mut [u8]>,
}

impl<'a> ControlRequest<'a> {
    pub fn new(code: u32, input_len: usize, output_len: usize, buffer: Option<&'a mut [u8]>) -> Self {
        ControlRequest {
            code,
            input_len,
            output_len,
            buffer,
        }
    }

    /// Request with input taken from `input`, and no output
    pub fn with_input(code: u32, input: &'a mut [u8]) -> Self {
        let input_len = input.len();
        ControlRequest::new(code, input_len, 0, Some(input))
    }

    /// Request with an output buffer and no input
    pub fn with_output(code: u32, output: &'a mut [u8]) -> Self {
        let output_len = output.len();
        ControlRequest::new(code, 0, output_len, Some(output))
    }

    /// Check the code and the buffer sizes
    pub fn validate(&self) -> Result<(ControlFunction, bool), Error> {
        let (function, wide) =
            ControlFunction::from_code(self.code).ok_or(Error::InvalidRequest(self.code))?;
        let (min_in, min_out) = function.required_sizes(wide);
        if self.input_len < min_in {
            return Err(Error::buffer_too_small(min_in, self.input_len));
        }
        if self.output_len < min_out {
            return Err(Error::buffer_too_small(min_out, self.output_len));
        }
        let declared = self.input_len.max(self.output_len);
        let Some(buffer) = self.buffer.as_ref() else {
            if declared != 0 {
                return Err(Error::InvalidParameter("missing control buffer"));
            }
            return Ok((function, wide));
        };
        let actual = buffer.len();
        if actual < declared {
            return Err(Error::buffer_too_small(declared, actual));
        }
        Ok((function, wide))
    }
}

/// Decoded control operation
#[derive(Debug, PartialEq, Eq)]
pub enum Control<'a> {
    Restart,
    SetFilter(FilterKind, &'a [u8]),
    SetSnapLength(u32),
    GetSnapLength,
    SetDataEvent(Option<EventHandle>),
    SetOpenConnections(ConnectionTable),
    GetStatistics,
}

fn read_u32(i: &[u8]) -> Result<u32, Error> {
    let b = i.get(..4).ok_or_else(|| Error::buffer_too_small(4, i.len()))?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_u64(i: &[u8]) -> Result<u64, Error> {
    let b = i.get(..8).ok_or_else(|| Error::buffer_too_small(8, i.len()))?;
    Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
}

impl<'a> Control<'a> {
    /// Decode the input of a validated request
    pub fn decode(function: ControlFunction, wide: bool, input: &'a [u8]) -> Result<Self, Error> {
        let control = match function {
            ControlFunction::Restart => Control::Restart,
            ControlFunction::FilterConnections => Control::SetFilter(FilterKind::Connection, input),
            ControlFunction::FilterProcesses => Control::SetFilter(FilterKind::Process, input),
            ControlFunction::SetSnapLength => Control::SetSnapLength(read_u32(input)?),
            ControlFunction::GetSnapLength => Control::GetSnapLength,
            ControlFunction::SetDataEvent => {
                let handle = if wide {
                    read_u64(input)?
                } else {
                    u64::from(read_u32(input)?)
                };
                // a zero handle disarms the notification
                Control::SetDataEvent((handle != 0).then_some(EventHandle(handle)))
            }
            ControlFunction::SetOpenConnections => {
                Control::SetOpenConnections(ConnectionTable::parse(input)?)
            }
            ControlFunction::GetStatistics => Control::GetStatistics,
        };
        Ok(control)
    }
}

enum Reply {
    SnapLength(u32),
    Statistics(Statistics),
}

impl Session {
    /// Run a control operation
    pub fn apply(&self, control: Control<'_>) -> Result<(), Error> {
        match control {
            Control::Restart => self.mark_restart(),
            Control::SetFilter(kind, ids) => self.set_filter_bytes(kind, ids)?,
            Control::SetSnapLength(n) => self.set_snap_length(n),
            Control::SetDataEvent(event) => self.set_data_event(event)?,
            Control::SetOpenConnections(table) => self.set_open_connections(table),
            Control::GetSnapLength | Control::GetStatistics => (),
        }
        Ok(())
    }

    /// Validate, decode and run a control request
    ///
    /// Returns the number of bytes written to the output.
    pub fn control(&self, request: ControlRequest<'_>) -> Result<usize, Error> {
        let (function, wide) = request.validate()?;
        debug!(
            "reader {}: control {:?}{} in={} out={}",
            self.reader_id(),
            function,
            if wide { " (wide)" } else { "" },
            request.input_len,
            request.output_len
        );
        let ControlRequest {
            input_len,
            output_len,
            buffer,
            ..
        } = request;
        let buffer = buffer.unwrap_or_default();

        let reply = {
            let control = Control::decode(function, wide, &buffer[..input_len])?;
            let reply = match control {
                Control::GetSnapLength => Some(Reply::SnapLength(self.snap_length())),
                Control::GetStatistics => Some(Reply::Statistics(self.statistics())),
                _ => None,
            };
            self.apply(control)?;
            reply
        };

        let out = &mut buffer[..output_len];
        match reply {
            Some(Reply::SnapLength(n)) => {
                out[..4].copy_from_slice(&n.to_le_bytes());
                Ok(4)
            }
            Some(Reply::Statistics(stats)) => stats.write_to(out),
            None => Ok(0),
        }
    }
}
