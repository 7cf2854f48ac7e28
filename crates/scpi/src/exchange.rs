//! The SCPI request/response state machine
//!
//! One exchange owns one transport. Inbound bytes accumulate in a buffer
//! only this exchange consumes; the transport side only appends. Complete
//! messages are delimited by the configured escape byte; messages carrying
//! the event prefix are diverted to a side list instead of being returned
//! as responses.

use crate::config::ExchangeConfig;
use crate::error::{Result, ScpiError};
use bytes::BytesMut;
use common::identity::InstrumentIdentity;
use tracing::{debug, trace, warn};
use transport::{ReceivePredicate, Transport};

pub struct ScpiExchange {
    transport: Box<dyn Transport>,
    config: ExchangeConfig,
    /// Accumulated inbound bytes; appended from the transport, consumed here
    buffer: BytesMut,
    /// Event strings received so far, prefix stripped
    events: Vec<String>,
}

impl ScpiExchange {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_config(transport, ExchangeConfig::default())
    }

    pub fn with_config(transport: Box<dyn Transport>, config: ExchangeConfig) -> Self {
        Self {
            transport,
            config,
            buffer: BytesMut::new(),
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn into_transport(self) -> Box<dyn Transport> {
        self.transport
    }

    /// Send a command; no response is expected
    pub async fn send_command(&mut self, text: &str) -> Result<()> {
        let framed = format!("{}{}", text, self.config.terminator);
        self.transport.send(framed.as_bytes()).await?;
        trace!(command = text, "sent");
        Ok(())
    }

    /// Send a query and wait for the response message
    ///
    /// The timeout re-arms whenever new bytes arrive: progress resets the
    /// clock, total silence does not. Event messages arriving meanwhile are
    /// diverted and the wait continues.
    pub async fn query(&mut self, text: &str) -> Result<String> {
        self.send_command(text).await?;
        let timeout = self.config.timeout();

        loop {
            self.ingest();
            while let Some(message) = self.extract_message() {
                if let Some(event) = self.divert_event(&message) {
                    debug!(event = %event, "event received during query");
                    continue;
                }
                return Ok(self.clean_response(text, &message));
            }

            let progressed = self
                .transport
                .wait_received(timeout, &ReceivePredicate::ByteCount(1))
                .await?;
            if !progressed {
                return Err(ScpiError::Timeout);
            }
        }
    }

    /// Send a query expecting a numeric answer, with bounded retry
    ///
    /// Transmits up to `1 + retries_per_transmission` times. Every
    /// transmission consumes a retry slot, whether it times out or yields an
    /// unparseable response. The mean is accepted only when the sample
    /// standard deviation across the successful parses stays within
    /// `max_standard_deviation`.
    pub async fn query_numeric(&mut self, text: &str) -> Result<f64> {
        let attempts = 1 + self.config.retries_per_transmission;
        let mut samples = Vec::with_capacity(attempts as usize);
        let mut timed_out = false;
        let mut last_raw = String::new();

        for attempt in 0..attempts {
            match self.query(text).await {
                Ok(raw) => match raw.trim().parse::<f64>() {
                    Ok(value) => samples.push(value),
                    Err(_) => {
                        warn!(attempt, response = %raw, "non-numeric response");
                        last_raw = raw;
                    }
                },
                Err(ScpiError::Timeout) => {
                    warn!(attempt, "numeric query timed out");
                    timed_out = true;
                }
                Err(e) => return Err(e),
            }
        }

        if samples.is_empty() {
            return if timed_out {
                Err(ScpiError::Timeout)
            } else {
                Err(ScpiError::NotNumeric { response: last_raw })
            };
        }

        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let std_dev = sample_std_dev(&samples, mean);
        if std_dev > self.config.max_standard_deviation {
            return Err(ScpiError::ValidationFailed {
                std_dev,
                limit: self.config.max_standard_deviation,
            });
        }
        Ok(mean)
    }

    /// Query and parse the standard identity string
    ///
    /// The exchange only forwards identity; whether the serial number is
    /// approved for use is the calibration collaborator's call.
    pub async fn identify(&mut self) -> Result<InstrumentIdentity> {
        let raw = self.query("*IDN?").await?;
        Ok(InstrumentIdentity::parse(&raw)?)
    }

    /// Drain pending inbound data, capturing spontaneous event messages
    ///
    /// Complete non-event messages found outside a query have no consumer
    /// and are dropped with a log line.
    pub fn poll_events(&mut self) {
        self.ingest();
        while let Some(message) = self.extract_message() {
            if self.divert_event(&message).is_none() {
                debug!(message = %message, "unsolicited response discarded");
            }
        }
    }

    /// Whether the named event has been received
    pub fn is_event_received(&self, name: &str) -> bool {
        self.events.iter().any(|e| e == name)
    }

    /// Events received so far, in arrival order
    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn clear_event_list(&mut self) {
        self.events.clear();
    }

    /// Move newly arrived transport bytes into the exchange buffer
    fn ingest(&mut self) {
        let chunk = self.transport.take_received();
        if !chunk.is_empty() {
            self.buffer.extend_from_slice(&chunk);
        }
    }

    /// Split the next escape-terminated message off the buffer
    fn extract_message(&mut self) -> Option<String> {
        let pos = self
            .buffer
            .iter()
            .position(|&b| b == self.config.escape)?;
        let raw = self.buffer.split_to(pos + 1);
        let body = &raw[..raw.len() - 1];
        Some(String::from_utf8_lossy(body).into_owned())
    }

    /// If `message` is an event, record it and return its name
    fn divert_event(&mut self, message: &str) -> Option<String> {
        let name = message
            .trim_start_matches(['\r', '\n'])
            .strip_prefix(&self.config.event_prefix)?
            .trim()
            .to_string();
        self.events.push(name.clone());
        Some(name)
    }

    /// Strip framing residue from a response message
    ///
    /// Removes leading escape/whitespace residue and, on half-duplex lines
    /// that echo the request, the echoed command when actual content follows
    /// it. A message that is exactly the echoed command is returned as-is;
    /// that is the loopback self-test path.
    fn clean_response(&self, sent: &str, message: &str) -> String {
        let body = message.trim_start_matches(['\r', '\n', ' ']);
        let body = match body.strip_prefix(sent) {
            Some(rest) if !rest.trim().is_empty() => rest,
            _ => body,
        };
        body.trim_end_matches(['\r', '\n']).to_string()
    }
}

/// Sample standard deviation (n-1 denominator; zero for a single sample)
fn sample_std_dev(samples: &[f64], mean: f64) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let variance = samples
        .iter()
        .map(|s| (s - mean).powi(2))
        .sum::<f64>()
        / (samples.len() - 1) as f64;
    variance.sqrt()
}
