//! Exchange behavior against a mock instrument
//!
//! The "instrument" is the server side of a TCP transport pair: it waits for
//! a terminated command and answers from a canned script. The echo transport
//! covers the loopback self-test path.

use scpi::{ExchangeConfig, ScpiError, ScpiExchange};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use transport::{
    ConnectionState, EchoTransport, ReceivePredicate, TcpClientTransport, TcpServerTransport,
    Transport,
};

const WAIT: Duration = Duration::from_secs(5);

/// Bind a server ("instrument") and a connected client exchange
async fn instrument_and_exchange(config: ExchangeConfig) -> (TcpServerTransport, ScpiExchange) {
    let server = TcpServerTransport::new(
        "server:127.0.0.1:0",
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
    );
    server.connect().await.expect("server listen failed");
    let port = server
        .local_addr()
        .expect("server has no bound address")
        .port();

    let client = TcpClientTransport::new(
        &format!("client:127.0.0.1:{}", port),
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port),
    );
    client.connect().await.expect("client connect failed");

    let deadline = tokio::time::Instant::now() + WAIT;
    while server.state() != ConnectionState::Connected {
        assert!(tokio::time::Instant::now() < deadline, "no peer seen");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    (server, ScpiExchange::with_config(Box::new(client), config))
}

/// Answer each incoming command with the next canned reply
async fn serve_replies(instrument: &TcpServerTransport, replies: &[&str]) {
    for reply in replies {
        let got = instrument
            .wait_received(WAIT, &ReceivePredicate::Escape(b'\n'))
            .await
            .expect("instrument wait failed");
        assert!(got, "no command arrived");
        instrument.take_received();
        instrument
            .send(reply.as_bytes())
            .await
            .expect("instrument send failed");
    }
}

#[tokio::test]
async fn test_query_returns_response_payload() {
    let (instrument, mut exchange) = instrument_and_exchange(ExchangeConfig::default()).await;

    let serve = serve_replies(&instrument, &["+5.002E+00\n"]);
    let (reply, _) = tokio::join!(exchange.query("MEAS:VOLT:DC?"), serve);
    assert_eq!(reply.expect("query failed"), "+5.002E+00");
}

#[tokio::test]
async fn test_query_strips_half_duplex_echo() {
    let (instrument, mut exchange) = instrument_and_exchange(ExchangeConfig::default()).await;

    // Line echoes the request in front of the answer.
    let serve = serve_replies(&instrument, &["MEAS:CURR? +0.120\n"]);
    let (reply, _) = tokio::join!(exchange.query("MEAS:CURR?"), serve);
    assert_eq!(reply.expect("query failed").trim(), "+0.120");
}

#[tokio::test]
async fn test_query_times_out_on_silence() {
    let config = ExchangeConfig {
        timeout_ms: 100,
        ..ExchangeConfig::default()
    };
    let (_instrument, mut exchange) = instrument_and_exchange(config).await;

    let start = std::time::Instant::now();
    let result = exchange.query("SYST:ERR?").await;
    assert!(matches!(result, Err(ScpiError::Timeout)));
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_query_rearms_timeout_on_partial_progress() {
    let config = ExchangeConfig {
        timeout_ms: 200,
        ..ExchangeConfig::default()
    };
    let (instrument, mut exchange) = instrument_and_exchange(config).await;

    // Dribble the response in three pieces, each gap shorter than the
    // timeout but the total exceeding it: progress must re-arm the clock.
    let serve = async {
        let got = instrument
            .wait_received(WAIT, &ReceivePredicate::Escape(b'\n'))
            .await
            .expect("instrument wait failed");
        assert!(got);
        instrument.take_received();
        for piece in ["+4.", "998", "E+00\n"] {
            tokio::time::sleep(Duration::from_millis(120)).await;
            instrument
                .send(piece.as_bytes())
                .await
                .expect("instrument send failed");
        }
    };
    let (reply, _) = tokio::join!(exchange.query("MEAS:VOLT:DC?"), serve);
    assert_eq!(reply.expect("query failed"), "+4.998E+00");
}

#[tokio::test]
async fn test_query_numeric_accepts_tight_samples() {
    let (instrument, mut exchange) = instrument_and_exchange(ExchangeConfig::default()).await;

    let serve = serve_replies(&instrument, &["5.00\n", "5.02\n", "4.98\n"]);
    let (value, _) = tokio::join!(exchange.query_numeric("MEAS:VOLT:DC?"), serve);
    let value = value.expect("validation should pass");
    assert!((value - 5.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_query_numeric_rejects_dispersed_samples() {
    let (instrument, mut exchange) = instrument_and_exchange(ExchangeConfig::default()).await;

    let serve = serve_replies(&instrument, &["5.0\n", "6.0\n", "4.0\n"]);
    let (result, _) = tokio::join!(exchange.query_numeric("MEAS:VOLT:DC?"), serve);
    assert!(matches!(
        result,
        Err(ScpiError::ValidationFailed { std_dev, limit })
            if std_dev > limit
    ));
}

#[tokio::test]
async fn test_query_numeric_unparseable_consumes_retry_budget() {
    let (instrument, mut exchange) = instrument_and_exchange(ExchangeConfig::default()).await;

    // Three transmissions total; the garbage reply burns one slot but the
    // two parses that succeed agree, so the mean is accepted.
    let serve = serve_replies(&instrument, &["5.00\n", "OVERLOAD\n", "5.00\n"]);
    let (value, _) = tokio::join!(exchange.query_numeric("MEAS:VOLT:DC?"), serve);
    assert!((value.expect("validation should pass") - 5.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_query_numeric_all_garbage_is_not_numeric() {
    let (instrument, mut exchange) = instrument_and_exchange(ExchangeConfig::default()).await;

    let serve = serve_replies(&instrument, &["ERR\n", "ERR\n", "ERR\n"]);
    let (result, _) = tokio::join!(exchange.query_numeric("SYST:ERR?"), serve);
    assert!(matches!(result, Err(ScpiError::NotNumeric { .. })));
}

#[tokio::test]
async fn test_events_are_diverted_not_returned() {
    let (instrument, mut exchange) = instrument_and_exchange(ExchangeConfig::default()).await;

    // An event lands ahead of the real answer inside the same query window.
    let serve = serve_replies(&instrument, &["EVENT:TRIGGERED\n+1.250\n"]);
    let (reply, _) = tokio::join!(exchange.query("MEAS:VOLT:DC?"), serve);
    assert_eq!(reply.expect("query failed"), "+1.250");

    assert!(exchange.is_event_received("TRIGGERED"));
    assert!(!exchange.is_event_received("OVERLOAD"));

    exchange.clear_event_list();
    assert!(!exchange.is_event_received("TRIGGERED"));
    assert!(exchange.events().is_empty());
}

#[tokio::test]
async fn test_spontaneous_events_via_poll() {
    let (instrument, mut exchange) = instrument_and_exchange(ExchangeConfig::default()).await;

    instrument
        .send(b"EVENT:DOOR_OPEN\n")
        .await
        .expect("instrument send failed");
    let arrived = exchange
        .transport()
        .wait_received(WAIT, &ReceivePredicate::Escape(b'\n'))
        .await
        .expect("wait failed");
    assert!(arrived);

    exchange.poll_events();
    assert!(exchange.is_event_received("DOOR_OPEN"));
}

#[tokio::test]
async fn test_identify_parses_identity() {
    let (instrument, mut exchange) = instrument_and_exchange(ExchangeConfig::default()).await;

    let serve = serve_replies(&instrument, &["Keysight Technologies,34465A,MY5750,A.02.17\n"]);
    let (identity, _) = tokio::join!(exchange.identify(), serve);
    let identity = identity.expect("identify failed");
    assert_eq!(identity.model, "34465A");
    assert_eq!(identity.serial, "MY5750");
}

#[tokio::test]
async fn test_loopback_self_test_over_echo() {
    let echo = EchoTransport::new();
    echo.connect().await.expect("connect failed");
    let mut exchange = ScpiExchange::new(Box::new(echo));

    // The echo transport reflects the framed command; a message that is
    // exactly the echoed command comes back as the response.
    let reply = exchange.query("SELFTEST").await.expect("query failed");
    assert_eq!(reply, "SELFTEST");
}
