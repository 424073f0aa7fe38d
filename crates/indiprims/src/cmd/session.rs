//! Connection setup and event pumping shared by the subcommands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indiprims_client::{ClientConfig, ClientEvent, Connection};

use crate::cmd::ServerArgs;
use crate::exit::{client_error, CliError, CliResult, FAILURE, INTERNAL, USAGE};

/// CLI connections collect events and drain them between polls.
pub type CliConnection = Connection<Vec<ClientEvent>>;

/// Longest single wait inside a pump loop.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Definitions are considered complete once the server has been silent
/// this long.
const QUIET_PERIOD: Duration = Duration::from_millis(300);

pub fn open(server: &ServerArgs) -> CliResult<CliConnection> {
    let mut config = ClientConfig::new(server.server.clone());
    config.connect_timeout = parse_duration(&server.connect_timeout)?;
    config.reconnect_on_decode_error = false;

    let mut conn = Connection::with_sink(config, Vec::new());
    conn.try_connect()
        .map_err(|err| client_error("connect failed", err))?;
    Ok(conn)
}

/// Pump until `done` holds, the server goes quiet after sending something,
/// or `window` elapses. Fails if the server drops the connection.
pub fn settle<F>(
    conn: &mut CliConnection,
    window: Duration,
    running: &AtomicBool,
    mut done: F,
) -> CliResult<()>
where
    F: FnMut(&CliConnection) -> bool,
{
    let deadline = Instant::now() + window;
    let mut last_traffic: Option<Instant> = None;

    while running.load(Ordering::SeqCst) && !done(conn) {
        let now = Instant::now();
        if now >= deadline || last_traffic.is_some_and(|at| now - at >= QUIET_PERIOD) {
            break;
        }
        let slice = POLL_SLICE.min(deadline - now);
        if conn.poll(slice) > 0 {
            last_traffic = Some(Instant::now());
        }
        ensure_connected(conn)?;
    }
    Ok(())
}

pub fn ensure_connected(conn: &CliConnection) -> CliResult<()> {
    if conn.is_connected() {
        Ok(())
    } else {
        Err(CliError::new(
            FAILURE,
            format!("{} closed the connection", conn.server()),
        ))
    }
}

/// Take the events collected since the last call.
pub fn drain(conn: &mut CliConnection) -> Vec<ClientEvent> {
    std::mem::take(conn.events_mut())
}

pub fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}

/// `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
