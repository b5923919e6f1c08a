//! Session bring-up: endpoint rounds until a handshake succeeds.

use std::time::{Duration, Instant};

use cinder_proto::{ClientHello, ProtocolVersion, ServerHello};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{ClientError, ClientResult, EndpointError};
use crate::logging::SessionLogger;

/// Outcome of a successful bring-up.
#[derive(Debug)]
pub(crate) struct Established {
    pub(crate) connection: Connection,
    pub(crate) server: ServerHello,
    pub(crate) connection_attempts: u64,
    pub(crate) connection_failures: u64,
}

/// Connects to the first endpoint that completes a handshake within
/// `deadline`.
///
/// Endpoints are tried in configured order, in rounds separated by
/// `reconnect_delay`. Transient failures are recorded per endpoint and
/// reported on timeout; a protocol mismatch ends the attempt at once.
pub(crate) async fn establish(
    config: &ClientConfig,
    deadline: Duration,
    logger: &SessionLogger,
) -> ClientResult<Established> {
    let endpoints = config.resolved_endpoints()?;
    let hello = ClientHello {
        version: ProtocolVersion::CURRENT,
        client_name: config.client_name.clone(),
    };

    let started = Instant::now();
    let mut last_errors: Vec<EndpointError> = Vec::new();
    let mut attempts = 0u64;
    let mut failures = 0u64;
    let mut round = 0u32;

    loop {
        round += 1;
        for endpoint in &endpoints {
            let Some(remaining) = time_left(started, deadline) else {
                return Err(expired(started, last_errors, logger));
            };

            let budget = remaining.min(config.connect_timeout);
            attempts += 1;
            logger.debug(format!("connecting to {endpoint} (round {round})"));

            let error = match tokio::time::timeout(budget, Connection::open(endpoint, &hello)).await
            {
                Ok(Ok((connection, server))) => {
                    logger.info(format!(
                        "handshake with {} ({}) accepted: session {}, protocol {}",
                        endpoint, server.node_name, server.session_id, server.version
                    ));
                    return Ok(Established {
                        connection,
                        server,
                        connection_attempts: attempts,
                        connection_failures: failures,
                    });
                }
                Ok(Err(e)) if !e.is_transient() => {
                    logger.error(format!("giving up on {endpoint}: {e}"));
                    return Err(e);
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("handshake timed out after {}ms", budget.as_millis()),
            };

            failures += 1;
            logger.warn(format!("connection to {endpoint} failed: {error}"));
            record(&mut last_errors, endpoint, error);
        }

        let Some(remaining) = time_left(started, deadline) else {
            return Err(expired(started, last_errors, logger));
        };
        tokio::time::sleep(config.reconnect_delay.min(remaining)).await;
    }
}

fn time_left(started: Instant, deadline: Duration) -> Option<Duration> {
    deadline
        .checked_sub(started.elapsed())
        .filter(|remaining| !remaining.is_zero())
}

/// Keeps only the most recent error per endpoint, in configured order.
fn record(last_errors: &mut Vec<EndpointError>, endpoint: &str, error: String) {
    match last_errors.iter_mut().find(|e| e.endpoint == endpoint) {
        Some(entry) => entry.error = error,
        None => last_errors.push(EndpointError {
            endpoint: endpoint.to_string(),
            error,
        }),
    }
}

fn expired(started: Instant, attempts: Vec<EndpointError>, logger: &SessionLogger) -> ClientError {
    let error = ClientError::Timeout {
        operation: "session start",
        elapsed: started.elapsed(),
        attempts,
    };
    logger.error(error.to_string());
    error
}
